/// Storefront Order & Payment Backend
///
/// Entry point of the order and payment service of the children's-book
/// storefront. It wires the configured store, payment gateway and
/// notification sink into the services and serves the HTTP API.
///
/// # Features
///
/// - Order intake with server-side pricing and duplicate detection
/// - Payment initiation, verification, webhooks and status polling
/// - Best-effort order notifications (log or Kafka)
/// - Admin order dashboard API
/// - Metrics for monitoring
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use app_config::{AppConfig, NotifyBackend, StoreBackend};
use gateway::{PaymentGateway, RazorpayGateway, RazorpaySettings};
use memstore::InMemoryStore;
use notifier::{KafkaNotifier, LogNotifier, NotificationDispatcher, Notifier};
use repository::{OrdersRepository, PgOrdersRepository, PgProductsRepository, ProductsRepository};
use server::{Server, ServerSettings};
use service::{IntakeSettings, OrderServiceImpl, PaymentServiceImpl};

/// Command line flags.
#[derive(Debug, Parser)]
#[command(name = "storefront", about = "Order and payment backend")]
struct Cli {
    /// Do not apply SQL migrations on startup.
    #[arg(long)]
    skip_migrations: bool,
}

/// Initialize the tracing subscriber for logging
fn init_logger() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

type Stores = (Arc<dyn OrdersRepository>, Arc<dyn ProductsRepository>);

async fn build_stores(config: &AppConfig, skip_migrations: bool) -> Result<Stores> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let pool = db::init_db_pool(config, skip_migrations)
                .await
                .context("Failed to initialize database")?;
            info!("Database initialized successfully");
            let orders: Arc<dyn OrdersRepository> = Arc::new(PgOrdersRepository::new(pool.clone()));
            let products: Arc<dyn ProductsRepository> = Arc::new(PgProductsRepository::new(pool));
            Ok((orders, products))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store: orders are lost on restart");
            let store = InMemoryStore::new();
            if !config.catalog_seed_path.is_empty() {
                let count = store
                    .load_catalog_file(&config.catalog_seed_path)
                    .await
                    .context("Failed to seed catalog")?;
                info!(count, path = %config.catalog_seed_path, "Catalog seeded");
            }
            let orders: Arc<dyn OrdersRepository> = Arc::new(store.clone());
            let products: Arc<dyn ProductsRepository> = Arc::new(store);
            Ok((orders, products))
        }
    }
}

fn build_notifier(config: &AppConfig) -> Result<Arc<dyn Notifier>> {
    match config.notify_backend {
        NotifyBackend::Log => Ok(Arc::new(LogNotifier)),
        NotifyBackend::Kafka => {
            let notifier = KafkaNotifier::new(&config.kafka_broker_list(), &config.kafka_topic)
                .context("Failed to create Kafka notifier")?;
            info!(topic = %config.kafka_topic, "Publishing notifications to Kafka");
            Ok(Arc::new(notifier))
        }
    }
}

fn build_gateway(config: &AppConfig) -> Result<Arc<dyn PaymentGateway>> {
    if !config.gateway_configured() {
        warn!("Payment gateway credentials missing: payment initiation will fail");
    }
    let gateway = RazorpayGateway::new(RazorpaySettings {
        base_url: config.gateway_base_url.clone(),
        key_id: config.gateway_key_id.clone(),
        key_secret: config.gateway_key_secret.clone(),
        timeout: config.gateway_timeout,
    })
    .context("Failed to create payment gateway client")?;
    Ok(Arc::new(gateway))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();

    info!("Storefront backend starting...");

    let config = AppConfig::load().context("Failed to load configuration")?;

    let (orders_repo, products_repo) = build_stores(&config, cli.skip_migrations).await?;
    let dispatcher = NotificationDispatcher::new(build_notifier(&config)?);
    let gateway = build_gateway(&config)?;

    let order_service = Arc::new(OrderServiceImpl::new(
        orders_repo.clone(),
        products_repo,
        dispatcher.clone(),
        IntakeSettings {
            dedup_window: config.dedup_window,
            whatsapp_number: config.whatsapp_number.clone(),
        },
    ));
    let payment_service = Arc::new(PaymentServiceImpl::new(
        orders_repo,
        gateway,
        dispatcher,
        config.gateway_webhook_secret.clone(),
    ));

    let http_server = Server::new(
        ServerSettings {
            port: config.http_port,
            shutdown_timeout: config.shutdown_timeout,
            admin_token: config.admin_token.clone(),
        },
        order_service,
        payment_service,
    )?;
    http_server.start().await?;

    info!("Application stopped");
    Ok(())
}
