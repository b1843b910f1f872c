//! Server crate provides the HTTP surface of the storefront backend.
//!
//! Routes:
//! - `POST /orders`, `GET /orders/{id}`, `GET /orders/{id}/fallback`
//! - `POST /payment/initiate`, `POST /payment/verify`, `GET /payment/status/{gateway_order_id}`
//! - `POST /webhooks/payment`
//! - `GET /admin/orders`, `POST /admin/orders/{id}/status` (only with an admin token)
//! - `GET /health`, `GET /metrics`

mod error;
mod handlers;
mod metrics;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{MatchedPath, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use service::{OrderService, PaymentService};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub use error::ApiError;
pub use handlers::WEBHOOK_SIGNATURE_HEADER;
pub use metrics::Metrics;

/// Header the admin dashboard authenticates with.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Application state shared between request handlers
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderService>,
    pub payments: Arc<dyn PaymentService>,
    pub metrics: Arc<Metrics>,
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub port: u16,
    /// Upper bound on draining in-flight requests after a shutdown signal.
    pub shutdown_timeout: Duration,
    /// Admin routes are mounted only when set.
    pub admin_token: Option<String>,
}

/// Server represents the HTTP server of the order and payment API.
pub struct Server {
    settings: ServerSettings,
    state: AppState,
}

impl Server {
    pub fn new(
        settings: ServerSettings,
        orders: Arc<dyn OrderService>,
        payments: Arc<dyn PaymentService>,
    ) -> Result<Self> {
        info!("Initializing HTTP server on port {}", settings.port);
        let metrics = Metrics::new().context("Failed to register metrics")?;
        if settings.admin_token.is_none() {
            warn!("Admin token not configured: admin routes are disabled");
        }
        Ok(Self {
            settings,
            state: AppState {
                orders,
                payments,
                metrics: Arc::new(metrics),
            },
        })
    }

    /// Starts the server and blocks until it's shut down.
    pub async fn start(&self) -> Result<()> {
        let app = self.router();

        let listener = TcpListener::bind(("0.0.0.0", self.settings.port))
            .await
            .context("Failed to bind to port")?;

        info!("HTTP server listening on port {}", self.settings.port);

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = stop_rx.changed().await;
        });
        let mut handle = tokio::spawn(serve.into_future());

        tokio::select! {
            res = &mut handle => {
                res.context("Server task failed")?.context("Server error")?;
                return Ok(());
            }
            _ = shutdown_signal() => {}
        }

        let _ = stop_tx.send(true);
        match tokio::time::timeout(self.settings.shutdown_timeout, &mut handle).await {
            Ok(res) => {
                res.context("Server task failed")?.context("Server error")?;
                info!("HTTP server shut down gracefully");
            }
            Err(_) => {
                warn!(
                    timeout = ?self.settings.shutdown_timeout,
                    "In-flight requests did not finish in time; aborting"
                );
                handle.abort();
            }
        }
        Ok(())
    }

    /// Builds the router with all routes and middleware.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/orders", post(handlers::create_order))
            .route("/orders/{id}", get(handlers::get_order))
            .route("/orders/{id}/fallback", get(handlers::chat_fallback))
            .route("/payment/initiate", post(handlers::initiate_payment))
            .route("/payment/verify", post(handlers::verify_payment))
            .route(
                "/payment/status/{gateway_order_id}",
                get(handlers::payment_status),
            )
            .route("/webhooks/payment", post(handlers::payment_webhook))
            .route("/health", get(handlers::health))
            .route("/metrics", get(handlers::metrics));

        if let Some(token) = self.settings.admin_token.clone() {
            let admin = Router::new()
                .route("/admin/orders", get(handlers::admin_list_orders))
                .route("/admin/orders/{id}/status", post(handlers::admin_set_status))
                .route_layer(middleware::from_fn_with_state(
                    Arc::<str>::from(token),
                    require_admin_token,
                ));
            router = router.merge(admin);
        }

        router
            .layer(middleware::from_fn_with_state(
                self.state.metrics.clone(),
                metrics_middleware,
            ))
            .with_state(self.state.clone())
    }
}

async fn require_admin_token(State(token): State<Arc<str>>, req: Request, next: Next) -> Response {
    let presented = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if presented != Some(&*token) {
        warn!(path = %req.uri().path(), "Rejected admin request");
        return ApiError::Unauthorized.into_response();
    }
    next.run(req).await
}

/// Middleware for collecting metrics on HTTP requests
async fn metrics_middleware(State(metrics): State<Arc<Metrics>>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    // Route template, so path parameters do not blow up label cardinality.
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let content_length = content_length(req.headers());
    if content_length > 0 {
        metrics.record_network_traffic("in", content_length);
    }

    let start = std::time::Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed();

    let status = response.status().as_u16();
    metrics.record_request(&method, &endpoint, status, duration);
    if status >= 400 {
        metrics.record_error("http", &endpoint);
    }

    let response_size = self::content_length(response.headers());
    if response_size > 0 {
        metrics.record_network_traffic("out", response_size);
    }

    response
}

fn content_length(headers: &axum::http::HeaderMap) -> usize {
    headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0)
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
