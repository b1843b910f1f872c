use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Storage backend used for orders and the catalog.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Where notification events are sent.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotifyBackend {
    Log,
    Kafka,
}

/// `AppConfig` holds all configuration parameters required by the application.
///
/// The configuration is loaded from environment variables (optionally via a `.env` file)
/// or uses default values if the variable is not set. This struct is deserializable via Serde.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    // --- Database settings ---
    /// Database hostname or service name.
    pub db_host: String,
    /// Database port (default: 5432).
    pub db_port: u16,
    /// Database user.
    pub db_user: String,
    /// Database password.
    pub db_password: String,
    /// Database name.
    pub db_name: String,
    /// Maximum number of pooled connections.
    pub db_pool_size: usize,
    /// Directory holding `.sql` migration files.
    pub migrations_dir: String,

    // --- Storage ---
    pub store_backend: StoreBackend,
    /// JSON catalog loaded into the memory store at startup (empty = no seed).
    pub catalog_seed_path: String,

    // --- HTTP server ---
    /// The port on which the HTTP server will listen.
    pub http_port: u16,

    // --- Shutdown timeout ---
    /// Graceful shutdown timeout (human-friendly format, e.g. "5s", "1m").
    #[serde(deserialize_with = "deserialize_duration")]
    pub shutdown_timeout: Duration,

    // --- Payment gateway ---
    pub gateway_base_url: String,
    pub gateway_key_id: String,
    pub gateway_key_secret: String,
    /// Webhook signing secret. When unset, webhooks are accepted unverified.
    #[serde(default)]
    pub gateway_webhook_secret: Option<String>,
    /// Timeout applied to every gateway HTTP call.
    #[serde(deserialize_with = "deserialize_duration")]
    pub gateway_timeout: Duration,

    // --- Order intake ---
    /// Window in which an identical pending order is returned instead of creating a new one.
    #[serde(deserialize_with = "deserialize_duration")]
    pub dedup_window: Duration,

    // --- Notifications ---
    pub notify_backend: NotifyBackend,
    /// Comma-separated list of Kafka brokers.
    pub kafka_brokers: String,
    /// Kafka topic for order notification events.
    pub kafka_topic: String,
    /// Business chat number used in order deep links (country code, digits only).
    pub whatsapp_number: String,

    // --- Admin ---
    /// Token expected in `x-admin-token`. Admin routes are disabled when unset.
    #[serde(default)]
    pub admin_token: Option<String>,
}

/// Custom deserializer for durations.
/// Accepts human-readable formats like "5s", "1m", etc.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let val = String::deserialize(deserializer)?;
    humantime::parse_duration(&val)
        .map_err(|e| D::Error::custom(format!("Invalid duration '{val}': {e}")))
}

impl AppConfig {
    /// Loads configuration from environment variables (and optionally from `.env` file).
    ///
    /// Fields not set via env will be filled with default values.
    ///
    /// # Errors
    /// Returns an error if environment variables are invalid or missing required values.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            // Database
            .set_default("db_host", "localhost")?
            .set_default("db_port", 5432)?
            .set_default("db_user", "store_user")?
            .set_default("db_password", "securepassword")?
            .set_default("db_name", "store_db")?
            .set_default("db_pool_size", 16)?
            .set_default("migrations_dir", "migrations")?
            // Storage
            .set_default("store_backend", "postgres")?
            .set_default("catalog_seed_path", "")?
            // HTTP
            .set_default("http_port", 8081)?
            // Shutdown
            .set_default("shutdown_timeout", "5s")?
            // Gateway
            .set_default("gateway_base_url", "https://api.razorpay.com")?
            .set_default("gateway_key_id", "")?
            .set_default("gateway_key_secret", "")?
            .set_default("gateway_timeout", "10s")?
            // Intake
            .set_default("dedup_window", "5m")?
            // Notifications
            .set_default("notify_backend", "log")?
            .set_default("kafka_brokers", "localhost:9092")?
            .set_default("kafka_topic", "order-notifications")?
            .set_default("whatsapp_number", "")?
            .add_source(config::Environment::default())
            .build()?;

        let cfg: AppConfig = settings
            .try_deserialize()
            .context("Failed to load configuration")?;
        Ok(cfg.normalized())
    }

    /// Empty strings in optional secrets mean "not configured".
    fn normalized(mut self) -> Self {
        self.gateway_webhook_secret = self.gateway_webhook_secret.filter(|s| !s.trim().is_empty());
        self.admin_token = self.admin_token.filter(|s| !s.trim().is_empty());
        self
    }

    /// Broker list as expected by the Kafka client.
    pub fn kafka_broker_list(&self) -> Vec<String> {
        self.kafka_brokers
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(String::from)
            .collect()
    }

    /// Whether the gateway has credentials to create orders.
    pub fn gateway_configured(&self) -> bool {
        !self.gateway_key_id.is_empty() && !self.gateway_key_secret.is_empty()
    }
}
