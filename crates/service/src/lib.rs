//! Business logic layer: order intake and payment reconciliation.
//!
//! This module defines the [`OrderService`] and [`PaymentService`] traits and
//! their implementations [`OrderServiceImpl`] and [`PaymentServiceImpl`].
//!
//! # Features
//! - Server-side re-pricing of every cart against the live catalog.
//! - Duplicate-submission detection without a client idempotency key.
//! - Three independent payment channels (checkout callback, webhook, status
//!   poll) converging on one order through guarded status updates.
//! - Fire-and-forget notifications on the first transition only.
//! - Well-typed error handling via [`ServiceError`].

mod intake;
mod payment;
mod validation;

use async_trait::async_trait;
use gateway::GatewayError;
use model::{
    CreateOrderRequest, CreateOrderResponse, FallbackResponse, InitiatePaymentRequest,
    InitiatePaymentResponse, Order, OrderStatus, PaymentStatusResponse, VerifyPaymentRequest,
    VerifyPaymentResponse,
};
use repository::RepositoryError;
use thiserror::Error;
use uuid::Uuid;

pub use intake::{IntakeSettings, OrderServiceImpl};
pub use payment::{PaymentServiceImpl, WebhookOutcome};
pub use validation::normalize_phone;

/// The main error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Bad input shape or values; the message names the first violation.
    #[error("{0}")]
    Validation(String),
    #[error("Product not found: {0}")]
    ProductNotFound(String),
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: String,
        requested: i32,
        available: i32,
    },
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("Payment gateway rejected the request: {0}")]
    GatewayRejected(String),
    /// A payment callback or webhook failed signature verification.
    #[error("Payment signature verification failed")]
    SignatureMismatch,
    #[error("Order not found: {0}")]
    OrderNotFound(String),
    /// The order exists but is not in a state that allows the operation.
    #[error("{0}")]
    InvalidOrderState(String),
    /// A repository (database) operation failed.
    #[error("Database error: {0}")]
    Db(#[from] RepositoryError),
    /// Some unexpected or unhandled error.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected(msg) => ServiceError::GatewayRejected(msg),
            GatewayError::Unavailable(msg) | GatewayError::Malformed(msg) => {
                ServiceError::GatewayUnavailable(msg)
            }
        }
    }
}

impl ServiceError {
    /// Turns a repository miss into `OrderNotFound`, keeping other failures as they are.
    fn from_lookup(err: RepositoryError, reference: &str) -> Self {
        match err {
            RepositoryError::NotFound => ServiceError::OrderNotFound(reference.to_string()),
            other => ServiceError::Db(other),
        }
    }
}

fn parse_order_id(raw: &str) -> Result<Uuid, ServiceError> {
    raw.trim()
        .parse::<Uuid>()
        .map_err(|_| ServiceError::Validation(format!("Invalid order id '{raw}'")))
}

/// Order intake and order queries.
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Validates and re-prices a cart, then creates an order or returns the
    /// matching one created moments ago.
    async fn create_order(&self, request: CreateOrderRequest) -> Result<CreateOrderResponse, ServiceError>;

    async fn get_order(&self, order_id: &str) -> Result<Order, ServiceError>;

    /// Chat hand-off for an existing order. Never creates or mutates an order.
    async fn chat_fallback(&self, order_id: &str) -> Result<FallbackResponse, ServiceError>;

    async fn list_orders(&self, status: Option<OrderStatus>, limit: Option<i64>) -> Result<Vec<Order>, ServiceError>;

    /// Manual status override from the admin dashboard.
    async fn admin_set_status(&self, order_id: &str, status: OrderStatus) -> Result<Order, ServiceError>;
}

/// Payment initiation and reconciliation.
#[async_trait]
pub trait PaymentService: Send + Sync {
    async fn initiate(&self, request: InitiatePaymentRequest) -> Result<InitiatePaymentResponse, ServiceError>;

    /// Checkout callback from the paying browser.
    async fn verify(&self, request: VerifyPaymentRequest) -> Result<VerifyPaymentResponse, ServiceError>;

    /// Gateway push. Only signature failures are returned as errors; everything
    /// else is reported through the outcome.
    async fn handle_webhook(&self, raw_body: &[u8], signature: Option<&str>) -> Result<WebhookOutcome, ServiceError>;

    /// Client poll while a payment is in flight.
    async fn poll_status(&self, gateway_order_id: &str, order_ref: Option<&str>) -> Result<PaymentStatusResponse, ServiceError>;
}
