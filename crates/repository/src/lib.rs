//! # Data Repository Layer
//!
//! This module provides the order store and catalog traits together with
//! their PostgreSQL implementations.
//!
//! Every status change goes through [`OrdersRepository::transition`], a
//! compare-and-set on the current status executed by the storage layer in a
//! single statement. Callers never read, modify and write back a status.

mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{Order, OrderStatus, PaymentMeta, Product};
use thiserror::Error;
use uuid::Uuid;

pub use pg::{PgOrdersRepository, PgProductsRepository};

/// # RepositoryError
///
/// Error types that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database-related errors, wrapping the underlying PostgreSQL error
    #[error("Database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    /// Failed to obtain a connection from the pool.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    /// The storage backend cannot serve requests right now.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    /// A stored row could not be mapped back to the domain model.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    /// No result found.
    #[error("Not found")]
    NotFound,
}

/// A guarded status change: applied only while the order is still in `expected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub expected: OrderStatus,
    pub target: OrderStatus,
    /// Stored only if the order has no payment id yet.
    pub payment_id: Option<String>,
    /// Merged into the stored meta.
    pub meta: PaymentMeta,
}

impl StatusUpdate {
    pub fn confirm_payment(payment_id: Option<String>, meta: PaymentMeta) -> Self {
        Self {
            expected: OrderStatus::PendingPayment,
            target: OrderStatus::Confirmed,
            payment_id,
            meta,
        }
    }

    pub fn fail_payment(meta: PaymentMeta) -> Self {
        Self {
            expected: OrderStatus::PendingPayment,
            target: OrderStatus::PaymentFailed,
            payment_id: None,
            meta,
        }
    }
}

/// Outcome of a guarded update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The guard held and the order was updated; carries the new state.
    Applied(Order),
    /// The order was no longer in the expected status; carries the current state.
    Unchanged(Order),
}

impl Transition {
    pub fn applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }

    pub fn order(&self) -> &Order {
        match self {
            Transition::Applied(order) | Transition::Unchanged(order) => order,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            Transition::Applied(order) | Transition::Unchanged(order) => order,
        }
    }
}

/// # OrdersRepository
///
/// Persistence of orders and their item snapshots. Owns the authoritative
/// order status.
#[async_trait]
pub trait OrdersRepository: Send + Sync {
    /// Inserts an order together with its items, atomically.
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Order, RepositoryError>;

    async fn get_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Order, RepositoryError>;

    /// Most recent still-pending order for `phone` with exactly `total_amount`,
    /// created at or after `since`.
    async fn find_recent_pending(
        &self,
        phone: &str,
        total_amount: i64,
        since: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Records the gateway order handle, only while the order awaits payment.
    async fn attach_gateway_order(
        &self,
        id: Uuid,
        gateway_order_id: &str,
        meta: &PaymentMeta,
    ) -> Result<Transition, RepositoryError>;

    /// Compare-and-set of the order status.
    async fn transition(&self, id: Uuid, update: &StatusUpdate) -> Result<Transition, RepositoryError>;

    /// Unconditional status override (admin only).
    async fn set_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        meta: &PaymentMeta,
    ) -> Result<Order, RepositoryError>;

    /// Newest orders first, optionally filtered by status.
    async fn list_recent(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> Result<Vec<Order>, RepositoryError>;
}

/// # ProductsRepository
///
/// Read access to the live catalog.
#[async_trait]
pub trait ProductsRepository: Send + Sync {
    /// Returns the products that exist among `ids`; unknown ids are simply absent.
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Product>, RepositoryError>;
}
