//! Best-effort delivery of order notifications.
//!
//! [`NotificationDispatcher::dispatch`] hands an [`OrderEvent`] to a background
//! task and returns immediately. Sink failures are logged there and never reach
//! the caller.

mod kafka;
pub mod message;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use model::{Channel, Order};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

pub use kafka::KafkaNotifier;

/// Something worth telling the customer or the shop about.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    OrderPlaced {
        order: Order,
        message: String,
        #[serde(rename = "deepLink")]
        deep_link: Option<String>,
    },
    PaymentConfirmed {
        order: Order,
        channel: Channel,
    },
    PaymentFailed {
        order: Order,
        channel: Channel,
        reason: String,
    },
}

impl OrderEvent {
    pub fn order(&self) -> &Order {
        match self {
            OrderEvent::OrderPlaced { order, .. }
            | OrderEvent::PaymentConfirmed { order, .. }
            | OrderEvent::PaymentFailed { order, .. } => order,
        }
    }

    pub fn order_id(&self) -> Uuid {
        self.order().id
    }

    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced { .. } => "order_placed",
            OrderEvent::PaymentConfirmed { .. } => "payment_confirmed",
            OrderEvent::PaymentFailed { .. } => "payment_failed",
        }
    }
}

/// A notification sink (chat, email, message bus...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &OrderEvent) -> Result<()>;
}

/// Sink that only writes the event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &OrderEvent) -> Result<()> {
        info!(event = event.name(), order_id = %event.order_id(), "Order notification");
        Ok(())
    }
}

/// Fire-and-forget front of a [`Notifier`].
#[derive(Clone)]
pub struct NotificationDispatcher {
    sink: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn Notifier>) -> Self {
        Self { sink }
    }

    /// Starts delivery in the background; the caller never waits on the sink.
    pub fn dispatch(&self, event: OrderEvent) {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            if let Err(e) = sink.notify(&event).await {
                error!(
                    event = event.name(),
                    order_id = %event.order_id(),
                    error = %e,
                    "Notification delivery failed"
                );
            }
        });
    }
}
