//! Webhook event payloads pushed by the gateway.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::NOTE_ORDER_ID;

/// Events the reconciliation logic reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
    PaymentCaptured,
    PaymentAuthorized,
    PaymentFailed,
    OrderPaid,
    Other,
}

impl WebhookEventKind {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            WebhookEventKind::PaymentCaptured
                | WebhookEventKind::PaymentAuthorized
                | WebhookEventKind::OrderPaid
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub payment: Option<Entity<PaymentEntity>>,
    #[serde(default)]
    pub order: Option<Entity<OrderEntity>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entity<T> {
    pub entity: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_notes")]
    pub notes: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderEntity {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "deserialize_notes")]
    pub notes: HashMap<String, String>,
}

/// Notes arrive as an object, or as `[]` when empty.
fn deserialize_notes<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::String(s) => Some((k, s)),
                Value::Null => None,
                other => Some((k, other.to_string())),
            })
            .collect(),
        _ => HashMap::new(),
    })
}

impl WebhookEvent {
    pub fn parse(raw_body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw_body)
    }

    pub fn kind(&self) -> WebhookEventKind {
        match self.event.as_str() {
            "payment.captured" => WebhookEventKind::PaymentCaptured,
            "payment.authorized" => WebhookEventKind::PaymentAuthorized,
            "payment.failed" => WebhookEventKind::PaymentFailed,
            "order.paid" => WebhookEventKind::OrderPaid,
            _ => WebhookEventKind::Other,
        }
    }

    fn payment(&self) -> Option<&PaymentEntity> {
        self.payload.payment.as_ref().map(|p| &p.entity)
    }

    fn order(&self) -> Option<&OrderEntity> {
        self.payload.order.as_ref().map(|o| &o.entity)
    }

    /// Internal order id carried in the notes, payment notes first.
    pub fn internal_order_ref(&self) -> Option<&str> {
        self.payment()
            .and_then(|p| p.notes.get(NOTE_ORDER_ID))
            .or_else(|| self.order().and_then(|o| o.notes.get(NOTE_ORDER_ID)))
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn gateway_order_id(&self) -> Option<&str> {
        self.payment()
            .and_then(|p| p.order_id.as_deref())
            .or_else(|| self.order().map(|o| o.id.as_str()))
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.payment().map(|p| p.id.as_str())
    }

    /// Raw status of the payment entity, or of the order entity when no payment is attached.
    pub fn raw_status(&self) -> Option<&str> {
        self.payment()
            .and_then(|p| p.status.as_deref())
            .or_else(|| self.order().and_then(|o| o.status.as_deref()))
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.payment().and_then(|p| p.error_description.as_deref())
    }
}
