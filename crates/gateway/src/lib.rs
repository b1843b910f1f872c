//! Payment gateway adapter.
//!
//! [`PaymentGateway`] is the seam the reconciliation logic talks to; the
//! production implementation is [`RazorpayGateway`]. Signature helpers live in
//! [`signature`], webhook payload types in [`webhook`].

mod razorpay;
pub mod signature;
pub mod webhook;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use razorpay::{RazorpayGateway, RazorpaySettings};
pub use signature::verify_webhook_signature;

/// Key under which the internal order id travels in gateway notes.
pub const NOTE_ORDER_ID: &str = "orderId";

/// Errors reported by a gateway call.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Credentials missing or rejected, network failure, timeout or provider outage.
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),
    /// The provider declined the request (e.g. invalid amount).
    #[error("Payment gateway rejected the request: {0}")]
    Rejected(String),
    /// The provider answered with a body we could not understand.
    #[error("Malformed gateway response: {0}")]
    Malformed(String),
}

/// Request to open a gateway order for a stored order.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CreateGatewayOrder {
    /// Amount in paise.
    pub amount: i64,
    pub currency: String,
    /// Our own reference, echoed back by the gateway.
    pub receipt: String,
    pub notes: BTreeMap<String, String>,
}

/// Handle of an order opened at the gateway.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

/// Lifecycle state of a gateway order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOrderState {
    Created,
    Attempted,
    Paid,
    Other(String),
}

impl From<&str> for GatewayOrderState {
    fn from(raw: &str) -> Self {
        match raw {
            "created" => GatewayOrderState::Created,
            "attempted" => GatewayOrderState::Attempted,
            "paid" => GatewayOrderState::Paid,
            other => GatewayOrderState::Other(other.to_string()),
        }
    }
}

/// One payment attempt against a gateway order.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GatewayPayment {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl GatewayPayment {
    pub fn is_successful(&self) -> bool {
        matches!(self.status.as_str(), "captured" | "authorized")
    }

    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }
}

/// Snapshot returned by [`PaymentGateway::fetch_order_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOrderStatus {
    pub state: GatewayOrderState,
    pub raw_status: String,
    pub payments: Vec<GatewayPayment>,
}

impl GatewayOrderStatus {
    /// First captured or authorized payment, if any.
    pub fn successful_payment(&self) -> Option<&GatewayPayment> {
        self.payments.iter().find(|p| p.is_successful())
    }

    /// True when there was at least one attempt and every attempt failed.
    pub fn all_attempts_failed(&self) -> bool {
        !self.payments.is_empty() && self.payments.iter().all(GatewayPayment::is_failed)
    }

    /// Most recent failure description reported for this order.
    pub fn last_failure_reason(&self) -> Option<&str> {
        self.payments
            .iter()
            .rev()
            .find_map(|p| p.error_description.as_deref())
    }
}

/// Operations the storefront needs from a payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key id handed to the checkout widget.
    fn key_id(&self) -> &str;

    async fn create_order(&self, request: &CreateGatewayOrder) -> Result<GatewayOrder, GatewayError>;

    /// Checks the checkout callback signature over `order_ref|payment_ref`.
    fn verify_payment_signature(&self, order_ref: &str, payment_ref: &str, signature: &str) -> bool;

    async fn fetch_order_status(&self, gateway_order_id: &str) -> Result<GatewayOrderStatus, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(id: &str, status: &str, error: Option<&str>) -> GatewayPayment {
        GatewayPayment {
            id: id.into(),
            status: status.into(),
            error_description: error.map(String::from),
        }
    }

    #[test]
    fn test_order_state_parsing() {
        assert_eq!(GatewayOrderState::from("paid"), GatewayOrderState::Paid);
        assert_eq!(GatewayOrderState::from("attempted"), GatewayOrderState::Attempted);
        assert_eq!(
            GatewayOrderState::from("expired"),
            GatewayOrderState::Other("expired".into())
        );
    }

    #[test]
    fn test_successful_payment_and_failures() {
        let status = GatewayOrderStatus {
            state: GatewayOrderState::Paid,
            raw_status: "paid".into(),
            payments: vec![
                payment("pay_1", "failed", Some("Card declined")),
                payment("pay_2", "captured", None),
            ],
        };
        assert_eq!(status.successful_payment().map(|p| p.id.as_str()), Some("pay_2"));
        assert!(!status.all_attempts_failed());

        let failed = GatewayOrderStatus {
            state: GatewayOrderState::Attempted,
            raw_status: "attempted".into(),
            payments: vec![
                payment("pay_1", "failed", Some("Card declined")),
                payment("pay_2", "failed", Some("Bank timeout")),
            ],
        };
        assert!(failed.all_attempts_failed());
        assert_eq!(failed.last_failure_reason(), Some("Bank timeout"));

        let untried = GatewayOrderStatus {
            state: GatewayOrderState::Attempted,
            raw_status: "attempted".into(),
            payments: vec![],
        };
        assert!(!untried.all_attempts_failed());
    }
}
