//! Request and response bodies of the HTTP API (camelCase JSON).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CartLine, Customer, OrderStatus, PaymentMethod};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer: Customer,
    #[serde(default)]
    pub cart: Vec<CartLine>,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub total_amount: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub is_existing: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct InitiatePaymentRequest {
    pub order_id: String,
    pub amount: i64,
    pub customer_phone: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentResponse {
    pub gateway_order_id: String,
    pub gateway_key_id: String,
    pub amount: i64,
    pub currency: String,
    pub order_id: Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifyPaymentRequest {
    pub gateway_order_id: String,
    pub payment_id: String,
    pub signature: String,
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub message: String,
    pub order_id: Uuid,
    pub payment_id: Option<String>,
    pub order_status: OrderStatus,
}

/// Payment progress as reported to the polling client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    Pending,
    Completed,
    Failed,
}

impl PaymentState {
    pub fn from_order_status(status: OrderStatus) -> Self {
        match status {
            OrderStatus::PaymentFailed | OrderStatus::Cancelled => PaymentState::Failed,
            OrderStatus::PendingPayment | OrderStatus::PendingWhatsapp => PaymentState::Pending,
            OrderStatus::Confirmed | OrderStatus::Shipped | OrderStatus::Fulfilled => {
                PaymentState::Completed
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub success: bool,
    pub state: PaymentState,
    pub order_status: OrderStatus,
    pub order_id: Uuid,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentStatusQuery {
    pub order: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FallbackResponse {
    pub order_id: Uuid,
    pub message: String,
    /// Absent when no business chat number is configured.
    pub deep_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminListQuery {
    pub status: Option<OrderStatus>,
    pub limit: Option<i64>,
}
