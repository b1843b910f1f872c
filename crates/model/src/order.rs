use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OrderStatus — статус заказа.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingWhatsapp,
    PendingPayment,
    Confirmed,
    PaymentFailed,
    Shipped,
    Fulfilled,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::PendingWhatsapp,
        OrderStatus::PendingPayment,
        OrderStatus::Confirmed,
        OrderStatus::PaymentFailed,
        OrderStatus::Shipped,
        OrderStatus::Fulfilled,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingWhatsapp => "PENDING_WHATSAPP",
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::PaymentFailed => "PAYMENT_FAILED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Fulfilled => "FULFILLED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, OrderStatus::PendingWhatsapp | OrderStatus::PendingPayment)
    }

    /// Terminal for payment reconciliation: no channel moves the order past this point.
    pub fn is_payment_terminal(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::PaymentFailed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError(pub String);

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown order status '{}'", self.0)
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// PaymentMethod — способ оплаты, выбранный при оформлении.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Gateway,
    Whatsapp,
    Cod,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Gateway => "GATEWAY",
            PaymentMethod::Whatsapp => "WHATSAPP",
            PaymentMethod::Cod => "COD",
        }
    }

    /// Status a freshly created order starts in.
    pub fn initial_status(&self) -> OrderStatus {
        match self {
            PaymentMethod::Gateway => OrderStatus::PendingPayment,
            PaymentMethod::Whatsapp | PaymentMethod::Cod => OrderStatus::PendingWhatsapp,
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GATEWAY" => Ok(PaymentMethod::Gateway),
            "WHATSAPP" => Ok(PaymentMethod::Whatsapp),
            "COD" => Ok(PaymentMethod::Cod),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// Source of a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Verify,
    Webhook,
    Poll,
    Admin,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Verify => "verify",
            Channel::Webhook => "webhook",
            Channel::Poll => "poll",
            Channel::Admin => "admin",
        }
    }
}

/// Customer — снимок данных доставки на момент оформления.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    pub address: String,
    #[serde(default)]
    pub pincode: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// OrderItem — замороженная копия строки корзины с уже применённой скидкой.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub title: String,
    /// Discounted unit price in paise.
    pub unit_price: i64,
    pub quantity: i32,
}

impl OrderItem {
    pub fn subtotal(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

/// Gateway round-trip artifacts accumulated over an order's life.
///
/// Updates are merged field by field: a field absent from the update never clears
/// what an earlier step recorded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_order_created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    /// Raw status string as reported by the gateway.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_via: Option<Channel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_received_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_polled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_updated_at: Option<DateTime<Utc>>,
}

impl PaymentMeta {
    /// Merges `update` into `self`; set fields in `update` win, unset fields keep the old value.
    pub fn merge(&mut self, update: &PaymentMeta) {
        fn take<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if let Some(v) = src {
                *dst = Some(v.clone());
            }
        }
        take(&mut self.gateway_order_id, &update.gateway_order_id);
        take(&mut self.gateway_order_created_at, &update.gateway_order_created_at);
        take(&mut self.payment_id, &update.payment_id);
        take(&mut self.gateway_status, &update.gateway_status);
        take(&mut self.failure_reason, &update.failure_reason);
        take(&mut self.resolved_via, &update.resolved_via);
        take(&mut self.signature_verified_at, &update.signature_verified_at);
        take(&mut self.confirmed_at, &update.confirmed_at);
        take(&mut self.failed_at, &update.failed_at);
        take(&mut self.webhook_event, &update.webhook_event);
        take(&mut self.webhook_received_at, &update.webhook_received_at);
        take(&mut self.last_polled_at, &update.last_polled_at);
        take(&mut self.admin_updated_at, &update.admin_updated_at);
    }
}

/// Order — основной агрегат заказа.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    /// Sum of item subtotals at creation; never changes afterwards.
    pub total_amount: i64,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub gateway_order_id: Option<String>,
    pub payment_id: Option<String>,
    pub meta: PaymentMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a new order from an already-priced item snapshot.
    pub fn new(customer: Customer, items: Vec<OrderItem>, payment_method: PaymentMethod) -> Self {
        let now = Utc::now();
        let total_amount = items.iter().map(OrderItem::subtotal).sum();
        Self {
            id: Uuid::new_v4(),
            customer,
            items,
            total_amount,
            status: payment_method.initial_status(),
            payment_method,
            gateway_order_id: None,
            payment_id: None,
            meta: PaymentMeta::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i64::from(i.quantity)).sum()
    }
}
