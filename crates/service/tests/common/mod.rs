#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gateway::signature::{payment_message, sign};
use gateway::{
    CreateGatewayOrder, GatewayError, GatewayOrder, GatewayOrderState, GatewayOrderStatus,
    GatewayPayment, PaymentGateway,
};
use memstore::InMemoryStore;
use model::{CartLine, CreateOrderRequest, Customer, PaymentMethod, Product};
use notifier::{NotificationDispatcher, Notifier, OrderEvent};
use service::{IntakeSettings, OrderServiceImpl, PaymentServiceImpl};
use tokio::sync::mpsc;

pub const KEY_SECRET: &str = "test_key_secret";
pub const WEBHOOK_SECRET: &str = "test_webhook_secret";

/// Gateway double: hands out sequential order ids and reports a configurable status.
#[derive(Default)]
pub struct FakeGateway {
    created: Mutex<Vec<CreateGatewayOrder>>,
    status: Mutex<Option<GatewayOrderStatus>>,
    status_by_id: Mutex<HashMap<String, GatewayOrderStatus>>,
    fetched: Mutex<Vec<String>>,
    unavailable: Mutex<bool>,
}

impl FakeGateway {
    pub fn set_status(&self, state: &str, payments: Vec<GatewayPayment>) {
        *self.status.lock().unwrap() = Some(GatewayOrderStatus {
            state: GatewayOrderState::from(state),
            raw_status: state.to_string(),
            payments,
        });
    }

    /// Status reported for `gateway_order_id` only; other ids keep the shared status.
    pub fn set_status_for(&self, gateway_order_id: &str, state: &str, payments: Vec<GatewayPayment>) {
        self.status_by_id.lock().unwrap().insert(
            gateway_order_id.to_string(),
            GatewayOrderStatus {
                state: GatewayOrderState::from(state),
                raw_status: state.to_string(),
                payments,
            },
        );
    }

    /// Gateway order ids whose status was fetched, in call order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    pub fn created(&self) -> Vec<CreateGatewayOrder> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn key_id(&self) -> &str {
        "rzp_test_key"
    }

    async fn create_order(&self, request: &CreateGatewayOrder) -> Result<GatewayOrder, GatewayError> {
        if *self.unavailable.lock().unwrap() {
            return Err(GatewayError::Unavailable("gateway down".into()));
        }
        let mut created = self.created.lock().unwrap();
        created.push(request.clone());
        Ok(GatewayOrder {
            id: format!("order_test{}", created.len()),
            amount: request.amount,
            currency: request.currency.clone(),
        })
    }

    fn verify_payment_signature(&self, order_ref: &str, payment_ref: &str, signature: &str) -> bool {
        gateway::signature::verify_payment_signature(KEY_SECRET, order_ref, payment_ref, signature)
    }

    async fn fetch_order_status(&self, gateway_order_id: &str) -> Result<GatewayOrderStatus, GatewayError> {
        self.fetched.lock().unwrap().push(gateway_order_id.to_string());
        if *self.unavailable.lock().unwrap() {
            return Err(GatewayError::Unavailable("gateway down".into()));
        }
        if let Some(status) = self.status_by_id.lock().unwrap().get(gateway_order_id) {
            return Ok(status.clone());
        }
        Ok(self.status.lock().unwrap().clone().unwrap_or(GatewayOrderStatus {
            state: GatewayOrderState::Created,
            raw_status: "created".into(),
            payments: Vec::new(),
        }))
    }
}

/// Forwards every event to a channel so tests can count deliveries.
pub struct RecordingNotifier(pub mpsc::UnboundedSender<OrderEvent>);

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &OrderEvent) -> anyhow::Result<()> {
        let _ = self.0.send(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub store: InMemoryStore,
    pub gateway: Arc<FakeGateway>,
    pub orders: OrderServiceImpl,
    pub payments: PaymentServiceImpl,
    pub events: mpsc::UnboundedReceiver<OrderEvent>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_webhook_secret(Some(WEBHOOK_SECRET.to_string())).await
    }

    pub async fn with_webhook_secret(secret: Option<String>) -> Self {
        let store = InMemoryStore::with_products(catalog()).await;
        let gateway = Arc::new(FakeGateway::default());
        let (tx, events) = mpsc::unbounded_channel();
        let dispatcher = NotificationDispatcher::new(Arc::new(RecordingNotifier(tx)));
        let orders = OrderServiceImpl::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            dispatcher.clone(),
            IntakeSettings {
                dedup_window: Duration::from_secs(300),
                whatsapp_number: "919900112233".into(),
            },
        );
        let payments = PaymentServiceImpl::new(Arc::new(store.clone()), gateway.clone(), dispatcher, secret);
        Self {
            store,
            gateway,
            orders,
            payments,
            events,
        }
    }

    /// Drains notifications delivered so far.
    pub async fn drain_events(&mut self) -> Vec<OrderEvent> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

pub fn catalog() -> Vec<Product> {
    vec![
        Product {
            id: "gruffalo".into(),
            title: "The Gruffalo".into(),
            mrp: 19900,
            stock: 10,
        },
        Product {
            id: "hungry-caterpillar".into(),
            title: "The Very Hungry Caterpillar".into(),
            mrp: 29900,
            stock: 2,
        },
    ]
}

pub fn customer(phone: &str) -> Customer {
    Customer {
        name: "Asha Rao".into(),
        phone: phone.into(),
        email: Some("asha@example.com".into()),
        address: "12 MG Road".into(),
        pincode: Some("560001".into()),
        city: Some("Bengaluru".into()),
        state: Some("KA".into()),
    }
}

pub fn order_request(phone: &str, cart: &[(&str, i32)], method: PaymentMethod) -> CreateOrderRequest {
    CreateOrderRequest {
        customer: customer(phone),
        cart: cart
            .iter()
            .map(|(id, quantity)| CartLine {
                product_id: (*id).into(),
                quantity: *quantity,
            })
            .collect(),
        payment_method: method,
    }
}

pub fn payment_signature(gateway_order_id: &str, payment_id: &str) -> String {
    sign(KEY_SECRET.as_bytes(), payment_message(gateway_order_id, payment_id).as_bytes()).unwrap()
}

pub fn webhook_signature(body: &[u8]) -> String {
    sign(WEBHOOK_SECRET.as_bytes(), body).unwrap()
}

pub fn captured_webhook(gateway_order_id: &str, payment_id: &str, order_id: &str) -> Vec<u8> {
    serde_json::json!({
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": gateway_order_id,
                    "status": "captured",
                    "notes": { "orderId": order_id }
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}

pub fn failed_webhook(gateway_order_id: &str, payment_id: &str) -> Vec<u8> {
    serde_json::json!({
        "event": "payment.failed",
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": gateway_order_id,
                    "status": "failed",
                    "error_description": "Card declined",
                    "notes": []
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}
