use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use gateway::signature::sign;
use gateway::{
    CreateGatewayOrder, GatewayError, GatewayOrder, GatewayOrderState, GatewayOrderStatus,
    PaymentGateway,
};
use memstore::InMemoryStore;
use model::Product;
use notifier::{LogNotifier, NotificationDispatcher};
use serde_json::{Value, json};
use server::{ADMIN_TOKEN_HEADER, Server, ServerSettings, WEBHOOK_SIGNATURE_HEADER};
use service::{IntakeSettings, OrderServiceImpl, PaymentServiceImpl};
use tower::ServiceExt;

const KEY_SECRET: &str = "route_key_secret";
const WEBHOOK_SECRET: &str = "route_webhook_secret";
const ADMIN_TOKEN: &str = "let-me-in";

struct StubGateway;

#[async_trait]
impl PaymentGateway for StubGateway {
    fn key_id(&self) -> &str {
        "rzp_test_key"
    }

    async fn create_order(&self, request: &CreateGatewayOrder) -> Result<GatewayOrder, GatewayError> {
        Ok(GatewayOrder {
            id: format!("order_{}", request.receipt.replace('-', "")),
            amount: request.amount,
            currency: request.currency.clone(),
        })
    }

    fn verify_payment_signature(&self, order_ref: &str, payment_ref: &str, signature: &str) -> bool {
        gateway::signature::verify_payment_signature(KEY_SECRET, order_ref, payment_ref, signature)
    }

    async fn fetch_order_status(&self, _: &str) -> Result<GatewayOrderStatus, GatewayError> {
        Ok(GatewayOrderStatus {
            state: GatewayOrderState::Created,
            raw_status: "created".into(),
            payments: Vec::new(),
        })
    }
}

async fn app(admin_token: Option<&str>) -> Router {
    let store = InMemoryStore::with_products([Product {
        id: "gruffalo".into(),
        title: "The Gruffalo".into(),
        mrp: 19900,
        stock: 10,
    }])
    .await;
    let dispatcher = NotificationDispatcher::new(Arc::new(LogNotifier));
    let orders = OrderServiceImpl::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        dispatcher.clone(),
        IntakeSettings::default(),
    );
    let payments = PaymentServiceImpl::new(
        Arc::new(store),
        Arc::new(StubGateway),
        dispatcher,
        Some(WEBHOOK_SECRET.to_string()),
    );
    let server = Server::new(
        ServerSettings {
            port: 0,
            shutdown_timeout: Duration::from_secs(1),
            admin_token: admin_token.map(String::from),
        },
        Arc::new(orders),
        Arc::new(payments),
    )
    .unwrap();
    server.router()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn order_body(quantity: i32) -> Value {
    json!({
        "customer": {
            "name": "Asha Rao",
            "phone": "9876543210",
            "address": "12 MG Road",
            "pincode": "560001"
        },
        "cart": [{ "productId": "gruffalo", "quantity": quantity }],
        "paymentMethod": "GATEWAY"
    })
}

#[tokio::test]
async fn test_checkout_flow() {
    let app = app(None).await;

    let (status, created) = send(&app, post_json("/orders", &order_body(3))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["totalAmount"], 35820);
    assert_eq!(created["status"], "PENDING_PAYMENT");
    let order_id = created["orderId"].as_str().unwrap().to_string();

    let (status, again) = send(&app, post_json("/orders", &order_body(3))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["orderId"], order_id.as_str());
    assert_eq!(again["isExisting"], true);

    let (status, initiated) = send(
        &app,
        post_json(
            "/payment/initiate",
            &json!({ "orderId": order_id, "amount": 35820, "customerPhone": "9876543210", "customerName": "Asha Rao" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(initiated["currency"], "INR");
    let gateway_order_id = initiated["gatewayOrderId"].as_str().unwrap().to_string();

    let (status, polled) = send(&app, get(&format!("/payment/status/{gateway_order_id}?order={order_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(polled["state"], "PENDING");

    let message = format!("{gateway_order_id}|pay_1");
    let signature = sign(KEY_SECRET.as_bytes(), message.as_bytes()).unwrap();
    let (status, verified) = send(
        &app,
        post_json(
            "/payment/verify",
            &json!({ "gatewayOrderId": gateway_order_id, "paymentId": "pay_1", "signature": signature, "orderId": order_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["success"], true);

    let (status, order) = send(&app, get(&format!("/orders/{order_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "CONFIRMED");
    assert_eq!(order["paymentId"], "pay_1");

    let (status, _) = send(&app, get(&format!("/orders/{order_id}/fallback"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_error_bodies() {
    let app = app(None).await;

    let (status, body) = send(&app, post_json("/orders", &order_body(0))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().is_some());

    let malformed = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = send(&app, get(&format!("/orders/{}", uuid::Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        post_json("/payment/initiate", &json!({ "orderId": uuid::Uuid::new_v4().to_string(), "amount": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_acknowledgement() {
    let app = app(None).await;
    let body = json!({ "event": "payment.captured", "payload": { "payment": { "entity": { "id": "pay_1", "order_id": "order_nobody" } } } }).to_string();
    let signature = sign(WEBHOOK_SECRET.as_bytes(), body.as_bytes()).unwrap();

    let signed = Request::builder()
        .method("POST")
        .uri("/webhooks/payment")
        .header(WEBHOOK_SIGNATURE_HEADER, signature)
        .body(Body::from(body.clone()))
        .unwrap();
    let (status, ack) = send(&app, signed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({ "received": true }));

    let forged = Request::builder()
        .method("POST")
        .uri("/webhooks/payment")
        .header(WEBHOOK_SIGNATURE_HEADER, "00ff")
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send(&app, forged).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_routes_require_token() {
    let disabled = app(None).await;
    let (status, _) = send(&disabled, get("/admin/orders")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let app = app(Some(ADMIN_TOKEN)).await;
    let (status, created) = send(&app, post_json("/orders", &order_body(1))).await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = created["orderId"].as_str().unwrap().to_string();

    let (status, _) = send(&app, get("/admin/orders")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let list = Request::builder()
        .uri("/admin/orders?status=PENDING_PAYMENT&limit=5")
        .header(ADMIN_TOKEN_HEADER, ADMIN_TOKEN)
        .body(Body::empty())
        .unwrap();
    let (status, orders) = send(&app, list).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders.as_array().map(Vec::len), Some(1));

    let ship = Request::builder()
        .method("POST")
        .uri(format!("/admin/orders/{order_id}/status"))
        .header(ADMIN_TOKEN_HEADER, ADMIN_TOKEN)
        .header("content-type", "application/json")
        .body(Body::from(json!({ "status": "SHIPPED" }).to_string()))
        .unwrap();
    let (status, order) = send(&app, ship).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "SHIPPED");
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = app(None).await;
    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&text).contains("http_requests_total"));
}
