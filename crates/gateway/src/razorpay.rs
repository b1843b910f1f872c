//! HTTP client for a Razorpay-compatible orders API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::signature;
use crate::{
    CreateGatewayOrder, GatewayError, GatewayOrder, GatewayOrderState, GatewayOrderStatus,
    GatewayPayment, PaymentGateway,
};

/// Connection settings, built once at startup.
#[derive(Debug, Clone)]
pub struct RazorpaySettings {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
    pub timeout: Duration,
}

#[derive(Deserialize)]
struct OrderBody {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct PaymentsBody {
    #[serde(default)]
    items: Vec<GatewayPayment>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    description: String,
}

/// Gateway adapter talking to the provider over HTTPS with basic auth.
#[derive(Debug, Clone)]
pub struct RazorpayGateway {
    http: Client,
    settings: RazorpaySettings,
}

impl RazorpayGateway {
    /// Builds the HTTP client with the configured timeout.
    pub fn new(settings: RazorpaySettings) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("http client: {e}")))?;
        Ok(Self { http, settings })
    }

    fn configured(&self) -> bool {
        !self.settings.key_id.is_empty() && !self.settings.key_secret.is_empty()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, GatewayError> {
        if !self.configured() {
            return Err(GatewayError::Unavailable("gateway credentials are not configured".into()));
        }
        let response = self
            .http
            .get(self.url(path))
            .basic_auth(&self.settings.key_id, Some(&self.settings.key_secret))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        decode(response).await
    }
}

/// Maps provider responses: bad credentials and 5xx are outages, other 4xx are declines.
async fn decode<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(GatewayError::Unavailable(format!("credentials rejected (HTTP {status})")));
    }
    if status.is_client_error() {
        let description = response
            .json::<ErrorEnvelope>()
            .await
            .map(|e| e.error.description)
            .unwrap_or_default();
        let description = if description.is_empty() {
            format!("HTTP {status}")
        } else {
            description
        };
        return Err(GatewayError::Rejected(description));
    }
    if !status.is_success() {
        return Err(GatewayError::Unavailable(format!("HTTP {status}")));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| GatewayError::Malformed(e.to_string()))
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> &str {
        &self.settings.key_id
    }

    async fn create_order(&self, request: &CreateGatewayOrder) -> Result<GatewayOrder, GatewayError> {
        if !self.configured() {
            return Err(GatewayError::Unavailable("gateway credentials are not configured".into()));
        }
        if request.amount <= 0 {
            return Err(GatewayError::Rejected(format!("invalid amount {}", request.amount)));
        }

        let response = self
            .http
            .post(self.url("orders"))
            .basic_auth(&self.settings.key_id, Some(&self.settings.key_secret))
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let body: OrderBody = decode(response).await?;
        debug!(gateway_order_id = %body.id, status = %body.status, "Gateway order created");
        Ok(GatewayOrder {
            id: body.id,
            amount: body.amount,
            currency: body.currency,
        })
    }

    fn verify_payment_signature(&self, order_ref: &str, payment_ref: &str, signature: &str) -> bool {
        let ok = signature::verify_payment_signature(
            &self.settings.key_secret,
            order_ref,
            payment_ref,
            signature,
        );
        if !ok {
            warn!(gateway_order_id = %order_ref, payment_id = %payment_ref, "Payment signature mismatch");
        }
        ok
    }

    async fn fetch_order_status(&self, gateway_order_id: &str) -> Result<GatewayOrderStatus, GatewayError> {
        let order: OrderBody = self.get_json(&format!("orders/{gateway_order_id}")).await?;
        let payments: PaymentsBody = self
            .get_json(&format!("orders/{gateway_order_id}/payments"))
            .await?;
        Ok(GatewayOrderStatus {
            state: GatewayOrderState::from(order.status.as_str()),
            raw_status: order.status,
            payments: payments.items,
        })
    }
}
