//! Request handlers. Each one delegates to a service and maps the result.

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use model::{
    AdminListQuery, AdminStatusRequest, CreateOrderRequest, CreateOrderResponse, FallbackResponse,
    InitiatePaymentRequest, InitiatePaymentResponse, Order, PaymentStatusQuery,
    PaymentStatusResponse, VerifyPaymentRequest, VerifyPaymentResponse, WebhookAck,
};
use service::ServiceError;
use tracing::{error, info, warn};

use crate::AppState;
use crate::error::ApiError;

/// Header carrying the gateway's webhook signature.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-razorpay-signature";

type ApiResult<T> = Result<T, ApiError>;

pub async fn create_order(
    State(state): State<AppState>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreateOrderResponse>)> {
    let Json(request) = payload?;
    let response = state.orders.create_order(request).await?;
    let status = if response.is_existing {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(response)))
}

pub async fn get_order(State(state): State<AppState>, Path(order_id): Path<String>) -> ApiResult<Json<Order>> {
    Ok(Json(state.orders.get_order(&order_id).await?))
}

pub async fn chat_fallback(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> ApiResult<Json<FallbackResponse>> {
    Ok(Json(state.orders.chat_fallback(&order_id).await?))
}

pub async fn initiate_payment(
    State(state): State<AppState>,
    payload: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> ApiResult<Json<InitiatePaymentResponse>> {
    let Json(request) = payload?;
    Ok(Json(state.payments.initiate(request).await?))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> ApiResult<Json<VerifyPaymentResponse>> {
    let Json(request) = payload?;
    match state.payments.verify(request).await {
        Ok(response) => {
            let outcome = if response.success { "confirmed" } else { "conflict" };
            state.metrics.record_payment_event("verify", outcome);
            Ok(Json(response))
        }
        Err(err) => {
            let outcome = match err {
                ServiceError::SignatureMismatch => "signature_mismatch",
                _ => "error",
            };
            state.metrics.record_payment_event("verify", outcome);
            Err(err.into())
        }
    }
}

pub async fn payment_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.payments.handle_webhook(&body, signature).await {
        Ok(outcome) => {
            info!(outcome = outcome.label(), "Webhook handled");
            state.metrics.record_payment_event("webhook", outcome.label());
        }
        Err(ServiceError::SignatureMismatch) => {
            state.metrics.record_payment_event("webhook", "signature_mismatch");
            return ApiError::from(ServiceError::SignatureMismatch).into_response();
        }
        Err(err) => {
            error!(error = %err, "Webhook handling failed");
            state.metrics.record_payment_event("webhook", "failed");
        }
    }
    Json(WebhookAck { received: true }).into_response()
}

pub async fn payment_status(
    State(state): State<AppState>,
    Path(gateway_order_id): Path<String>,
    query: Result<Query<PaymentStatusQuery>, QueryRejection>,
) -> ApiResult<Json<PaymentStatusResponse>> {
    let Query(query) = query?;
    let response = state
        .payments
        .poll_status(&gateway_order_id, query.order.as_deref())
        .await?;
    let outcome = match response.state {
        model::PaymentState::Completed => "completed",
        model::PaymentState::Failed => "failed",
        model::PaymentState::Pending => "pending",
    };
    state.metrics.record_payment_event("poll", outcome);
    Ok(Json(response))
}

pub async fn admin_list_orders(
    State(state): State<AppState>,
    query: Result<Query<AdminListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Order>>> {
    let Query(query) = query?;
    Ok(Json(state.orders.list_orders(query.status, query.limit).await?))
}

pub async fn admin_set_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    payload: Result<Json<AdminStatusRequest>, JsonRejection>,
) -> ApiResult<Json<Order>> {
    let Json(request) = payload?;
    let order = state.orders.admin_set_status(&order_id, request.status).await?;
    state.metrics.record_payment_event("admin", order.status.as_str());
    Ok(Json(order))
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}
