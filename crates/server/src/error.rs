//! Mapping of service failures onto HTTP responses.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use service::ServiceError;
use tracing::error;

/// Error returned by every handler; renders as `{"success": false, "error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    BadRequest(String),
    Unauthorized,
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

fn service_status(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Validation(_)
        | ServiceError::ProductNotFound(_)
        | ServiceError::InsufficientStock { .. }
        | ServiceError::SignatureMismatch
        | ServiceError::InvalidOrderState(_) => StatusCode::BAD_REQUEST,
        ServiceError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::GatewayRejected(_) => StatusCode::BAD_GATEWAY,
        ServiceError::Db(_) | ServiceError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Service(err) => {
                let status = service_status(&err);
                let message = match &err {
                    ServiceError::Db(_) | ServiceError::Unexpected(_) => {
                        error!(error = %err, "Request failed");
                        "Internal server error".to_string()
                    }
                    ServiceError::GatewayUnavailable(_) => {
                        "Payment service is temporarily unavailable, please try again".to_string()
                    }
                    ServiceError::GatewayRejected(_) => {
                        "Payment could not be started, please try again".to_string()
                    }
                    _ => err.to_string(),
                };
                (status, message)
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ServiceError::Validation("bad".into()), 400),
            (ServiceError::ProductNotFound("x".into()), 400),
            (ServiceError::SignatureMismatch, 400),
            (ServiceError::OrderNotFound("x".into()), 404),
            (ServiceError::GatewayUnavailable("down".into()), 503),
            (ServiceError::GatewayRejected("no".into()), 502),
            (ServiceError::Unexpected("boom".into()), 500),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status().as_u16(), expected);
        }
    }
}
