//! API error type with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use event_store::EventStoreError;
use orchestrator::OrchestratorError;
use wallet::WalletError;

/// API-level error that maps onto HTTP status codes.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client (400).
    BadRequest(String),
    /// Resource not found (404).
    NotFound(String),
    /// Duplicate event id at the log (409).
    Conflict(String),
    /// Anything else (500).
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match &err {
            OrchestratorError::Validation(_) => ApiError::BadRequest(err.to_string()),
            OrchestratorError::NotFound(_) => ApiError::NotFound(err.to_string()),
            OrchestratorError::EventStore(EventStoreError::Conflict(_)) => {
                ApiError::Conflict(err.to_string())
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        match &err {
            WalletError::Domain(DomainError::NonPositiveAmount(_)) => {
                ApiError::BadRequest(err.to_string())
            }
            WalletError::EventStore(EventStoreError::Conflict(_)) => {
                ApiError::Conflict(err.to_string())
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}
