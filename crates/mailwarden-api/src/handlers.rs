//! API request handlers

pub mod accounts;
pub mod campaigns;
pub mod health;
pub mod metrics;
pub mod spam;
pub mod tracking;
pub mod unsubscribe;
pub mod webhooks;

use axum::{http::StatusCode, Json};
use mailwarden_common::Error;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Handler error: status plus JSON body
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map an engine error to its HTTP response. Server errors are logged and
/// reported without internals.
pub fn api_error(err: Error) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = if status.is_server_error() {
        error!("Request failed: {}", err);
        "Internal server error".to_string()
    } else {
        err.to_string()
    };

    (
        status,
        Json(ErrorResponse {
            error: err.code().to_string(),
            message,
        }),
    )
}

/// Error response with an explicit status and code
pub fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}
