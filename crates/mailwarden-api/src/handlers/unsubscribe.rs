//! Recipient unsubscribe handler

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use mailwarden_common::Error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{api_error, error_response, ApiError};
use crate::auth::AppState;

/// `cid`, `lid` and `sig` as they appear in the signed link
#[derive(Debug, Deserialize)]
pub struct UnsubscribeQuery {
    pub cid: Option<String>,
    pub lid: Option<String>,
    pub sig: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnsubscribeResponse {
    pub ok: bool,
    pub message: String,
}

/// GET|POST /unsubscribe?cid=&lid=&sig=
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UnsubscribeQuery>,
) -> Result<Json<UnsubscribeResponse>, ApiError> {
    let contact_id = parse_id(query.cid.as_deref(), "cid")?;
    let list_id = parse_id(query.lid.as_deref(), "lid")?;

    let outcome = state
        .lifecycle
        .unsubscribe(contact_id, list_id, query.sig.as_deref())
        .await
        .map_err(|e| match e {
            // Bad links are the caller's problem, not an unprocessable entity
            Error::Validation(message) => {
                error_response(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
            }
            other => api_error(other),
        })?;

    Ok(Json(UnsubscribeResponse {
        ok: true,
        message: outcome.message().to_string(),
    }))
}

fn parse_id(value: Option<&str>, name: &str) -> Result<Uuid, ApiError> {
    let value = value.map(str::trim).filter(|v| !v.is_empty()).ok_or_else(|| {
        error_response(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            format!("Missing {} parameter", name),
        )
    })?;

    Uuid::parse_str(value).map_err(|_| {
        error_response(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            format!("Invalid {} parameter", name),
        )
    })
}
