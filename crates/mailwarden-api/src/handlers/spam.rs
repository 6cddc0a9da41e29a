//! Content spam check handler

use axum::{extract::State, Json};
use mailwarden_core::SpamReport;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::AppState;

#[derive(Debug, Deserialize)]
pub struct SpamCheckRequest {
    pub subject: String,
    #[serde(default)]
    pub html: String,
}

/// Score a subject and HTML body
///
/// POST /api/v1/spam-check
pub async fn spam_check(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpamCheckRequest>,
) -> Json<SpamReport> {
    Json(state.analyzer.analyze(&req.subject, &req.html))
}
