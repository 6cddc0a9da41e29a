//! Sending account handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use mailwarden_core::campaign::AccountHealth;
use std::sync::Arc;
use uuid::Uuid;

use super::{api_error, ApiError};
use crate::auth::{AppState, AuthContext};

/// Reputation, warm-up and quota status
///
/// GET /api/v1/accounts/:account_id/health
pub async fn account_health(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<AccountHealth>, ApiError> {
    let health = state
        .orchestrator
        .account_health(auth.owner_id, account_id)
        .await
        .map_err(api_error)?;

    Ok(Json(health))
}
