//! Campaign handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use mailwarden_core::campaign::{AbTestResult, CampaignDetail};
use mailwarden_storage::CampaignStatus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::{api_error, ApiError};
use crate::auth::{AppState, AuthContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignAction {
    Send,
    Cancel,
}

/// Request body for a campaign action
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignActionRequest {
    pub campaign_id: Uuid,
    pub action: CampaignAction,
}

/// Campaign action response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignActionResponse {
    pub campaign_id: Uuid,
    pub status: CampaignStatus,
    /// Contacts in the send batch; absent for cancellations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipients: Option<usize>,
}

/// Send or cancel a campaign
///
/// POST /api/v1/campaigns/action
///
/// A send applies every gate before answering; the send loop then runs in
/// the background and the response is 202.
pub async fn campaign_action(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CampaignActionRequest>,
) -> Result<(StatusCode, Json<CampaignActionResponse>), ApiError> {
    match req.action {
        CampaignAction::Send => {
            let prepared = state
                .orchestrator
                .prepare(auth.owner_id, req.campaign_id)
                .await
                .map_err(api_error)?;
            let recipients = prepared.recipients();

            let orchestrator = state.orchestrator.clone();
            tokio::spawn(async move {
                let campaign_id = prepared.campaign_id();
                if let Err(e) = orchestrator.execute(prepared).await {
                    error!(campaign_id = %campaign_id, "Campaign send failed: {}", e);
                }
            });

            info!(
                campaign_id = %req.campaign_id,
                owner_id = %auth.owner_id,
                recipients,
                "Campaign send started"
            );

            Ok((
                StatusCode::ACCEPTED,
                Json(CampaignActionResponse {
                    campaign_id: req.campaign_id,
                    status: CampaignStatus::Sending,
                    recipients: Some(recipients),
                }),
            ))
        }
        CampaignAction::Cancel => {
            let status = state
                .orchestrator
                .cancel(auth.owner_id, req.campaign_id)
                .await
                .map_err(api_error)?;

            info!(campaign_id = %req.campaign_id, status = %status, "Campaign cancel requested");

            Ok((
                StatusCode::OK,
                Json(CampaignActionResponse {
                    campaign_id: req.campaign_id,
                    status,
                    recipients: None,
                }),
            ))
        }
    }
}

/// Campaign with per-variant engagement
///
/// GET /api/v1/campaigns/:campaign_id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignDetail>, ApiError> {
    let detail = state
        .orchestrator
        .campaign_detail(auth.owner_id, campaign_id)
        .await
        .map_err(api_error)?;

    Ok(Json(detail))
}

/// Recompute the A/B winner from open rates
///
/// POST /api/v1/campaigns/:campaign_id/ab-winner
pub async fn recompute_ab_winner(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<AbTestResult>, ApiError> {
    let result = state
        .orchestrator
        .recompute_ab_winner(auth.owner_id, campaign_id)
        .await
        .map_err(api_error)?;

    Ok(Json(result))
}
