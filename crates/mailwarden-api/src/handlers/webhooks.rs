//! Delivery-provider webhook handlers

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use mailwarden_core::webhooks::{Provider, WebhookParser};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::{error_response, ApiError};
use crate::auth::{verify_webhook_secret, AppState};

#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    pub provider: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub ok: bool,
    /// Events that changed a contact or send
    pub processed: usize,
    /// Events recognised in the payload
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookProbeResponse {
    pub ok: bool,
    pub providers: Vec<String>,
}

/// Receive provider feedback
///
/// POST /webhooks?provider=sendgrid|postmark|ses|mailgun|generic
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    if !verify_webhook_secret(&headers, state.config.webhooks.secret.as_deref()) {
        warn!("Webhook rejected: bad or missing secret");
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Invalid webhook secret",
        ));
    }

    let provider = Provider::from_query(query.provider.as_deref());
    let events = provider.parse_bytes(&body);
    for event in &events {
        state
            .metrics
            .webhook_events
            .with_label_values(&[provider.as_str(), &event.event_type.to_string()])
            .inc();
    }

    let processed = state.lifecycle.apply_all(&events).await;
    info!(
        provider = %provider,
        total = events.len(),
        processed,
        "Webhook handled"
    );

    Ok(Json(WebhookResponse {
        ok: true,
        processed,
        total: events.len(),
    }))
}

/// Reachability probe for provider dashboards
///
/// GET /webhooks
pub async fn probe_webhook() -> Json<WebhookProbeResponse> {
    Json(WebhookProbeResponse {
        ok: true,
        providers: Provider::ALL.iter().map(|p| p.as_str().to_string()).collect(),
    })
}
