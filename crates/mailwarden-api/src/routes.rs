//! API routes

use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{auth_middleware, AppState};
use crate::handlers::{
    accounts, campaigns, health, metrics, spam, tracking, unsubscribe, webhooks,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.api.cors_origins.clone();
    let state = Arc::new(state);

    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .with_state(state.clone());

    // Public endpoints hit by providers and recipients
    let public_routes = Router::new()
        .route("/metrics", get(metrics::metrics))
        .route(
            "/webhooks",
            post(webhooks::receive_webhook).get(webhooks::probe_webhook),
        )
        .route(
            "/unsubscribe",
            get(unsubscribe::unsubscribe).post(unsubscribe::unsubscribe),
        )
        .route("/t/open/:send_id", get(tracking::track_open))
        .route("/t/click/:send_id", get(tracking::track_click))
        .with_state(state.clone());

    // Campaign routes
    let campaign_routes = Router::new()
        .route("/action", post(campaigns::campaign_action))
        .route("/:campaign_id", get(campaigns::get_campaign))
        .route("/:campaign_id/ab-winner", post(campaigns::recompute_ab_winner));

    // API v1 routes with authentication
    let api_v1 = Router::new()
        .nest("/campaigns", campaign_routes)
        .route("/spam-check", post(spam::spam_check))
        .route("/accounts/:account_id/health", get(accounts::account_health))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .merge(public_routes)
        .layer(cors_layer(&cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_headers(Any)
        .allow_methods(Any)
}
