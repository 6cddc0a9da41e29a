//! Authentication module

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use mailwarden_common::config::ApiKeyConfig;
use mailwarden_common::types::OwnerId;
use mailwarden_common::Config;
use mailwarden_core::{
    CampaignOrchestrator, ContactLifecycle, MailTransport, Metrics, SpamScoreAnalyzer, UsageMeter,
};
use mailwarden_storage::Repositories;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub orchestrator: Arc<CampaignOrchestrator>,
    pub lifecycle: Arc<ContactLifecycle>,
    pub analyzer: Arc<SpamScoreAnalyzer>,
    pub metrics: Metrics,
    pub config: Arc<Config>,
    pub api_keys: ApiKeyTable,
}

impl AppState {
    /// Wire the engine components for one storage backend and transport
    pub fn new(
        repos: Repositories,
        config: Config,
        transport: Arc<dyn MailTransport>,
        usage: Arc<dyn UsageMeter>,
    ) -> mailwarden_common::Result<Self> {
        let metrics = Metrics::new()?;
        let orchestrator =
            CampaignOrchestrator::new(repos.clone(), transport, usage, &config, metrics.clone())?;
        let lifecycle = ContactLifecycle::new(repos.clone(), &config, metrics.clone())?;
        let api_keys = ApiKeyTable::new(&config.api.keys);
        if api_keys.is_empty() {
            warn!("No API keys configured; authenticated endpoints will reject every request");
        }

        Ok(Self {
            repos,
            orchestrator: Arc::new(orchestrator),
            lifecycle: Arc::new(lifecycle),
            analyzer: Arc::new(SpamScoreAnalyzer::new()),
            metrics,
            config: Arc::new(config),
            api_keys,
        })
    }
}

/// Authenticated context extracted from API key
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Owner every resource access is scoped to
    pub owner_id: OwnerId,
}

/// Static API keys, stored by SHA-256 digest
#[derive(Debug, Clone, Default)]
pub struct ApiKeyTable {
    owners: HashMap<String, OwnerId>,
}

impl ApiKeyTable {
    pub fn new(keys: &[ApiKeyConfig]) -> Self {
        Self {
            owners: keys
                .iter()
                .map(|k| (hash_api_key(&k.key), k.owner_id))
                .collect(),
        }
    }

    pub fn owner_for(&self, api_key: &str) -> Option<OwnerId> {
        self.owners.get(&hash_api_key(api_key)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// Extract API key from request headers
pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    // Check Authorization header
    if let Some(auth) = headers.get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(key) = auth_str.strip_prefix("Bearer ") {
                return Some(key.trim());
            }
        }
    }

    // Check X-API-Key header
    if let Some(key) = headers.get("x-api-key") {
        if let Ok(key_str) = key.to_str() {
            return Some(key_str.trim());
        }
    }

    None
}

/// Hash an API key for comparison
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check the shared webhook secret, sent as `Authorization: Bearer` or
/// `X-Webhook-Secret`. Without a configured secret every request passes.
pub fn verify_webhook_secret(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected.filter(|s| !s.is_empty()) else {
        return true;
    };

    let provided = headers
        .get("x-webhook-secret")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        });

    match provided {
        Some(provided) => hash_api_key(provided.trim()) == hash_api_key(expected),
        None => false,
    }
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let api_key = extract_api_key(request.headers()).ok_or_else(|| {
        warn!("Missing API key in request to {}", request.uri().path());
        StatusCode::UNAUTHORIZED
    })?;

    let owner_id = state.api_keys.owner_for(api_key).ok_or_else(|| {
        warn!("Unknown API key in request to {}", request.uri().path());
        StatusCode::UNAUTHORIZED
    })?;

    debug!(owner_id = %owner_id, "API key authenticated");
    request.extensions_mut().insert(AuthContext { owner_id });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use uuid::Uuid;

    #[test]
    fn test_key_table_matches_by_digest() {
        let owner_id = Uuid::new_v4();
        let table = ApiKeyTable::new(&[ApiKeyConfig {
            key: "mw_live_key".to_string(),
            owner_id,
        }]);

        assert_eq!(table.owner_for("mw_live_key"), Some(owner_id));
        assert_eq!(table.owner_for("mw_other_key"), None);
        assert!(!table.owners.contains_key("mw_live_key"));
    }

    #[test]
    fn test_extract_api_key_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_api_key(&headers), None);

        headers.insert("x-api-key", HeaderValue::from_static("from-header"));
        assert_eq!(extract_api_key(&headers), Some("from-header"));

        headers.insert("authorization", HeaderValue::from_static("Bearer from-bearer"));
        assert_eq!(extract_api_key(&headers), Some("from-bearer"));
    }

    #[test]
    fn test_webhook_secret() {
        let mut headers = HeaderMap::new();
        assert!(verify_webhook_secret(&headers, None));
        assert!(!verify_webhook_secret(&headers, Some("s3cret")));

        headers.insert("x-webhook-secret", HeaderValue::from_static("wrong"));
        assert!(!verify_webhook_secret(&headers, Some("s3cret")));

        headers.insert("x-webhook-secret", HeaderValue::from_static("s3cret"));
        assert!(verify_webhook_secret(&headers, Some("s3cret")));

        let mut bearer = HeaderMap::new();
        bearer.insert("authorization", HeaderValue::from_static("Bearer s3cret"));
        assert!(verify_webhook_secret(&bearer, Some("s3cret")));
    }
}
