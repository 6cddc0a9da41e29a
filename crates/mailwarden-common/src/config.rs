//! Configuration for MailWarden

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Open/click tracking and link signing
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Inbound provider webhooks
    #[serde(default)]
    pub webhooks: WebhookConfig,

    /// Unsubscribe endpoint
    #[serde(default)]
    pub unsubscribe: UnsubscribeConfig,

    /// Warm-up pacing
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Sender reputation gate
    #[serde(default)]
    pub health: HealthConfig,

    /// Content scoring
    #[serde(default)]
    pub spam: SpamConfig,

    /// Contact lifecycle policy
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// A/B testing
    #[serde(default)]
    pub ab_test: AbTestConfig,

    /// Scheduled campaign worker
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Outbound SMTP defaults
    #[serde(default)]
    pub smtp: SmtpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
            tracking: TrackingConfig::default(),
            webhooks: WebhookConfig::default(),
            unsubscribe: UnsubscribeConfig::default(),
            pacing: PacingConfig::default(),
            health: HealthConfig::default(),
            spam: SpamConfig::default(),
            lifecycle: LifecycleConfig::default(),
            ab_test: AbTestConfig::default(),
            scheduler: SchedulerConfig::default(),
            smtp: SmtpConfig::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname used in generated Message-IDs
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            bind_address: default_bind_address(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend: "postgres" or "memory"
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL (for postgres)
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_db_backend(),
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_db_backend() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// API keys and the owner each one acts for
    #[serde(default)]
    pub keys: Vec<ApiKeyConfig>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            cors_origins: Vec::new(),
            keys: Vec::new(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

/// A static API key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub key: String,
    pub owner_id: Uuid,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Public base URL that tracking and unsubscribe links point at
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Secret for HMAC-signed unsubscribe links
    #[serde(default = "default_signing_secret")]
    pub signing_secret: String,

    /// Inject the open-tracking pixel
    #[serde(default = "default_true")]
    pub track_opens: bool,

    /// Rewrite links through the click tracker
    #[serde(default = "default_true")]
    pub track_clicks: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            public_url: default_public_url(),
            signing_secret: default_signing_secret(),
            track_opens: true,
            track_clicks: true,
        }
    }
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

/// Placeholder secret shipped in the defaults; unsubscribe signatures made
/// with it can be forged by anyone
pub const DEFAULT_SIGNING_SECRET: &str = "change-me";

impl TrackingConfig {
    /// Whether the signing secret was left at (or blanked to) the placeholder
    pub fn uses_default_secret(&self) -> bool {
        let secret = self.signing_secret.trim();
        secret.is_empty() || secret == DEFAULT_SIGNING_SECRET
    }
}

fn default_signing_secret() -> String {
    DEFAULT_SIGNING_SECRET.to_string()
}

fn default_true() -> bool {
    true
}

/// Webhook ingestion configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret, accepted as a bearer token or `X-Webhook-Secret`
    pub secret: Option<String>,
}

/// Unsubscribe configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnsubscribeConfig {
    /// Reject unsubscribe requests that carry no signature
    #[serde(default)]
    pub require_signature: bool,
}

/// Pacing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Sleep between sends; disable only for local development
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Reputation gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Number of recent completed campaigns considered by the gate
    #[serde(default = "default_lookback_campaigns")]
    pub lookback_campaigns: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            lookback_campaigns: default_lookback_campaigns(),
        }
    }
}

fn default_lookback_campaigns() -> usize {
    10
}

/// Spam scoring configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpamConfig {
    /// Refuse to send campaigns whose content is classified BLOCKED
    #[serde(default)]
    pub block_on_send: bool,
}

/// Lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Soft bounces tolerated before a contact is suppressed
    #[serde(default = "default_soft_bounce_threshold")]
    pub soft_bounce_threshold: i32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            soft_bounce_threshold: default_soft_bounce_threshold(),
        }
    }
}

fn default_soft_bounce_threshold() -> i32 {
    3
}

/// A/B test configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTestConfig {
    /// Combined opens required before the winner is decided by open rate
    #[serde(default = "default_min_opens")]
    pub min_opens_for_winner: i64,
}

impl Default for AbTestConfig {
    fn default() -> Self {
        Self {
            min_opens_for_winner: default_min_opens(),
        }
    }
}

fn default_min_opens() -> i64 {
    5
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}

/// Outbound SMTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Per-message SMTP timeout
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,

    /// Log messages instead of delivering them
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_smtp_timeout(),
            dry_run: false,
        }
    }
}

fn default_smtp_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from the default file locations, then apply
    /// `MAILWARDEN__SECTION__KEY` environment overrides
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/mailwarden/config.toml"),
        ];

        let mut builder = ::config::Config::builder();
        for path in paths.iter().filter(|p| p.exists()) {
            tracing::info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(::config::File::from(path.as_path()));
        }

        builder
            .add_source(
                ::config::Environment::with_prefix("MAILWARDEN")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.hostname, "localhost");
        assert_eq!(config.database.backend, "postgres");
        assert_eq!(config.lifecycle.soft_bounce_threshold, 3);
        assert_eq!(config.ab_test.min_opens_for_winner, 5);
        assert_eq!(config.health.lookback_campaigns, 10);
        assert!(config.pacing.enabled);
        assert!(!config.spam.block_on_send);
        assert_eq!(config.smtp.timeout_secs, 30);
        assert!(!config.smtp.dry_run);
        assert!(config.tracking.uses_default_secret());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
hostname = "mail.example.com"

[database]
backend = "postgres"
url = "postgres://localhost/mailwarden"

[tracking]
public_url = "https://track.example.com"
signing_secret = "s3cret"

[webhooks]
secret = "hook-secret"

[[api.keys]]
key = "mw_test_key"
owner_id = "6f1c1a1e-2d6b-4c55-9a8e-0d7e1e0b9a11"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.hostname, "mail.example.com");
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/mailwarden"));
        assert_eq!(config.tracking.public_url, "https://track.example.com");
        assert_eq!(config.webhooks.secret.as_deref(), Some("hook-secret"));
        assert_eq!(config.api.keys.len(), 1);
        assert_eq!(config.api.port, 8080);
        assert!(config.tracking.track_opens);
        assert!(!config.tracking.uses_default_secret());
    }

    #[test]
    fn test_blank_signing_secret_counts_as_default() {
        let mut tracking = TrackingConfig::default();
        tracking.signing_secret = "  ".to_string();
        assert!(tracking.uses_default_secret());
    }
}
