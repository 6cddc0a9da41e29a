//! MailWarden Core - Campaign delivery and deliverability protection
//!
//! This crate holds the sending engine: the gates that decide whether a
//! campaign may start (sender reputation, warm-up quota, content spam score),
//! the paced send loop, A/B subject testing, webhook normalization and the
//! contact lifecycle driven by provider and recipient feedback.

pub mod campaign;
pub mod lifecycle;
pub mod metrics;
pub mod pacing;
pub mod reputation;
pub mod spam;
pub mod webhooks;

#[cfg(test)]
mod testing;

pub use campaign::{
    CampaignOrchestrator, CampaignScheduler, DryRunTransport, LoggingUsageMeter, MailTransport,
    SmtpTransport, UsageMeter,
};
pub use lifecycle::{ContactLifecycle, UnsubscribeOutcome};
pub use metrics::Metrics;
pub use pacing::{effective_daily_limit, sending_pace, DailyQuota, EffectiveLimit, SendingPace};
pub use reputation::{HealthAction, HealthMonitor, HealthReport};
pub use spam::{SpamLevel, SpamReport, SpamScoreAnalyzer};
pub use webhooks::{NormalizedEvent, Provider, WebhookParser};
