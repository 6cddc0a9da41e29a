//! Campaign sending: gating, personalization, A/B testing and delivery

mod orchestrator;
mod personalize;
mod scheduler;
mod transport;
mod usage;

pub use orchestrator::{
    AbTestResult, AccountHealth, CampaignDetail, CampaignOrchestrator, PreparedSend, SendReport,
};
pub use personalize::{PersonalizedContent, Personalizer};
pub use scheduler::CampaignScheduler;
pub use transport::{
    generate_message_id, DryRunTransport, MailTransport, OutboundMessage, SmtpEndpoint,
    SmtpTransport, TransportResult,
};
pub use usage::{LoggingUsageMeter, UsageMeter};
