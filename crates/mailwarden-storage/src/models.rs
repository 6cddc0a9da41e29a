//! Database models

use chrono::{DateTime, Utc};
use mailwarden_common::types::{
    AccountId, CampaignId, ContactId, EventId, ListId, OwnerId, SendId,
};
use mailwarden_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Generates `as_str` and Display for a text-backed enum
macro_rules! text_enum {
    ($ty:ident, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

fn invalid_transition(kind: &str, from: impl std::fmt::Display, to: impl std::fmt::Display) -> Error {
    Error::InvalidTransition(format!("{} cannot move from {} to {}", kind, from, to))
}

// ============================================================================
// Accounts
// ============================================================================

/// SMTP connection security
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum SmtpSecurity {
    Tls,
    StartTls,
    None,
}

text_enum!(SmtpSecurity, {
    Tls => "tls",
    StartTls => "starttls",
    None => "none",
});

/// Sending account
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailAccount {
    pub id: AccountId,
    pub owner_id: OwnerId,
    pub email: String,
    pub from_name: Option<String>,
    pub smtp_host: String,
    pub smtp_port: i32,
    pub smtp_username: Option<String>,
    #[serde(skip_serializing)]
    pub smtp_password: Option<String>,
    pub smtp_security: SmtpSecurity,
    pub daily_limit: i32,
    pub sent_today: i32,
    pub last_reset_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Create account input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub owner_id: OwnerId,
    pub email: String,
    pub from_name: Option<String>,
    pub smtp_host: String,
    pub smtp_port: i32,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_security: SmtpSecurity,
    pub daily_limit: i32,
    /// Backdated creation time, used to seed warm-up age
    pub created_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Campaigns
// ============================================================================

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Sent,
    Failed,
    Cancelled,
}

text_enum!(CampaignStatus, {
    Draft => "draft",
    Scheduled => "scheduled",
    Sending => "sending",
    Sent => "sent",
    Failed => "failed",
    Cancelled => "cancelled",
});

impl CampaignStatus {
    pub fn can_transition_to(&self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, next),
            (Draft, Scheduled)
                | (Draft, Sending)
                | (Draft, Cancelled)
                | (Scheduled, Sending)
                | (Scheduled, Cancelled)
                | (Sending, Sent)
                | (Sending, Failed)
        )
    }

    pub fn transition(&self, next: CampaignStatus) -> Result<CampaignStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(invalid_transition("Campaign", self, next))
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CampaignStatus::Sent | CampaignStatus::Failed | CampaignStatus::Cancelled
        )
    }
}

/// A/B test variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum Variant {
    A,
    B,
}

text_enum!(Variant, {
    A => "A",
    B => "B",
});

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailCampaign {
    pub id: CampaignId,
    pub owner_id: OwnerId,
    pub account_id: AccountId,
    pub list_id: ListId,
    pub name: String,
    pub subject: String,
    pub subject_b: Option<String>,
    pub ab_split_percent: Option<i32>,
    pub html_content: String,
    pub text_content: Option<String>,
    pub status: CampaignStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub ab_winner: Option<Variant>,
    pub total_sent: i32,
    pub total_bounced: i32,
    pub total_complaints: i32,
    pub total_opened: i32,
    pub total_clicked: i32,
    pub total_unsubscribed: i32,
    pub created_at: DateTime<Utc>,
}

impl EmailCampaign {
    /// Whether the campaign carries an A/B subject test
    pub fn is_ab_test(&self) -> bool {
        self.subject_b.is_some() && self.ab_split_percent.is_some()
    }

    /// Subject line for a variant
    pub fn subject_for(&self, variant: Option<Variant>) -> &str {
        match (variant, &self.subject_b) {
            (Some(Variant::B), Some(subject_b)) => subject_b,
            _ => &self.subject,
        }
    }
}

/// Create campaign input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCampaign {
    pub owner_id: OwnerId,
    pub account_id: AccountId,
    pub list_id: ListId,
    pub name: String,
    pub subject: String,
    pub subject_b: Option<String>,
    pub ab_split_percent: Option<i32>,
    pub html_content: String,
    pub text_content: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Monotonic campaign counters touched by feedback events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignCounter {
    Bounced,
    Complaints,
    Opened,
    Clicked,
    Unsubscribed,
}

impl CampaignCounter {
    pub fn column(&self) -> &'static str {
        match self {
            CampaignCounter::Bounced => "total_bounced",
            CampaignCounter::Complaints => "total_complaints",
            CampaignCounter::Opened => "total_opened",
            CampaignCounter::Clicked => "total_clicked",
            CampaignCounter::Unsubscribed => "total_unsubscribed",
        }
    }
}

/// Delivery totals of one completed campaign, input to the reputation gate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CampaignDeliveryStats {
    pub total_sent: i32,
    pub total_bounced: i32,
    pub total_complaints: i32,
}

/// Per-variant engagement of an A/B campaign
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct VariantStats {
    pub variant: Variant,
    pub sent: i64,
    pub opened: i64,
    pub clicked: i64,
}

impl VariantStats {
    pub fn open_rate(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.opened as f64 / self.sent as f64
        }
    }
}

// ============================================================================
// Lists and contacts
// ============================================================================

/// Contact list
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailList {
    pub id: ListId,
    pub owner_id: OwnerId,
    pub name: String,
    pub contact_count: i32,
    pub active_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Create list input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewList {
    pub owner_id: OwnerId,
    pub name: String,
}

/// Contact status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum ContactStatus {
    Active,
    Unsubscribed,
    Bounced,
    Complained,
}

text_enum!(ContactStatus, {
    Active => "active",
    Unsubscribed => "unsubscribed",
    Bounced => "bounced",
    Complained => "complained",
});

impl ContactStatus {
    /// Suppression is one-way: only ACTIVE contacts ever change status.
    pub fn can_transition_to(&self, next: ContactStatus) -> bool {
        *self == ContactStatus::Active && next != ContactStatus::Active
    }

    pub fn transition(&self, next: ContactStatus) -> Result<ContactStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(invalid_transition("Contact", self, next))
        }
    }
}

/// Contact model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailContact {
    pub id: ContactId,
    pub list_id: ListId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub attributes: serde_json::Value,
    pub status: ContactStatus,
    pub soft_bounce_count: i32,
    pub open_count: i32,
    pub click_count: i32,
    pub last_open_at: Option<DateTime<Utc>>,
    pub last_click_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl EmailContact {
    /// "First Last", falling back to whichever part exists
    pub fn full_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => None,
        }
    }
}

/// Create contact input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContact {
    pub list_id: ListId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub attributes: Option<serde_json::Value>,
}

// ============================================================================
// Sends and events
// ============================================================================

/// Per-recipient send status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum SendStatus {
    Queued,
    Sent,
    Failed,
    Delivered,
    Bounced,
    Complained,
    Opened,
    Clicked,
}

text_enum!(SendStatus, {
    Queued => "queued",
    Sent => "sent",
    Failed => "failed",
    Delivered => "delivered",
    Bounced => "bounced",
    Complained => "complained",
    Opened => "opened",
    Clicked => "clicked",
});

impl SendStatus {
    pub fn can_transition_to(&self, next: SendStatus) -> bool {
        use SendStatus::*;
        match self {
            Queued => matches!(next, Sent | Failed),
            Sent => matches!(next, Delivered | Bounced | Complained | Opened | Clicked),
            Delivered => matches!(next, Opened | Clicked | Bounced | Complained),
            Opened => matches!(next, Clicked | Complained),
            Clicked => matches!(next, Complained),
            Failed | Bounced | Complained => false,
        }
    }

    pub fn transition(&self, next: SendStatus) -> Result<SendStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(invalid_transition("Send", self, next))
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SendStatus::Failed | SendStatus::Bounced | SendStatus::Complained)
    }

    /// Whether the message left the building
    pub fn was_sent(&self) -> bool {
        !matches!(self, SendStatus::Queued | SendStatus::Failed)
    }
}

/// One delivery attempt to one contact
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailSend {
    pub id: SendId,
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub variant: Option<Variant>,
    pub message_id: Option<String>,
    pub status: SendStatus,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub bounced_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Canonical form of a Message-ID: no surrounding whitespace or angle brackets
pub fn normalize_message_id(raw: &str) -> String {
    raw.trim().trim_start_matches('<').trim_end_matches('>').to_string()
}

/// Audit event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum EventType {
    Sent,
    Delivered,
    Bounced,
    Complained,
    Opened,
    Clicked,
    Unsubscribed,
}

text_enum!(EventType, {
    Sent => "sent",
    Delivered => "delivered",
    Bounced => "bounced",
    Complained => "complained",
    Opened => "opened",
    Clicked => "clicked",
    Unsubscribed => "unsubscribed",
});

/// Append-only audit record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailEvent {
    pub id: EventId,
    pub send_id: SendId,
    pub event_type: EventType,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Create event input
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub send_id: SendId,
    pub event_type: EventType,
    pub metadata: serde_json::Value,
}

impl NewEvent {
    pub fn new(send_id: SendId, event_type: EventType) -> Self {
        Self {
            send_id,
            event_type,
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
