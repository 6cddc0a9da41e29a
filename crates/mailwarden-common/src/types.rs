//! Common types for MailWarden

use uuid::Uuid;

/// Unique identifier for the tenant that owns accounts, lists and campaigns
pub type OwnerId = Uuid;

/// Unique identifier for sending accounts
pub type AccountId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for contact lists
pub type ListId = Uuid;

/// Unique identifier for contacts
pub type ContactId = Uuid;

/// Unique identifier for individual sends
pub type SendId = Uuid;

/// Unique identifier for audit events
pub type EventId = Uuid;

/// Canonical email lookup key: trimmed and lowercased
pub fn normalize_email(s: &str) -> String {
    s.trim().to_lowercase()
}
