//! Delivery-provider webhook normalization
//!
//! Each provider posts bounces, complaints and deliveries in its own shape.
//! Parsers turn a raw body into [`NormalizedEvent`]s and never fail: a body
//! they cannot read yields no events.

mod generic;
mod mailgun;
mod postmark;
mod sendgrid;
mod ses;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Normalized event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizedEventType {
    Bounce,
    Complaint,
    Delivered,
}

impl std::fmt::Display for NormalizedEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizedEventType::Bounce => write!(f, "bounce"),
            NormalizedEventType::Complaint => write!(f, "complaint"),
            NormalizedEventType::Delivered => write!(f, "delivered"),
        }
    }
}

/// Bounce severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BounceType {
    Hard,
    Soft,
}

impl std::fmt::Display for BounceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BounceType::Hard => write!(f, "hard"),
            BounceType::Soft => write!(f, "soft"),
        }
    }
}

/// Provider-independent delivery event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Recipient, trimmed and lowercased
    pub email: String,
    pub event_type: NormalizedEventType,
    pub message_id: Option<String>,
    /// Set only for bounces
    pub bounce_type: Option<BounceType>,
    pub timestamp: Option<DateTime<Utc>>,
    /// The provider's original event
    pub raw: serde_json::Value,
}

impl NormalizedEvent {
    /// Build an event, dropping it when the recipient is blank
    pub(crate) fn new(
        email: Option<&str>,
        event_type: NormalizedEventType,
        raw: &serde_json::Value,
    ) -> Option<Self> {
        let email = email.map(|e| e.trim().to_lowercase())?;
        if email.is_empty() {
            return None;
        }

        Some(Self {
            email,
            event_type,
            message_id: None,
            bounce_type: None,
            timestamp: None,
            raw: raw.clone(),
        })
    }

    pub(crate) fn bounce(mut self, bounce_type: BounceType) -> Self {
        self.bounce_type = Some(bounce_type);
        self
    }

    pub(crate) fn message_id(mut self, message_id: Option<&str>) -> Self {
        self.message_id = message_id
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(String::from);
        self
    }

    pub(crate) fn timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }

}

/// Turns a provider payload into normalized events
pub trait WebhookParser: Send + Sync {
    fn parse(&self, body: &str) -> Vec<NormalizedEvent>;

    /// Raw request body; bytes that are not UTF-8 yield no events
    fn parse_bytes(&self, body: &[u8]) -> Vec<NormalizedEvent> {
        match std::str::from_utf8(body) {
            Ok(text) => self.parse(text),
            Err(e) => {
                tracing::warn!("Webhook body is not UTF-8: {}", e);
                Vec::new()
            }
        }
    }
}

/// Supported webhook sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    SendGrid,
    Postmark,
    Ses,
    Mailgun,
    Generic,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::SendGrid,
        Provider::Postmark,
        Provider::Ses,
        Provider::Mailgun,
        Provider::Generic,
    ];

    /// Resolve the `provider` query parameter; unknown or missing is generic
    pub fn from_query(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("sendgrid") => Provider::SendGrid,
            Some("postmark") => Provider::Postmark,
            Some("ses") | Some("sns") | Some("amazon-ses") => Provider::Ses,
            Some("mailgun") => Provider::Mailgun,
            _ => Provider::Generic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::SendGrid => "sendgrid",
            Provider::Postmark => "postmark",
            Provider::Ses => "ses",
            Provider::Mailgun => "mailgun",
            Provider::Generic => "generic",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WebhookParser for Provider {
    fn parse(&self, body: &str) -> Vec<NormalizedEvent> {
        let value: serde_json::Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(provider = %self, "Unreadable webhook body: {}", e);
                return Vec::new();
            }
        };

        let events = match self {
            Provider::SendGrid => sendgrid::parse(&value),
            Provider::Postmark => postmark::parse(&value),
            Provider::Ses => ses::parse(&value),
            Provider::Mailgun => mailgun::parse(&value),
            Provider::Generic => generic::parse(&value),
        };

        tracing::debug!(provider = %self, count = events.len(), "Webhook parsed");
        events
    }
}

/// String field, if present
pub(crate) fn str_field<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str())
}

/// Unix seconds (integer or float) to a timestamp
pub(crate) fn unix_timestamp(value: Option<&serde_json::Value>) -> Option<DateTime<Utc>> {
    let seconds = value?.as_f64()?;
    let whole = seconds.trunc() as i64;
    let nanos = ((seconds - seconds.trunc()) * 1e9).round() as u32;
    Utc.timestamp_opt(whole, nanos.min(999_999_999)).single()
}

/// RFC 3339 string to a timestamp
pub(crate) fn rfc3339_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
