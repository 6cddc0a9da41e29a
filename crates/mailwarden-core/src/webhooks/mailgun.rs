//! Mailgun webhooks

use super::{str_field, unix_timestamp, BounceType, NormalizedEvent, NormalizedEventType};
use serde_json::Value;

pub(super) fn parse(body: &Value) -> Vec<NormalizedEvent> {
    // Signed webhooks nest the event under "event-data"
    let event = body.get("event-data").unwrap_or(body);
    if !event.is_object() {
        return Vec::new();
    }

    let normalized = match str_field(event, "event") {
        Some("failed") => {
            let bounce = match str_field(event, "severity") {
                Some("permanent") => BounceType::Hard,
                _ => BounceType::Soft,
            };
            NormalizedEvent::new(str_field(event, "recipient"), NormalizedEventType::Bounce, event)
                .map(|e| e.bounce(bounce))
        }
        Some("complained") => {
            NormalizedEvent::new(str_field(event, "recipient"), NormalizedEventType::Complaint, event)
        }
        Some("delivered") => {
            NormalizedEvent::new(str_field(event, "recipient"), NormalizedEventType::Delivered, event)
        }
        _ => None,
    };

    let message_id = event
        .get("message")
        .and_then(|m| m.get("headers"))
        .and_then(|h| str_field(h, "message-id"));

    normalized
        .map(|e| {
            e.message_id(message_id)
                .timestamp(unix_timestamp(event.get("timestamp")))
        })
        .into_iter()
        .collect()
}
