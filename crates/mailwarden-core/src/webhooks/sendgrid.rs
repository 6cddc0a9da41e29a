//! SendGrid Event Webhook

use super::{str_field, unix_timestamp, BounceType, NormalizedEvent, NormalizedEventType};
use serde_json::Value;

pub(super) fn parse(body: &Value) -> Vec<NormalizedEvent> {
    let Some(events) = body.as_array() else {
        return Vec::new();
    };

    events.iter().filter_map(parse_event).collect()
}

fn parse_event(event: &Value) -> Option<NormalizedEvent> {
    let (event_type, bounce_type) = match str_field(event, "event")? {
        "bounce" => {
            let bounce = if str_field(event, "type") == Some("blocked") {
                BounceType::Soft
            } else {
                BounceType::Hard
            };
            (NormalizedEventType::Bounce, Some(bounce))
        }
        "spamreport" => (NormalizedEventType::Complaint, None),
        "delivered" => (NormalizedEventType::Delivered, None),
        // dropped, deferred, processed, open, click, unsubscribe...
        _ => return None,
    };

    // "14c5d75ce93.dfd.64b469.filter0001.16648.5515E0B88.0" -> "14c5d75ce93"
    let message_id = str_field(event, "sg_message_id").and_then(|id| id.split('.').next());

    let mut normalized = NormalizedEvent::new(str_field(event, "email"), event_type, event)?
        .message_id(message_id)
        .timestamp(unix_timestamp(event.get("timestamp")));
    if let Some(bounce) = bounce_type {
        normalized = normalized.bounce(bounce);
    }
    Some(normalized)
}
