//! Generic JSON webhook for providers without a dedicated parser
//!
//! Accepts an object or an array of objects shaped like
//! `{"email": "...", "event": "bounce", "bounceType": "soft", "messageId": "..."}`.

use super::{rfc3339_timestamp, str_field, unix_timestamp, BounceType, NormalizedEvent, NormalizedEventType};
use serde_json::Value;

pub(super) fn parse(body: &Value) -> Vec<NormalizedEvent> {
    match body {
        Value::Array(events) => events.iter().filter_map(parse_event).collect(),
        Value::Object(_) => parse_event(body).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn parse_event(event: &Value) -> Option<NormalizedEvent> {
    let kind = str_field(event, "event")
        .or_else(|| str_field(event, "type"))
        .or_else(|| str_field(event, "eventType"))?
        .to_ascii_lowercase();

    let explicit_bounce = str_field(event, "bounceType")
        .or_else(|| str_field(event, "bounce_type"))
        .map(str::to_ascii_lowercase);

    let (event_type, bounce_type) = if kind.contains("hard_bounce") {
        (NormalizedEventType::Bounce, Some(BounceType::Hard))
    } else if kind.contains("soft_bounce") {
        (NormalizedEventType::Bounce, Some(BounceType::Soft))
    } else if kind.contains("bounce") {
        let bounce = match explicit_bounce.as_deref() {
            Some("soft") | Some("transient") | Some("temporary") => BounceType::Soft,
            _ => BounceType::Hard,
        };
        (NormalizedEventType::Bounce, Some(bounce))
    } else if kind.contains("complaint") || kind.contains("spam") {
        (NormalizedEventType::Complaint, None)
    } else if kind.contains("deliver") {
        (NormalizedEventType::Delivered, None)
    } else {
        return None;
    };

    let email = str_field(event, "email").or_else(|| str_field(event, "recipient"));
    let message_id = str_field(event, "messageId").or_else(|| str_field(event, "message_id"));
    let timestamp = unix_timestamp(event.get("timestamp"))
        .or_else(|| rfc3339_timestamp(str_field(event, "timestamp")));

    let normalized = NormalizedEvent::new(email, event_type, event)?
        .message_id(message_id)
        .timestamp(timestamp);

    Some(match bounce_type {
        Some(bounce) => normalized.bounce(bounce),
        None => normalized,
    })
}

#[cfg(test)]
mod tests {
    use crate::webhooks::{BounceType, NormalizedEventType, Provider, WebhookParser};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_array() {
        let body = r#"[
            {"email": "A@example.com", "event": "hard_bounce", "messageId": "<m-1@example.com>"},
            {"recipient": "b@example.com", "type": "soft_bounce"},
            {"email": "c@example.com", "eventType": "bounce"},
            {"email": "d@example.com", "event": "bounce", "bounceType": "soft"},
            {"email": "e@example.com", "event": "spamreport"},
            {"email": "f@example.com", "event": "complaint"},
            {"email": "g@example.com", "event": "delivered", "message_id": "m-2", "timestamp": "2024-03-01T10:00:00Z"},
            {"email": "h@example.com", "event": "opened"},
            {"event": "bounce"}
        ]"#;

        let events = Provider::Generic.parse(body);
        let summary: Vec<_> = events
            .iter()
            .map(|e| (e.email.as_str(), e.event_type, e.bounce_type))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("a@example.com", NormalizedEventType::Bounce, Some(BounceType::Hard)),
                ("b@example.com", NormalizedEventType::Bounce, Some(BounceType::Soft)),
                ("c@example.com", NormalizedEventType::Bounce, Some(BounceType::Hard)),
                ("d@example.com", NormalizedEventType::Bounce, Some(BounceType::Soft)),
                ("e@example.com", NormalizedEventType::Complaint, None),
                ("f@example.com", NormalizedEventType::Complaint, None),
                ("g@example.com", NormalizedEventType::Delivered, None),
            ]
        );
        assert_eq!(events[0].message_id.as_deref(), Some("<m-1@example.com>"));
        assert_eq!(events[6].message_id.as_deref(), Some("m-2"));
        assert!(events[6].timestamp.is_some());
    }

    #[test]
    fn test_parse_single_object() {
        let events = Provider::Generic.parse(r#"{"email": "x@example.com", "event": "complaint"}"#);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, NormalizedEventType::Complaint);
    }
}
