//! Postmark bounce, spam-complaint and delivery webhooks

use super::{rfc3339_timestamp, str_field, BounceType, NormalizedEvent, NormalizedEventType};
use serde_json::Value;

/// `HardBounce` and `BadEmailAddress`
const HARD_BOUNCE_CODES: [i64; 2] = [1, 100_000];

pub(super) fn parse(body: &Value) -> Vec<NormalizedEvent> {
    if !body.is_object() {
        return Vec::new();
    }

    let record_type = str_field(body, "RecordType").unwrap_or_default();
    let email = str_field(body, "Email").or_else(|| str_field(body, "Recipient"));

    let event = match record_type {
        "Bounce" => NormalizedEvent::new(email, NormalizedEventType::Bounce, body)
            .map(|e| e.bounce(bounce_type(body))),
        "SpamComplaint" => NormalizedEvent::new(email, NormalizedEventType::Complaint, body),
        "Delivery" => NormalizedEvent::new(email, NormalizedEventType::Delivered, body),
        _ => None,
    };

    let timestamp = rfc3339_timestamp(
        str_field(body, "BouncedAt")
            .or_else(|| str_field(body, "DeliveredAt"))
            .or_else(|| str_field(body, "ReceivedAt")),
    );

    event
        .map(|e| {
            e.message_id(str_field(body, "MessageID"))
                .timestamp(timestamp)
        })
        .into_iter()
        .collect()
}

fn bounce_type(body: &Value) -> BounceType {
    match body.get("TypeCode").and_then(|c| c.as_i64()) {
        Some(code) if HARD_BOUNCE_CODES.contains(&code) => BounceType::Hard,
        Some(_) => BounceType::Soft,
        None if str_field(body, "Type") == Some("HardBounce") => BounceType::Hard,
        None => BounceType::Soft,
    }
}
