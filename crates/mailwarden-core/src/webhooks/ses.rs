//! Amazon SES notifications delivered through SNS

use super::{rfc3339_timestamp, str_field, BounceType, NormalizedEvent, NormalizedEventType};
use serde_json::Value;
use tracing::info;

pub(super) fn parse(body: &Value) -> Vec<NormalizedEvent> {
    if str_field(body, "Type") == Some("SubscriptionConfirmation") {
        info!(
            subscribe_url = str_field(body, "SubscribeURL").unwrap_or_default(),
            "SNS subscription confirmation received; visit the URL to confirm"
        );
        return Vec::new();
    }

    // SNS wraps the SES notification as a JSON string
    let message = match body.get("Message") {
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(message) => message,
            Err(_) => return Vec::new(),
        },
        Some(message @ Value::Object(_)) => message.clone(),
        // Posted directly by an SES event destination
        None if body.get("notificationType").is_some() || body.get("eventType").is_some() => {
            body.clone()
        }
        _ => return Vec::new(),
    };

    let kind = str_field(&message, "notificationType").or_else(|| str_field(&message, "eventType"));
    let message_id = message
        .get("mail")
        .and_then(|mail| str_field(mail, "messageId"));

    let (event_type, bounce_type, section, list) = match kind {
        Some("Bounce") => {
            let bounce = match message.get("bounce").and_then(|b| str_field(b, "bounceType")) {
                Some("Permanent") => BounceType::Hard,
                _ => BounceType::Soft,
            };
            (NormalizedEventType::Bounce, Some(bounce), "bounce", "bouncedRecipients")
        }
        Some("Complaint") => (
            NormalizedEventType::Complaint,
            None,
            "complaint",
            "complainedRecipients",
        ),
        Some("Delivery") => (
            NormalizedEventType::Delivered,
            None,
            "delivery",
            "recipients",
        ),
        _ => return Vec::new(),
    };

    let section = message.get(section);
    let timestamp = rfc3339_timestamp(section.and_then(|s| str_field(s, "timestamp")));
    let recipients = section
        .and_then(|s| s.get(list))
        .and_then(|l| l.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    recipients
        .iter()
        .filter_map(|recipient| {
            // Delivery lists plain addresses, bounces and complaints list objects
            let email = match recipient {
                Value::String(s) => Some(s.as_str()),
                other => str_field(other, "emailAddress"),
            };
            let event = NormalizedEvent::new(email, event_type, &message)?
                .message_id(message_id)
                .timestamp(timestamp);
            Some(match bounce_type {
                Some(bounce) => event.bounce(bounce),
                None => event,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::webhooks::{BounceType, NormalizedEventType, Provider, WebhookParser};
    use pretty_assertions::assert_eq;

    fn sns(message: serde_json::Value) -> String {
        serde_json::json!({
            "Type": "Notification",
            "MessageId": "22b80b92-fdea-4c2c-8f9d-bdfb0c7bf324",
            "TopicArn": "arn:aws:sns:us-east-1:123456789012:ses-events",
            "Message": message.to_string(),
        })
        .to_string()
    }

    #[test]
    fn test_permanent_bounce() {
        let body = sns(serde_json::json!({
            "notificationType": "Bounce",
            "bounce": {
                "bounceType": "Permanent",
                "bounceSubType": "General",
                "bouncedRecipients": [
                    { "emailAddress": "Jane@Example.com", "status": "5.1.1" },
                    { "emailAddress": "richard@example.com" }
                ],
                "timestamp": "2016-01-27T14:59:38.237Z"
            },
            "mail": { "messageId": "00000138111222aa-33322211-cccc-cccc-cccc-ddddaaaa0680-000000" }
        }));

        let events = Provider::Ses.parse(&body);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].email, "jane@example.com");
        assert_eq!(events[0].event_type, NormalizedEventType::Bounce);
        assert_eq!(events[0].bounce_type, Some(BounceType::Hard));
        assert_eq!(
            events[1].message_id.as_deref(),
            Some("00000138111222aa-33322211-cccc-cccc-cccc-ddddaaaa0680-000000")
        );
        assert!(events[0].timestamp.is_some());
    }

    #[test]
    fn test_transient_bounce_is_soft() {
        let body = sns(serde_json::json!({
            "notificationType": "Bounce",
            "bounce": {
                "bounceType": "Transient",
                "bouncedRecipients": [{ "emailAddress": "full@example.com" }]
            },
            "mail": { "messageId": "m-1" }
        }));
        let events = Provider::Ses.parse(&body);
        assert_eq!(events[0].bounce_type, Some(BounceType::Soft));
    }

    #[test]
    fn test_complaint_and_delivery() {
        let complaint = sns(serde_json::json!({
            "eventType": "Complaint",
            "complaint": { "complainedRecipients": [{ "emailAddress": "angry@example.com" }] },
            "mail": { "messageId": "m-2" }
        }));
        let events = Provider::Ses.parse(&complaint);
        assert_eq!(events[0].event_type, NormalizedEventType::Complaint);
        assert_eq!(events[0].email, "angry@example.com");

        let delivery = sns(serde_json::json!({
            "notificationType": "Delivery",
            "delivery": { "recipients": ["happy@example.com"], "timestamp": "2016-01-27T14:59:38.237Z" },
            "mail": { "messageId": "m-3" }
        }));
        let events = Provider::Ses.parse(&delivery);
        assert_eq!(events[0].event_type, NormalizedEventType::Delivered);
        assert_eq!(events[0].email, "happy@example.com");
        assert_eq!(events[0].bounce_type, None);
    }

    #[test]
    fn test_message_as_object() {
        let body = serde_json::json!({
            "Type": "Notification",
            "Message": {
                "notificationType": "Complaint",
                "complaint": { "complainedRecipients": [{ "emailAddress": "x@example.com" }] },
                "mail": { "messageId": "m-4" }
            }
        })
        .to_string();
        assert_eq!(Provider::Ses.parse(&body).len(), 1);
    }

    #[test]
    fn test_subscription_confirmation_emits_nothing() {
        let body = r#"{
            "Type": "SubscriptionConfirmation",
            "SubscribeURL": "https://sns.us-east-1.amazonaws.com/?Action=ConfirmSubscription&Token=abc"
        }"#;
        assert!(Provider::Ses.parse(body).is_empty());
    }
}
