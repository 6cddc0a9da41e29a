//! Bounce, complaint and delivery feedback

use crate::metrics::Metrics;
use crate::webhooks::{BounceType, NormalizedEvent, NormalizedEventType};
use chrono::Utc;
use mailwarden_common::signing::LinkSigner;
use mailwarden_common::types::normalize_email;
use mailwarden_common::{Config, Result};
use mailwarden_storage::{
    CampaignCounter, ContactStatus, EmailContact, EmailSend, EventType, NewEvent, Repositories,
    SendStatus,
};
use serde_json::json;
use tracing::{debug, info, warn};

/// Applies feedback events to contacts, sends and campaigns
pub struct ContactLifecycle {
    pub(super) repos: Repositories,
    pub(super) signer: LinkSigner,
    pub(super) require_signature: bool,
    pub(super) metrics: Metrics,
    soft_bounce_threshold: i32,
}

impl ContactLifecycle {
    pub fn new(repos: Repositories, config: &Config, metrics: Metrics) -> Result<Self> {
        Ok(Self {
            repos,
            signer: LinkSigner::new(&config.tracking.signing_secret)?,
            require_signature: config.unsubscribe.require_signature,
            metrics,
            soft_bounce_threshold: config.lifecycle.soft_bounce_threshold.max(1),
        })
    }

    /// Apply one normalized event. Returns whether anything changed.
    pub async fn apply(&self, event: &NormalizedEvent) -> Result<bool> {
        match event.event_type {
            NormalizedEventType::Bounce if event.bounce_type == Some(BounceType::Soft) => {
                self.apply_soft_bounce(event).await
            }
            NormalizedEventType::Bounce => self.apply_hard_bounce(event).await,
            NormalizedEventType::Complaint => self.apply_complaint(event).await,
            NormalizedEventType::Delivered => self.apply_delivered(event).await,
        }
    }

    /// Apply a batch; a failing event is logged and skipped.
    /// Returns how many events changed something.
    pub async fn apply_all(&self, events: &[NormalizedEvent]) -> usize {
        let mut processed = 0;
        for event in events {
            match self.apply(event).await {
                Ok(true) => processed += 1,
                Ok(false) => {
                    debug!(email = %event.email, event_type = %event.event_type, "Event changed nothing")
                }
                Err(e) => warn!(
                    email = %event.email,
                    event_type = %event.event_type,
                    "Failed to apply webhook event: {}",
                    e
                ),
            }
        }
        processed
    }

    async fn active_contacts(&self, event: &NormalizedEvent) -> Result<Vec<EmailContact>> {
        self.repos
            .contacts
            .active_by_email(&normalize_email(&event.email))
            .await
    }

    async fn apply_hard_bounce(&self, event: &NormalizedEvent) -> Result<bool> {
        let mut processed = false;
        for contact in self.active_contacts(event).await? {
            processed |= self
                .suppress_bounced(&contact, event, json!({ "bounce_type": "hard" }))
                .await?;
        }
        Ok(processed)
    }

    async fn apply_soft_bounce(&self, event: &NormalizedEvent) -> Result<bool> {
        let mut processed = false;
        for contact in self.active_contacts(event).await? {
            let Some(count) = self.repos.contacts.increment_soft_bounce(contact.id).await? else {
                continue;
            };
            processed = true;

            if count >= self.soft_bounce_threshold {
                info!(
                    contact_id = %contact.id,
                    soft_bounce_count = count,
                    "Soft bounce threshold reached, suppressing contact"
                );
                self.suppress_bounced(
                    &contact,
                    event,
                    json!({
                        "bounce_type": "soft",
                        "soft_bounce_count": count,
                        "auto_suppressed": true,
                    }),
                )
                .await?;
                continue;
            }

            self.metrics.lifecycle.with_label_values(&["soft_bounce"]).inc();
            let send = self
                .matching_send(&contact, event, &[SendStatus::Sent, SendStatus::Delivered])
                .await?;
            if let Some(send) = send {
                self.repos
                    .events
                    .append(
                        NewEvent::new(send.id, EventType::Bounced).with_metadata(json!({
                            "bounce_type": "soft",
                            "soft_bounce_count": count,
                        })),
                    )
                    .await?;
            }
        }
        Ok(processed)
    }

    /// ACTIVE -> BOUNCED plus the list, send, campaign and event updates.
    /// Everything after the contact update happens only if this call won it.
    async fn suppress_bounced(
        &self,
        contact: &EmailContact,
        event: &NormalizedEvent,
        metadata: serde_json::Value,
    ) -> Result<bool> {
        if !self
            .repos
            .contacts
            .suppress(contact.id, ContactStatus::Bounced)
            .await?
        {
            return Ok(false);
        }

        self.repos.lists.decrement_active(contact.list_id).await?;
        self.metrics.lifecycle.with_label_values(&["bounced"]).inc();
        info!(contact_id = %contact.id, email = %contact.email, "Contact bounced");

        let send = self.matching_send(contact, event, &[SendStatus::Sent]).await?;
        if let Some(send) = send {
            self.move_send(&send, SendStatus::Bounced).await?;
            self.repos
                .campaigns
                .increment(send.campaign_id, CampaignCounter::Bounced)
                .await?;
            self.repos
                .events
                .append(NewEvent::new(send.id, EventType::Bounced).with_metadata(metadata))
                .await?;
        }

        Ok(true)
    }

    async fn apply_complaint(&self, event: &NormalizedEvent) -> Result<bool> {
        let mut processed = false;
        for contact in self.active_contacts(event).await? {
            if !self
                .repos
                .contacts
                .suppress(contact.id, ContactStatus::Complained)
                .await?
            {
                continue;
            }
            processed = true;

            self.repos.lists.decrement_active(contact.list_id).await?;
            self.metrics.lifecycle.with_label_values(&["complained"]).inc();
            info!(contact_id = %contact.id, email = %contact.email, "Contact complained");

            let send = self
                .matching_send(
                    &contact,
                    event,
                    &[SendStatus::Sent, SendStatus::Delivered, SendStatus::Opened],
                )
                .await?;
            if let Some(send) = send {
                self.move_send(&send, SendStatus::Complained).await?;
                self.repos
                    .campaigns
                    .increment(send.campaign_id, CampaignCounter::Complaints)
                    .await?;
                self.repos
                    .events
                    .append(NewEvent::new(send.id, EventType::Complained))
                    .await?;
            }
        }
        Ok(processed)
    }

    /// Only a confirmed delivery of a SENT send resets the soft-bounce count
    async fn apply_delivered(&self, event: &NormalizedEvent) -> Result<bool> {
        let Some(message_id) = event.message_id.as_deref() else {
            debug!(email = %event.email, "Delivery without message id ignored");
            return Ok(false);
        };

        let Some(send) = self.repos.sends.find_by_message_id(message_id).await? else {
            debug!(message_id, "Delivery for unknown message ignored");
            return Ok(false);
        };

        if send.status != SendStatus::Sent
            || !self
                .repos
                .sends
                .transition(send.id, SendStatus::Sent, SendStatus::Delivered, Utc::now())
                .await?
        {
            return Ok(false);
        }

        self.repos
            .events
            .append(NewEvent::new(send.id, EventType::Delivered))
            .await?;
        self.repos.contacts.reset_soft_bounces(send.contact_id).await?;
        self.metrics.lifecycle.with_label_values(&["delivered"]).inc();

        Ok(true)
    }

    /// The send a feedback event refers to: the contact's send carrying the
    /// event's message id, else the contact's latest send in `fallback`
    async fn matching_send(
        &self,
        contact: &EmailContact,
        event: &NormalizedEvent,
        fallback: &[SendStatus],
    ) -> Result<Option<EmailSend>> {
        if let Some(message_id) = event.message_id.as_deref() {
            if let Some(send) = self.repos.sends.find_by_message_id(message_id).await? {
                if send.contact_id == contact.id {
                    return Ok(Some(send));
                }
            }
        }

        self.repos
            .sends
            .latest_for_contact(contact.id, fallback)
            .await
    }

    async fn move_send(&self, send: &EmailSend, to: SendStatus) -> Result<bool> {
        if !send.status.can_transition_to(to) {
            debug!(send_id = %send.id, from = %send.status, to = %to, "Send left as is");
            return Ok(false);
        }
        self.repos
            .sends
            .transition(send.id, send.status, to, Utc::now())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::CampaignOrchestrator;
    use crate::testing::{FixtureBuilder, RecordingUsage, ScriptedTransport};
    use crate::webhooks::{Provider, WebhookParser};
    use std::sync::Arc;
    use pretty_assertions::assert_eq;

    fn event(email: &str, event_type: NormalizedEventType, bounce: Option<BounceType>) -> NormalizedEvent {
        NormalizedEvent {
            email: email.to_string(),
            event_type,
            message_id: None,
            bounce_type: bounce,
            timestamp: None,
            raw: serde_json::Value::Null,
        }
    }

    async fn lifecycle(fixture: &crate::testing::Fixture) -> ContactLifecycle {
        ContactLifecycle::new(fixture.repos.clone(), &fixture.config, Metrics::new().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_hard_bounce_suppresses_once() {
        let fixture = FixtureBuilder::new().contacts(2).build().await;
        let lifecycle = lifecycle(&fixture).await;
        let contact = &fixture.contacts[0];
        let send = fixture.sent(contact, "<m-1@example.com>").await;

        let bounce = event("USER0@example.com ", NormalizedEventType::Bounce, Some(BounceType::Hard));
        assert!(lifecycle.apply(&bounce).await.unwrap());

        assert_eq!(fixture.contact(contact).await.status, ContactStatus::Bounced);
        assert_eq!(fixture.list().await.active_count, 1);
        let send = fixture.send(&send).await;
        assert_eq!(send.status, SendStatus::Bounced);
        assert!(send.bounced_at.is_some());
        assert_eq!(fixture.campaign().await.total_bounced, 1);

        // Re-applied: no double decrement, no double count
        assert!(!lifecycle.apply(&bounce).await.unwrap());
        assert_eq!(fixture.list().await.active_count, 1);
        assert_eq!(fixture.campaign().await.total_bounced, 1);

        let events = fixture.store.all_events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Bounced);
        assert_eq!(events[0].metadata["bounce_type"], "hard");
    }

    #[tokio::test]
    async fn test_bounce_prefers_message_id_match() {
        let fixture = FixtureBuilder::new().build().await;
        let lifecycle = lifecycle(&fixture).await;
        let contact = &fixture.contacts[0];
        let older = fixture.sent(contact, "<older@example.com>").await;
        let newer = fixture.sent(contact, "<newer@example.com>").await;

        let mut bounce = event("user0@example.com", NormalizedEventType::Bounce, Some(BounceType::Hard));
        bounce.message_id = Some("older@example.com".to_string());
        lifecycle.apply(&bounce).await.unwrap();

        assert_eq!(fixture.send(&older).await.status, SendStatus::Bounced);
        assert_eq!(fixture.send(&newer).await.status, SendStatus::Sent);
    }

    #[tokio::test]
    async fn test_three_soft_bounces_suppress_on_third() {
        let fixture = FixtureBuilder::new().build().await;
        let lifecycle = lifecycle(&fixture).await;
        let contact = &fixture.contacts[0];
        fixture.sent(contact, "<m-1@example.com>").await;
        let soft = event("user0@example.com", NormalizedEventType::Bounce, Some(BounceType::Soft));

        lifecycle.apply(&soft).await.unwrap();
        lifecycle.apply(&soft).await.unwrap();
        let after_two = fixture.contact(contact).await;
        assert_eq!(after_two.status, ContactStatus::Active);
        assert_eq!(after_two.soft_bounce_count, 2);

        lifecycle.apply(&soft).await.unwrap();
        let after_three = fixture.contact(contact).await;
        assert_eq!(after_three.status, ContactStatus::Bounced);
        assert_eq!(fixture.list().await.active_count, 0);
        assert_eq!(fixture.campaign().await.total_bounced, 1);

        let events = fixture.store.all_events().await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].metadata["auto_suppressed"], true);
    }

    #[tokio::test]
    async fn test_delivered_resets_soft_bounces() {
        let fixture = FixtureBuilder::new().build().await;
        let lifecycle = lifecycle(&fixture).await;
        let contact = &fixture.contacts[0];
        let send = fixture.sent(contact, "<m-1@example.com>").await;

        let soft = event("user0@example.com", NormalizedEventType::Bounce, Some(BounceType::Soft));
        lifecycle.apply(&soft).await.unwrap();
        lifecycle.apply(&soft).await.unwrap();

        // Without a message id nothing is reset
        let unmatched = event("user0@example.com", NormalizedEventType::Delivered, None);
        assert!(!lifecycle.apply(&unmatched).await.unwrap());
        assert_eq!(fixture.contact(contact).await.soft_bounce_count, 2);

        let mut delivered = unmatched.clone();
        delivered.message_id = Some("<m-1@example.com>".to_string());
        assert!(lifecycle.apply(&delivered).await.unwrap());
        assert_eq!(fixture.contact(contact).await.soft_bounce_count, 0);
        let send = fixture.send(&send).await;
        assert_eq!(send.status, SendStatus::Delivered);
        assert!(send.delivered_at.is_some());

        // Only SENT sends confirm delivery
        assert!(!lifecycle.apply(&delivered).await.unwrap());
    }

    #[tokio::test]
    async fn test_new_send_does_not_reset_soft_bounces() {
        let fixture = FixtureBuilder::new().build().await;
        let lifecycle = lifecycle(&fixture).await;
        let contact = &fixture.contacts[0];

        let soft = event("user0@example.com", NormalizedEventType::Bounce, Some(BounceType::Soft));
        lifecycle.apply(&soft).await.unwrap();
        lifecycle.apply(&soft).await.unwrap();
        assert_eq!(fixture.contact(contact).await.soft_bounce_count, 2);

        let orchestrator = CampaignOrchestrator::new(
            fixture.repos.clone(),
            Arc::new(ScriptedTransport::default()),
            Arc::new(RecordingUsage::default()),
            &fixture.config,
            Metrics::new().unwrap(),
        )
        .unwrap();
        let report = orchestrator
            .send(fixture.campaign.owner_id, fixture.campaign.id)
            .await
            .unwrap();
        assert_eq!(report.sent, 1);

        // SENT alone is not a delivery confirmation
        let contact_after = fixture.contact(contact).await;
        assert_eq!(contact_after.status, ContactStatus::Active);
        assert_eq!(contact_after.soft_bounce_count, 2);

        let mut delivered = event("user0@example.com", NormalizedEventType::Delivered, None);
        delivered.message_id = Some("<msg-0@test.example.com>".to_string());
        assert!(lifecycle.apply(&delivered).await.unwrap());
        assert_eq!(fixture.contact(contact).await.soft_bounce_count, 0);
    }

    #[tokio::test]
    async fn test_complaint() {
        let fixture = FixtureBuilder::new().build().await;
        let lifecycle = lifecycle(&fixture).await;
        let contact = &fixture.contacts[0];
        let send = fixture.sent(contact, "<m-1@example.com>").await;

        let complaint = event("user0@example.com", NormalizedEventType::Complaint, None);
        assert!(lifecycle.apply(&complaint).await.unwrap());

        assert_eq!(fixture.contact(contact).await.status, ContactStatus::Complained);
        assert_eq!(fixture.send(&send).await.status, SendStatus::Complained);
        assert_eq!(fixture.campaign().await.total_complaints, 1);
        assert_eq!(fixture.list().await.active_count, 0);

        // A later bounce never reverts or re-suppresses
        let bounce = event("user0@example.com", NormalizedEventType::Bounce, Some(BounceType::Hard));
        assert!(!lifecycle.apply(&bounce).await.unwrap());
        assert_eq!(fixture.contact(contact).await.status, ContactStatus::Complained);
    }

    #[tokio::test]
    async fn test_unknown_email_changes_nothing() {
        let fixture = FixtureBuilder::new().build().await;
        let lifecycle = lifecycle(&fixture).await;
        let bounce = event("nobody@example.com", NormalizedEventType::Bounce, Some(BounceType::Hard));
        assert!(!lifecycle.apply(&bounce).await.unwrap());
        assert_eq!(fixture.list().await.active_count, 1);
    }

    #[tokio::test]
    async fn test_apply_all_from_provider_payload() {
        let fixture = FixtureBuilder::new().contacts(3).build().await;
        let lifecycle = lifecycle(&fixture).await;
        for contact in &fixture.contacts {
            fixture.sent(contact, &format!("<{}@example.com>", contact.id)).await;
        }

        let body = r#"[
            {"email": "user0@example.com", "event": "bounce", "type": "bounce"},
            {"email": "user1@example.com", "event": "spamreport"},
            {"email": "someone-else@example.com", "event": "bounce"},
            {"email": "user2@example.com", "event": "open"}
        ]"#;
        let events = Provider::SendGrid.parse(body);
        assert_eq!(events.len(), 3);
        assert_eq!(lifecycle.apply_all(&events).await, 2);
        assert_eq!(fixture.list().await.active_count, 1);
    }
}
