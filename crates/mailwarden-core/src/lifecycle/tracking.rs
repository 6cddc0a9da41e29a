//! Open and click tracking

use super::ContactLifecycle;
use chrono::Utc;
use mailwarden_common::types::SendId;
use mailwarden_common::{Error, Result};
use mailwarden_storage::{CampaignCounter, EmailSend, EventType, NewEvent, SendStatus};
use serde_json::json;
use tracing::debug;

impl ContactLifecycle {
    /// Record a tracking-pixel hit
    pub async fn record_open(&self, send_id: SendId) -> Result<()> {
        let send = self.tracked_send(send_id).await?;
        if !send.status.was_sent() {
            debug!(send_id = %send.id, status = %send.status, "Open for unsent message ignored");
            return Ok(());
        }

        let now = Utc::now();
        let first_open = send.status.can_transition_to(SendStatus::Opened)
            && self
                .repos
                .sends
                .transition(send.id, send.status, SendStatus::Opened, now)
                .await?;

        if first_open {
            self.repos
                .campaigns
                .increment(send.campaign_id, CampaignCounter::Opened)
                .await?;
            self.repos
                .events
                .append(NewEvent::new(send.id, EventType::Opened))
                .await?;
        }

        self.repos.contacts.record_open(send.contact_id, now).await?;
        Ok(())
    }

    /// Record a tracked-link click and return where to redirect
    pub async fn record_click(&self, send_id: SendId, target: &str) -> Result<String> {
        let url = url::Url::parse(target)
            .map_err(|e| Error::Validation(format!("Invalid click target: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Validation(
                "Click target must be an http(s) URL".to_string(),
            ));
        }

        let send = self.tracked_send(send_id).await?;
        if !send.status.was_sent() {
            debug!(send_id = %send.id, status = %send.status, "Click for unsent message ignored");
            return Ok(url.into());
        }

        let now = Utc::now();
        let first_click = send.status.can_transition_to(SendStatus::Clicked)
            && self
                .repos
                .sends
                .transition(send.id, send.status, SendStatus::Clicked, now)
                .await?;

        if first_click {
            self.repos
                .campaigns
                .increment(send.campaign_id, CampaignCounter::Clicked)
                .await?;
        }

        self.repos.contacts.record_click(send.contact_id, now).await?;
        self.repos
            .events
            .append(NewEvent::new(send.id, EventType::Clicked).with_metadata(json!({ "url": target })))
            .await?;

        Ok(url.into())
    }

    async fn tracked_send(&self, send_id: SendId) -> Result<EmailSend> {
        self.repos
            .sends
            .get(send_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Send {} not found", send_id)))
    }
}
