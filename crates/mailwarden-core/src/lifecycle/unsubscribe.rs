//! Recipient-initiated unsubscribe

use super::ContactLifecycle;
use mailwarden_common::types::{ContactId, ListId};
use mailwarden_common::{Error, Result};
use mailwarden_storage::{CampaignCounter, ContactStatus, EventType, NewEvent};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    AlreadyUnsubscribed,
}

impl UnsubscribeOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            UnsubscribeOutcome::Unsubscribed => "You have been unsubscribed",
            UnsubscribeOutcome::AlreadyUnsubscribed => "You are already unsubscribed",
        }
    }
}

impl ContactLifecycle {
    /// Signed link for the unsubscribe endpoint
    pub fn unsubscribe_signature(&self, contact_id: ContactId, list_id: ListId) -> String {
        self.signer.sign_unsubscribe(contact_id, list_id)
    }

    /// Unsubscribe a contact from its list
    pub async fn unsubscribe(
        &self,
        contact_id: ContactId,
        list_id: ListId,
        signature: Option<&str>,
    ) -> Result<UnsubscribeOutcome> {
        match signature.map(str::trim).filter(|s| !s.is_empty()) {
            Some(sig) => {
                if !self.signer.verify_unsubscribe(contact_id, list_id, sig) {
                    return Err(Error::Validation("Invalid unsubscribe signature".to_string()));
                }
            }
            None if self.require_signature => {
                return Err(Error::Validation("Missing unsubscribe signature".to_string()));
            }
            None => {}
        }

        let contact = self
            .repos
            .contacts
            .get(contact_id)
            .await?
            .filter(|c| c.list_id == list_id)
            .ok_or_else(|| Error::NotFound("Subscription not found".to_string()))?;

        if contact.status != ContactStatus::Active
            || !self
                .repos
                .contacts
                .suppress(contact.id, ContactStatus::Unsubscribed)
                .await?
        {
            return Ok(UnsubscribeOutcome::AlreadyUnsubscribed);
        }

        self.repos.lists.decrement_active(list_id).await?;
        self.metrics.lifecycle.with_label_values(&["unsubscribed"]).inc();
        info!(contact_id = %contact.id, list_id = %list_id, "Contact unsubscribed");

        if let Some(send) = self.repos.sends.latest_for_contact(contact.id, &[]).await? {
            self.repos
                .events
                .append(NewEvent::new(send.id, EventType::Unsubscribed))
                .await?;
            self.repos
                .campaigns
                .increment(send.campaign_id, CampaignCounter::Unsubscribed)
                .await?;
        }

        Ok(UnsubscribeOutcome::Unsubscribed)
    }
}
