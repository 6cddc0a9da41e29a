//! In-memory storage backend
//!
//! Implements every repository trait over a single `RwLock`, with the same
//! conditional-update semantics as the PostgreSQL queries. Used by tests
//! and by `database.backend = "memory"` for local development.

use crate::models::{
    normalize_message_id, CampaignCounter, CampaignDeliveryStats, CampaignStatus, ContactStatus,
    EmailAccount, EmailCampaign, EmailContact, EmailEvent, EmailList, EmailSend, NewAccount,
    NewCampaign, NewContact, NewEvent, NewList, SendStatus, Variant, VariantStats,
};
use crate::repository::{
    AccountRepository, CampaignRepository, ContactRepository, EventRepository, ListRepository,
    SendRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mailwarden_common::types::{
    normalize_email, AccountId, CampaignId, ContactId, ListId, OwnerId, SendId,
};
use mailwarden_common::{Error, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    accounts: HashMap<AccountId, EmailAccount>,
    campaigns: HashMap<CampaignId, EmailCampaign>,
    lists: HashMap<ListId, EmailList>,
    // Insertion order doubles as list order.
    contacts: Vec<EmailContact>,
    sends: Vec<EmailSend>,
    events: Vec<EmailEvent>,
}

impl Tables {
    fn contact_mut(&mut self, id: ContactId) -> Option<&mut EmailContact> {
        self.contacts.iter_mut().find(|c| c.id == id)
    }

    fn send_mut(&mut self, id: SendId) -> Option<&mut EmailSend> {
        self.sends.iter_mut().find(|s| s.id == id)
    }
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every audit event, oldest first
    pub async fn all_events(&self) -> Vec<EmailEvent> {
        self.tables.read().await.events.clone()
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn create(&self, input: NewAccount) -> Result<EmailAccount> {
        let account = EmailAccount {
            id: Uuid::now_v7(),
            owner_id: input.owner_id,
            email: normalize_email(&input.email),
            from_name: input.from_name,
            smtp_host: input.smtp_host,
            smtp_port: input.smtp_port,
            smtp_username: input.smtp_username,
            smtp_password: input.smtp_password,
            smtp_security: input.smtp_security,
            daily_limit: input.daily_limit,
            sent_today: 0,
            last_reset_at: None,
            created_at: input.created_at.unwrap_or_else(Utc::now),
        };

        let mut tables = self.tables.write().await;
        tables.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get(&self, id: AccountId) -> Result<Option<EmailAccount>> {
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn get_for_owner(
        &self,
        owner_id: OwnerId,
        id: AccountId,
    ) -> Result<Option<EmailAccount>> {
        Ok(self
            .tables
            .read()
            .await
            .accounts
            .get(&id)
            .filter(|a| a.owner_id == owner_id)
            .cloned())
    }

    async fn record_sends(
        &self,
        id: AccountId,
        count: i32,
        now: DateTime<Utc>,
    ) -> Result<EmailAccount> {
        let mut tables = self.tables.write().await;
        let account = tables
            .accounts
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Account {} not found", id)))?;

        let expired = account
            .last_reset_at
            .map_or(true, |reset| reset <= now - Duration::hours(24));
        if expired {
            account.sent_today = count;
            account.last_reset_at = Some(now);
        } else {
            account.sent_today += count;
        }

        Ok(account.clone())
    }
}

#[async_trait]
impl CampaignRepository for MemoryStore {
    async fn create(&self, input: NewCampaign) -> Result<EmailCampaign> {
        let status = if input.scheduled_at.is_some() {
            CampaignStatus::Scheduled
        } else {
            CampaignStatus::Draft
        };

        let campaign = EmailCampaign {
            id: Uuid::now_v7(),
            owner_id: input.owner_id,
            account_id: input.account_id,
            list_id: input.list_id,
            name: input.name,
            subject: input.subject,
            subject_b: input.subject_b,
            ab_split_percent: input.ab_split_percent,
            html_content: input.html_content,
            text_content: input.text_content,
            status,
            scheduled_at: input.scheduled_at,
            sent_at: None,
            completed_at: None,
            ab_winner: None,
            total_sent: 0,
            total_bounced: 0,
            total_complaints: 0,
            total_opened: 0,
            total_clicked: 0,
            total_unsubscribed: 0,
            created_at: Utc::now(),
        };

        let mut tables = self.tables.write().await;
        tables.campaigns.insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    async fn get(&self, id: CampaignId) -> Result<Option<EmailCampaign>> {
        Ok(self.tables.read().await.campaigns.get(&id).cloned())
    }

    async fn get_for_owner(
        &self,
        owner_id: OwnerId,
        id: CampaignId,
    ) -> Result<Option<EmailCampaign>> {
        Ok(self
            .tables
            .read()
            .await
            .campaigns
            .get(&id)
            .filter(|c| c.owner_id == owner_id)
            .cloned())
    }

    async fn transition(
        &self,
        id: CampaignId,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<bool> {
        from.transition(to)?;

        let mut tables = self.tables.write().await;
        match tables.campaigns.get_mut(&id) {
            Some(campaign) if campaign.status == from => {
                campaign.status = to;
                if to == CampaignStatus::Sending {
                    campaign.sent_at = Some(Utc::now());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(
        &self,
        id: CampaignId,
        status: CampaignStatus,
        sent: i32,
        ab_winner: Option<Variant>,
    ) -> Result<bool> {
        CampaignStatus::Sending.transition(status)?;

        let mut tables = self.tables.write().await;
        match tables.campaigns.get_mut(&id) {
            Some(campaign) if campaign.status == CampaignStatus::Sending => {
                campaign.status = status;
                campaign.total_sent += sent;
                campaign.completed_at = Some(Utc::now());
                if ab_winner.is_some() {
                    campaign.ab_winner = ab_winner;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment(&self, id: CampaignId, counter: CampaignCounter) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(campaign) = tables.campaigns.get_mut(&id) {
            let field = match counter {
                CampaignCounter::Bounced => &mut campaign.total_bounced,
                CampaignCounter::Complaints => &mut campaign.total_complaints,
                CampaignCounter::Opened => &mut campaign.total_opened,
                CampaignCounter::Clicked => &mut campaign.total_clicked,
                CampaignCounter::Unsubscribed => &mut campaign.total_unsubscribed,
            };
            *field += 1;
        }
        Ok(())
    }

    async fn set_ab_winner(&self, id: CampaignId, winner: Variant) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(campaign) = tables.campaigns.get_mut(&id) {
            campaign.ab_winner = Some(winner);
        }
        Ok(())
    }

    async fn recent_stats(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<CampaignDeliveryStats>> {
        let tables = self.tables.read().await;
        let mut completed: Vec<&EmailCampaign> = tables
            .campaigns
            .values()
            .filter(|c| {
                c.account_id == account_id
                    && matches!(c.status, CampaignStatus::Sent | CampaignStatus::Failed)
            })
            .collect();
        completed.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));

        Ok(completed
            .into_iter()
            .take(limit)
            .map(|c| CampaignDeliveryStats {
                total_sent: c.total_sent,
                total_bounced: c.total_bounced,
                total_complaints: c.total_complaints,
            })
            .collect())
    }

    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<EmailCampaign>> {
        let tables = self.tables.read().await;
        let mut due: Vec<EmailCampaign> = tables
            .campaigns
            .values()
            .filter(|c| {
                c.status == CampaignStatus::Scheduled
                    && c.scheduled_at.map_or(false, |at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|c| c.scheduled_at);
        Ok(due)
    }
}

#[async_trait]
impl ListRepository for MemoryStore {
    async fn create(&self, input: NewList) -> Result<EmailList> {
        let list = EmailList {
            id: Uuid::now_v7(),
            owner_id: input.owner_id,
            name: input.name,
            contact_count: 0,
            active_count: 0,
            created_at: Utc::now(),
        };

        let mut tables = self.tables.write().await;
        tables.lists.insert(list.id, list.clone());
        Ok(list)
    }

    async fn get(&self, id: ListId) -> Result<Option<EmailList>> {
        Ok(self.tables.read().await.lists.get(&id).cloned())
    }

    async fn get_for_owner(&self, owner_id: OwnerId, id: ListId) -> Result<Option<EmailList>> {
        Ok(self
            .tables
            .read()
            .await
            .lists
            .get(&id)
            .filter(|l| l.owner_id == owner_id)
            .cloned())
    }

    async fn decrement_active(&self, id: ListId) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(list) = tables.lists.get_mut(&id) {
            list.active_count = (list.active_count - 1).max(0);
        }
        Ok(())
    }
}

#[async_trait]
impl ContactRepository for MemoryStore {
    async fn create(&self, input: NewContact) -> Result<EmailContact> {
        let contact = EmailContact {
            id: Uuid::now_v7(),
            list_id: input.list_id,
            email: normalize_email(&input.email),
            first_name: input.first_name,
            last_name: input.last_name,
            attributes: input.attributes.unwrap_or_else(|| serde_json::json!({})),
            status: ContactStatus::Active,
            soft_bounce_count: 0,
            open_count: 0,
            click_count: 0,
            last_open_at: None,
            last_click_at: None,
            unsubscribed_at: None,
            created_at: Utc::now(),
        };

        let mut tables = self.tables.write().await;
        let list = tables
            .lists
            .get_mut(&contact.list_id)
            .ok_or_else(|| Error::NotFound(format!("List {} not found", contact.list_id)))?;
        list.contact_count += 1;
        list.active_count += 1;
        tables.contacts.push(contact.clone());
        Ok(contact)
    }

    async fn get(&self, id: ContactId) -> Result<Option<EmailContact>> {
        Ok(self
            .tables
            .read()
            .await
            .contacts
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn active_in_list(&self, list_id: ListId) -> Result<Vec<EmailContact>> {
        Ok(self
            .tables
            .read()
            .await
            .contacts
            .iter()
            .filter(|c| c.list_id == list_id && c.status == ContactStatus::Active)
            .cloned()
            .collect())
    }

    async fn active_by_email(&self, email: &str) -> Result<Vec<EmailContact>> {
        let email = normalize_email(email);
        Ok(self
            .tables
            .read()
            .await
            .contacts
            .iter()
            .filter(|c| c.email == email && c.status == ContactStatus::Active)
            .cloned()
            .collect())
    }

    async fn suppress(&self, id: ContactId, status: ContactStatus) -> Result<bool> {
        ContactStatus::Active.transition(status)?;

        let mut tables = self.tables.write().await;
        match tables.contact_mut(id) {
            Some(contact) if contact.status == ContactStatus::Active => {
                contact.status = status;
                if status == ContactStatus::Unsubscribed {
                    contact.unsubscribed_at = Some(Utc::now());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment_soft_bounce(&self, id: ContactId) -> Result<Option<i32>> {
        let mut tables = self.tables.write().await;
        match tables.contact_mut(id) {
            Some(contact) if contact.status == ContactStatus::Active => {
                contact.soft_bounce_count += 1;
                Ok(Some(contact.soft_bounce_count))
            }
            _ => Ok(None),
        }
    }

    async fn reset_soft_bounces(&self, id: ContactId) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(contact) = tables.contact_mut(id) {
            contact.soft_bounce_count = 0;
        }
        Ok(())
    }

    async fn record_open(&self, id: ContactId, at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(contact) = tables.contact_mut(id) {
            contact.open_count += 1;
            contact.last_open_at = Some(at);
        }
        Ok(())
    }

    async fn record_click(&self, id: ContactId, at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(contact) = tables.contact_mut(id) {
            contact.click_count += 1;
            contact.last_click_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl SendRepository for MemoryStore {
    async fn create(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        variant: Option<Variant>,
    ) -> Result<EmailSend> {
        let send = EmailSend {
            id: Uuid::now_v7(),
            campaign_id,
            contact_id,
            variant,
            message_id: None,
            status: SendStatus::Queued,
            error: None,
            sent_at: None,
            delivered_at: None,
            bounced_at: None,
            opened_at: None,
            clicked_at: None,
            created_at: Utc::now(),
        };

        self.tables.write().await.sends.push(send.clone());
        Ok(send)
    }

    async fn get(&self, id: SendId) -> Result<Option<EmailSend>> {
        Ok(self
            .tables
            .read()
            .await
            .sends
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn mark_sent(&self, id: SendId, message_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.send_mut(id) {
            Some(send) if send.status == SendStatus::Queued => {
                send.status = SendStatus::Sent;
                send.message_id = Some(normalize_message_id(message_id));
                send.sent_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_failed(&self, id: SendId, error: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.send_mut(id) {
            Some(send) if send.status == SendStatus::Queued => {
                send.status = SendStatus::Failed;
                send.error = Some(error.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition(
        &self,
        id: SendId,
        from: SendStatus,
        to: SendStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        from.transition(to)?;

        let mut tables = self.tables.write().await;
        let send = match tables.send_mut(id) {
            Some(send) if send.status == from => send,
            _ => return Ok(false),
        };

        send.status = to;
        let stamp = match to {
            SendStatus::Sent => Some(&mut send.sent_at),
            SendStatus::Delivered => Some(&mut send.delivered_at),
            SendStatus::Bounced => Some(&mut send.bounced_at),
            SendStatus::Opened => Some(&mut send.opened_at),
            SendStatus::Clicked => Some(&mut send.clicked_at),
            SendStatus::Queued | SendStatus::Failed | SendStatus::Complained => None,
        };
        if let Some(slot) = stamp {
            slot.get_or_insert(at);
        }
        Ok(true)
    }

    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<EmailSend>> {
        let message_id = normalize_message_id(message_id);
        Ok(self
            .tables
            .read()
            .await
            .sends
            .iter()
            .rev()
            .find(|s| s.message_id.as_deref() == Some(message_id.as_str()))
            .cloned())
    }

    async fn latest_for_contact(
        &self,
        contact_id: ContactId,
        statuses: &[SendStatus],
    ) -> Result<Option<EmailSend>> {
        let tables = self.tables.read().await;
        Ok(tables
            .sends
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                s.contact_id == contact_id
                    && (statuses.is_empty() || statuses.contains(&s.status))
            })
            .max_by_key(|(idx, s)| (s.sent_at.is_some(), s.sent_at, *idx))
            .map(|(_, s)| s.clone()))
    }

    async fn list_for_campaign(&self, campaign_id: CampaignId) -> Result<Vec<EmailSend>> {
        Ok(self
            .tables
            .read()
            .await
            .sends
            .iter()
            .filter(|s| s.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn variant_stats(&self, campaign_id: CampaignId) -> Result<Vec<VariantStats>> {
        let tables = self.tables.read().await;
        let mut stats = Vec::new();

        for variant in [Variant::A, Variant::B] {
            let sends: Vec<&EmailSend> = tables
                .sends
                .iter()
                .filter(|s| s.campaign_id == campaign_id && s.variant == Some(variant))
                .collect();
            if sends.is_empty() {
                continue;
            }

            stats.push(VariantStats {
                variant,
                sent: sends.iter().filter(|s| s.status.was_sent()).count() as i64,
                opened: sends.iter().filter(|s| s.opened_at.is_some()).count() as i64,
                clicked: sends.iter().filter(|s| s.clicked_at.is_some()).count() as i64,
            });
        }

        Ok(stats)
    }
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn append(&self, input: NewEvent) -> Result<EmailEvent> {
        let event = EmailEvent {
            id: Uuid::now_v7(),
            send_id: input.send_id,
            event_type: input.event_type,
            metadata: input.metadata,
            created_at: Utc::now(),
        };

        self.tables.write().await.events.push(event.clone());
        Ok(event)
    }
}
