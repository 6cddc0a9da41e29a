//! Shared fixtures for engine tests

use crate::campaign::{MailTransport, OutboundMessage, TransportResult, UsageMeter};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mailwarden_common::types::{AccountId, OwnerId};
use mailwarden_common::{Config, Error};
use mailwarden_storage::{
    AccountRepository, CampaignRepository, ContactRepository, EmailAccount, EmailCampaign,
    EmailContact, EmailList, EmailSend, ListRepository, MemoryStore, NewAccount, NewCampaign,
    NewContact, NewList, Repositories, SendRepository, SmtpSecurity, Variant,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Transport that records every message and fails the attempts listed
/// by zero-based index
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    fail_at: HashSet<usize>,
    pub sent: Mutex<Vec<OutboundMessage>>,
    attempts: Mutex<usize>,
}

impl ScriptedTransport {
    pub fn failing_at(indices: &[usize]) -> Self {
        Self {
            fail_at: indices.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn delivered(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl MailTransport for ScriptedTransport {
    async fn send(&self, message: &OutboundMessage) -> TransportResult {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            *attempts - 1
        };
        if self.fail_at.contains(&attempt) {
            return TransportResult::failed("550 mailbox unavailable");
        }
        self.sent.lock().unwrap().push(message.clone());
        TransportResult::sent(format!("<msg-{}@test.example.com>", attempt))
    }
}

/// Usage meter that remembers every deduction
#[derive(Default)]
pub(crate) struct RecordingUsage {
    pub deductions: Mutex<Vec<(OwnerId, u32)>>,
}

#[async_trait]
impl UsageMeter for RecordingUsage {
    async fn deduct(&self, owner_id: OwnerId, count: u32) -> mailwarden_common::Result<()> {
        self.deductions.lock().unwrap().push((owner_id, count));
        Ok(())
    }
}

/// Account repository whose send counter always fails
pub(crate) struct BrokenSendCounter(pub Arc<MemoryStore>);

#[async_trait]
impl AccountRepository for BrokenSendCounter {
    async fn create(&self, input: NewAccount) -> mailwarden_common::Result<EmailAccount> {
        AccountRepository::create(self.0.as_ref(), input).await
    }

    async fn get(&self, id: AccountId) -> mailwarden_common::Result<Option<EmailAccount>> {
        AccountRepository::get(self.0.as_ref(), id).await
    }

    async fn get_for_owner(
        &self,
        owner_id: OwnerId,
        id: AccountId,
    ) -> mailwarden_common::Result<Option<EmailAccount>> {
        AccountRepository::get_for_owner(self.0.as_ref(), owner_id, id).await
    }

    async fn record_sends(
        &self,
        _id: AccountId,
        _count: i32,
        _now: DateTime<Utc>,
    ) -> mailwarden_common::Result<EmailAccount> {
        Err(Error::Database("connection reset".to_string()))
    }
}

pub(crate) struct Fixture {
    pub store: Arc<MemoryStore>,
    pub repos: Repositories,
    pub config: Config,
    pub account: EmailAccount,
    pub list: EmailList,
    pub campaign: EmailCampaign,
    pub contacts: Vec<EmailContact>,
}

pub(crate) struct FixtureBuilder {
    contacts: usize,
    daily_limit: i32,
    account_age_days: i64,
    ab_split: Option<i32>,
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self {
            contacts: 1,
            daily_limit: 1000,
            account_age_days: 90,
            ab_split: None,
        }
    }

    pub fn contacts(mut self, n: usize) -> Self {
        self.contacts = n;
        self
    }

    pub fn daily_limit(mut self, limit: i32) -> Self {
        self.daily_limit = limit;
        self
    }

    pub fn account_age_days(mut self, days: i64) -> Self {
        self.account_age_days = days;
        self
    }

    pub fn ab_split(mut self, percent: i32) -> Self {
        self.ab_split = Some(percent);
        self
    }

    pub async fn build(self) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let repos = Repositories::memory(store.clone());
        let owner_id = Uuid::new_v4();

        let account = repos
            .accounts
            .create(NewAccount {
                owner_id,
                email: "news@example.com".to_string(),
                from_name: Some("Example News".to_string()),
                smtp_host: "smtp.example.com".to_string(),
                smtp_port: 587,
                smtp_username: None,
                smtp_password: None,
                smtp_security: SmtpSecurity::StartTls,
                daily_limit: self.daily_limit,
                created_at: Some(Utc::now() - Duration::days(self.account_age_days)),
            })
            .await
            .unwrap();

        let list = repos
            .lists
            .create(NewList {
                owner_id,
                name: "Subscribers".to_string(),
            })
            .await
            .unwrap();

        let mut contacts = Vec::new();
        for i in 0..self.contacts {
            let contact = repos
                .contacts
                .create(NewContact {
                    list_id: list.id,
                    email: format!("User{}@Example.com", i),
                    first_name: Some(format!("User{}", i)),
                    last_name: Some("Tester".to_string()),
                    attributes: Some(serde_json::json!({ "plan": "pro" })),
                })
                .await
                .unwrap();
            contacts.push(contact);
        }

        let campaign = repos
            .campaigns
            .create(NewCampaign {
                owner_id,
                account_id: account.id,
                list_id: list.id,
                name: "March update".to_string(),
                subject: "Our March product update".to_string(),
                subject_b: self.ab_split.map(|_| "What we shipped in March".to_string()),
                ab_split_percent: self.ab_split,
                html_content: "<html><body><p>Hi {{first_name}}, see \
                    <a href=\"https://example.com/blog\">the blog</a>.</p></body></html>"
                    .to_string(),
                text_content: Some("Hi {{first_name}}".to_string()),
                scheduled_at: None,
            })
            .await
            .unwrap();

        let mut config = Config::default();
        config.pacing.enabled = false;
        config.tracking.signing_secret = "test-secret".to_string();

        Fixture {
            store,
            repos,
            config,
            account,
            list,
            campaign,
            contacts,
        }
    }
}

impl Fixture {
    /// A send for `contact` that made it out with `message_id`
    pub async fn sent(&self, contact: &EmailContact, message_id: &str) -> EmailSend {
        self.sent_with_variant(contact, message_id, None).await
    }

    pub async fn sent_with_variant(
        &self,
        contact: &EmailContact,
        message_id: &str,
        variant: Option<Variant>,
    ) -> EmailSend {
        let send = self
            .repos
            .sends
            .create(self.campaign.id, contact.id, variant)
            .await
            .unwrap();
        assert!(self
            .repos
            .sends
            .mark_sent(send.id, message_id, Utc::now())
            .await
            .unwrap());
        self.repos.sends.get(send.id).await.unwrap().unwrap()
    }

    pub async fn contact(&self, contact: &EmailContact) -> EmailContact {
        self.repos.contacts.get(contact.id).await.unwrap().unwrap()
    }

    pub async fn send(&self, send: &EmailSend) -> EmailSend {
        self.repos.sends.get(send.id).await.unwrap().unwrap()
    }

    pub async fn campaign(&self) -> EmailCampaign {
        self.repos.campaigns.get(self.campaign.id).await.unwrap().unwrap()
    }

    pub async fn list(&self) -> EmailList {
        self.repos.lists.get(self.list.id).await.unwrap().unwrap()
    }

    pub async fn account(&self) -> EmailAccount {
        self.repos.accounts.get(self.account.id).await.unwrap().unwrap()
    }
}
