//! Campaign send orchestration
//!
//! A send runs in two phases. `prepare` applies every gate and moves the
//! campaign to SENDING; nothing is mutated when a gate refuses. `execute`
//! walks the batch one contact at a time, serialized per sending account.

use super::ab_test::{assign_variants, decide_winner, interim_winner};
use super::personalize::Personalizer;
use super::transport::{MailTransport, OutboundMessage, SmtpEndpoint};
use super::usage::UsageMeter;
use crate::metrics::Metrics;
use crate::pacing::{effective_daily_limit, sending_pace, DailyQuota, EffectiveLimit, SendingPace};
use crate::reputation::{HealthMonitor, HealthReport};
use crate::spam::SpamScoreAnalyzer;
use chrono::Utc;
use mailwarden_common::types::{AccountId, CampaignId, OwnerId};
use mailwarden_common::{Config, Error, Result};
use mailwarden_storage::{
    CampaignStatus, EmailAccount, EmailCampaign, EmailContact, EventType, NewEvent, Repositories,
    Variant, VariantStats,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Orchestrator settings taken from [`Config`]
#[derive(Debug, Clone)]
struct Settings {
    pacing_enabled: bool,
    lookback_campaigns: usize,
    block_on_spam: bool,
    min_opens_for_winner: i64,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            pacing_enabled: config.pacing.enabled,
            lookback_campaigns: config.health.lookback_campaigns,
            block_on_spam: config.spam.block_on_send,
            min_opens_for_winner: config.ab_test.min_opens_for_winner,
        }
    }
}

/// A campaign that passed every gate and is now SENDING
pub struct PreparedSend {
    campaign: EmailCampaign,
    batch: Vec<(EmailContact, Option<Variant>)>,
    cancel: CancellationToken,
}

impl PreparedSend {
    pub fn campaign_id(&self) -> CampaignId {
        self.campaign.id
    }

    pub fn recipients(&self) -> usize {
        self.batch.len()
    }
}

/// Outcome of a finished send loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReport {
    pub campaign_id: CampaignId,
    pub status: CampaignStatus,
    pub recipients: usize,
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub ab_winner: Option<Variant>,
}

/// Result of an explicit A/B winner recomputation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTestResult {
    pub campaign_id: CampaignId,
    pub winner: Option<Variant>,
    /// True when the winner was decided by open rate on this call
    pub decided: bool,
    pub variants: Vec<VariantStats>,
}

/// Campaign with its per-variant engagement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignDetail {
    pub campaign: EmailCampaign,
    pub variants: Vec<VariantStats>,
}

/// Reputation, warm-up and quota status of a sending account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountHealth {
    pub account_id: AccountId,
    pub health: HealthReport,
    pub warmup: EffectiveLimit,
    pub quota: DailyQuota,
    pub pace: SendingPace,
}

/// Per-account send locks, dropped when no campaign holds them
#[derive(Default)]
struct AccountLocks {
    locks: Mutex<HashMap<AccountId, Arc<tokio::sync::Mutex<()>>>>,
}

impl AccountLocks {
    fn get(&self, account_id: AccountId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(account_id).or_default().clone()
    }

    fn release(&self, account_id: AccountId, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        drop(lock);
        if locks
            .get(&account_id)
            .map_or(false, |l| Arc::strong_count(l) == 1)
        {
            locks.remove(&account_id);
        }
    }
}

/// Drives campaigns from DRAFT/SCHEDULED to SENT/FAILED
pub struct CampaignOrchestrator {
    repos: Repositories,
    transport: Arc<dyn MailTransport>,
    usage: Arc<dyn UsageMeter>,
    analyzer: SpamScoreAnalyzer,
    monitor: HealthMonitor,
    personalizer: Personalizer,
    metrics: Metrics,
    settings: Settings,
    account_locks: AccountLocks,
    cancellations: Mutex<HashMap<CampaignId, CancellationToken>>,
}

impl CampaignOrchestrator {
    pub fn new(
        repos: Repositories,
        transport: Arc<dyn MailTransport>,
        usage: Arc<dyn UsageMeter>,
        config: &Config,
        metrics: Metrics,
    ) -> Result<Self> {
        Ok(Self {
            repos,
            transport,
            usage,
            analyzer: SpamScoreAnalyzer::new(),
            monitor: HealthMonitor::new(),
            personalizer: Personalizer::new(config)?,
            metrics,
            settings: Settings::from(config),
            account_locks: AccountLocks::default(),
            cancellations: Mutex::new(HashMap::new()),
        })
    }

    /// Gate and run a campaign to completion
    pub async fn send(&self, owner_id: OwnerId, campaign_id: CampaignId) -> Result<SendReport> {
        let prepared = self.prepare(owner_id, campaign_id).await?;
        self.execute(prepared).await
    }

    /// Apply the gates and move the campaign to SENDING
    pub async fn prepare(&self, owner_id: OwnerId, campaign_id: CampaignId) -> Result<PreparedSend> {
        let campaign = self
            .repos
            .campaigns
            .get_for_owner(owner_id, campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound("Campaign not found".to_string()))?;

        if !matches!(campaign.status, CampaignStatus::Draft | CampaignStatus::Scheduled) {
            return Err(Error::Validation(format!(
                "Campaign cannot be sent from status {}",
                campaign.status
            )));
        }

        let contacts = self.repos.contacts.active_in_list(campaign.list_id).await?;
        if contacts.is_empty() {
            return Err(Error::Validation("No active contacts in this list".to_string()));
        }

        let account = self
            .repos
            .accounts
            .get_for_owner(owner_id, campaign.account_id)
            .await?
            .ok_or_else(|| Error::NotFound("Sending account not found".to_string()))?;

        let health = self.health_report(&account).await?;
        if !health.can_send {
            self.reject("health");
            return Err(Error::PolicyBlocked(health.reason()));
        }
        if !health.warnings.is_empty() {
            warn!(
                campaign_id = %campaign.id,
                account_id = %account.id,
                "Sending despite health warnings: {}",
                health.reason()
            );
        }

        let quota = self.quota(&account);
        if quota.is_exhausted() {
            self.reject("daily_limit");
            return Err(Error::PolicyBlocked("Daily sending limit reached".to_string()));
        }

        if self.settings.block_on_spam {
            self.check_content(&campaign)?;
        }

        if !self
            .repos
            .campaigns
            .transition(campaign.id, campaign.status, CampaignStatus::Sending)
            .await?
        {
            return Err(Error::Validation("Campaign is already being sent".to_string()));
        }

        let mut contacts = contacts;
        contacts.truncate(quota.remaining as usize);

        let batch: Vec<(EmailContact, Option<Variant>)> = match campaign.ab_split_percent {
            Some(percent) if campaign.is_ab_test() => {
                let variants = assign_variants(contacts.len(), percent, &mut rand::rng());
                contacts
                    .into_iter()
                    .zip(variants.into_iter().map(Some))
                    .collect()
            }
            _ => contacts.into_iter().map(|c| (c, None)).collect(),
        };

        let cancel = CancellationToken::new();
        self.cancellations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(campaign.id, cancel.clone());

        info!(
            campaign_id = %campaign.id,
            account_id = %account.id,
            recipients = batch.len(),
            remaining_quota = quota.remaining,
            "Campaign prepared for sending"
        );

        Ok(PreparedSend {
            campaign,
            batch,
            cancel,
        })
    }

    /// Run the send loop of a prepared campaign
    pub async fn execute(&self, prepared: PreparedSend) -> Result<SendReport> {
        let account_id = prepared.campaign.account_id;
        let lock = self.account_locks.get(account_id);
        let result = {
            let _guard = lock.lock().await;
            self.run_batch(prepared).await
        };
        self.account_locks.release(account_id, lock);
        result
    }

    async fn run_batch(&self, prepared: PreparedSend) -> Result<SendReport> {
        let PreparedSend {
            campaign,
            mut batch,
            cancel,
        } = prepared;

        let outcome = self.send_loop(&campaign, &mut batch, &cancel).await;

        self.cancellations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&campaign.id);

        let (progress, failure) = match outcome {
            Ok(progress) => (progress, None),
            Err((progress, e)) => (progress, Some(e)),
        };

        let finished = self.finish(&campaign, batch.len(), &progress).await;
        match (failure, finished) {
            (Some(e), finished) => {
                error!(campaign_id = %campaign.id, "Campaign aborted: {}", e);
                if let Err(finish_err) = finished {
                    error!(
                        campaign_id = %campaign.id,
                        "Completing aborted campaign failed: {}",
                        finish_err
                    );
                }
                Err(e)
            }
            (None, Err(e)) => Err(e),
            (None, Ok(report)) => Ok(report),
        }
    }

    async fn send_loop(
        &self,
        campaign: &EmailCampaign,
        batch: &mut Vec<(EmailContact, Option<Variant>)>,
        cancel: &CancellationToken,
    ) -> std::result::Result<Progress, (Progress, Error)> {
        let mut progress = Progress::default();

        let account = match self.repos.accounts.get(campaign.account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                return Err((progress, Error::NotFound("Sending account not found".to_string())))
            }
            Err(e) => return Err((progress, e)),
        };

        // Another campaign on this account may have used quota since prepare
        let quota = self.quota(&account);
        if batch.len() > quota.remaining as usize {
            warn!(
                campaign_id = %campaign.id,
                remaining = quota.remaining,
                "Batch trimmed to the remaining daily quota"
            );
            batch.truncate(quota.remaining as usize);
        }

        let now = Utc::now();
        let pace = sending_pace(account.created_at, now);
        let endpoint = SmtpEndpoint::from(&account);

        for (idx, (contact, variant)) in batch.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(campaign_id = %campaign.id, sent = progress.sent, "Campaign cancelled mid-send");
                progress.cancelled = true;
                break;
            }

            if idx > 0 && self.settings.pacing_enabled {
                let delay = if idx % pace.batch_size == 0 {
                    pace.batch_delay()
                } else {
                    pace.per_email_delay()
                };
                tokio::time::sleep(delay).await;
            }

            progress.attempted += 1;
            match self
                .send_one(campaign, &account, &endpoint, contact, *variant)
                .await
            {
                Ok(true) => {
                    progress.sent += 1;
                    if *variant == Some(Variant::B) {
                        progress.sent_b += 1;
                    } else {
                        progress.sent_a += 1;
                    }
                }
                Ok(false) => progress.failed += 1,
                Err(e) => return Err((progress, e)),
            }
        }

        Ok(progress)
    }

    /// One recipient. `Ok(false)` is a transport failure, `Err` is persistence.
    async fn send_one(
        &self,
        campaign: &EmailCampaign,
        account: &EmailAccount,
        endpoint: &SmtpEndpoint,
        contact: &EmailContact,
        variant: Option<Variant>,
    ) -> Result<bool> {
        let send = self
            .repos
            .sends
            .create(campaign.id, contact.id, variant)
            .await?;

        let content = self.personalizer.render(campaign, contact, send.id, variant);
        let message = OutboundMessage {
            endpoint: endpoint.clone(),
            from_email: account.email.clone(),
            from_name: account.from_name.clone(),
            to: contact.email.clone(),
            subject: content.subject,
            html: content.html,
            text: content.text,
            list_unsubscribe: Some(content.unsubscribe_url),
        };

        let result = self.transport.send(&message).await;
        match (result.success, result.message_id) {
            (true, Some(message_id)) => {
                self.repos
                    .sends
                    .mark_sent(send.id, &message_id, Utc::now())
                    .await?;
                let metadata = match variant {
                    Some(v) => serde_json::json!({ "variant": v.as_str() }),
                    None => serde_json::json!({}),
                };
                self.repos
                    .events
                    .append(NewEvent::new(send.id, EventType::Sent).with_metadata(metadata))
                    .await?;
                self.metrics.sends.with_label_values(&["sent"]).inc();
                debug!(send_id = %send.id, to = %contact.email, "Message sent");
                Ok(true)
            }
            (success, _) => {
                let error = match (success, result.error) {
                    (_, Some(error)) => error,
                    (true, None) => "Transport returned no Message-ID".to_string(),
                    (false, None) => "Unknown transport error".to_string(),
                };
                self.repos.sends.mark_failed(send.id, &error).await?;
                self.metrics.sends.with_label_values(&["failed"]).inc();
                warn!(send_id = %send.id, to = %contact.email, "Send failed: {}", error);
                Ok(false)
            }
        }
    }

    /// Record usage and move the campaign to its terminal status. The
    /// campaign is completed even when the send counter cannot be updated;
    /// that error is returned afterwards.
    async fn finish(
        &self,
        campaign: &EmailCampaign,
        recipients: usize,
        progress: &Progress,
    ) -> Result<SendReport> {
        let sent = progress.sent as i32;

        let mut recorded: Result<()> = Ok(());
        if sent > 0 {
            if let Err(e) = self
                .repos
                .accounts
                .record_sends(campaign.account_id, sent, Utc::now())
                .await
            {
                error!(account_id = %campaign.account_id, sent, "Recording sends failed: {}", e);
                recorded = Err(e);
            }
            if let Err(e) = self.usage.deduct(campaign.owner_id, progress.sent as u32).await {
                warn!(owner_id = %campaign.owner_id, "Usage deduction failed: {}", e);
            }
        }

        let status = if progress.attempted > 0 && progress.sent == 0 {
            CampaignStatus::Failed
        } else {
            CampaignStatus::Sent
        };
        let ab_winner = campaign
            .is_ab_test()
            .then(|| interim_winner(progress.sent_a, progress.sent_b));

        if !self
            .repos
            .campaigns
            .complete(campaign.id, status, sent, ab_winner)
            .await?
        {
            warn!(campaign_id = %campaign.id, "Campaign was no longer SENDING at completion");
        }

        self.metrics
            .campaigns
            .with_label_values(&[status.as_str()])
            .inc();
        info!(
            campaign_id = %campaign.id,
            status = %status,
            sent = progress.sent,
            failed = progress.failed,
            "Campaign finished"
        );
        recorded?;

        Ok(SendReport {
            campaign_id: campaign.id,
            status,
            recipients,
            attempted: progress.attempted,
            sent: progress.sent,
            failed: progress.failed,
            cancelled: progress.cancelled,
            ab_winner,
        })
    }

    /// Cancel a campaign. DRAFT/SCHEDULED become CANCELLED; a SENDING
    /// campaign stops before its next send. Returns the resulting status.
    ///
    /// CANCELLED is not reachable from SENDING: a stopped campaign completes
    /// as SENT with whatever was sent, including zero sends when the stop
    /// lands before the first one.
    pub async fn cancel(&self, owner_id: OwnerId, campaign_id: CampaignId) -> Result<CampaignStatus> {
        let campaign = self
            .repos
            .campaigns
            .get_for_owner(owner_id, campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound("Campaign not found".to_string()))?;

        match campaign.status {
            CampaignStatus::Draft | CampaignStatus::Scheduled => {
                if self
                    .repos
                    .campaigns
                    .transition(campaign.id, campaign.status, CampaignStatus::Cancelled)
                    .await?
                {
                    info!(campaign_id = %campaign.id, "Campaign cancelled");
                    return Ok(CampaignStatus::Cancelled);
                }
                // Lost a race with a send; report where it ended up
                let current = self.repos.campaigns.get(campaign.id).await?;
                Ok(current.map_or(campaign.status, |c| c.status))
            }
            CampaignStatus::Sending => {
                let token = self
                    .cancellations
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(&campaign.id)
                    .cloned();
                if let Some(token) = token {
                    info!(campaign_id = %campaign.id, "Stop requested for sending campaign");
                    token.cancel();
                }
                Ok(CampaignStatus::Sending)
            }
            status => Ok(status),
        }
    }

    /// Decide the A/B winner by open rate once enough opens are recorded
    pub async fn recompute_ab_winner(
        &self,
        owner_id: OwnerId,
        campaign_id: CampaignId,
    ) -> Result<AbTestResult> {
        let campaign = self
            .repos
            .campaigns
            .get_for_owner(owner_id, campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound("Campaign not found".to_string()))?;

        if !campaign.is_ab_test() {
            return Err(Error::Validation("Campaign is not an A/B test".to_string()));
        }

        let variants = self.repos.sends.variant_stats(campaign.id).await?;
        let decided = decide_winner(&variants, self.settings.min_opens_for_winner);

        if let Some(winner) = decided {
            self.repos.campaigns.set_ab_winner(campaign.id, winner).await?;
            info!(campaign_id = %campaign.id, winner = %winner, "A/B winner decided");
        }

        Ok(AbTestResult {
            campaign_id: campaign.id,
            winner: decided.or(campaign.ab_winner),
            decided: decided.is_some(),
            variants,
        })
    }

    pub async fn campaign_detail(
        &self,
        owner_id: OwnerId,
        campaign_id: CampaignId,
    ) -> Result<CampaignDetail> {
        let campaign = self
            .repos
            .campaigns
            .get_for_owner(owner_id, campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound("Campaign not found".to_string()))?;

        let variants = if campaign.is_ab_test() {
            self.repos.sends.variant_stats(campaign.id).await?
        } else {
            Vec::new()
        };

        Ok(CampaignDetail { campaign, variants })
    }

    pub async fn account_health(&self, owner_id: OwnerId, account_id: AccountId) -> Result<AccountHealth> {
        let account = self
            .repos
            .accounts
            .get_for_owner(owner_id, account_id)
            .await?
            .ok_or_else(|| Error::NotFound("Sending account not found".to_string()))?;

        let now = Utc::now();
        let warmup = effective_daily_limit(account.daily_limit.max(0) as u32, account.created_at, now);

        Ok(AccountHealth {
            account_id: account.id,
            health: self.health_report(&account).await?,
            warmup,
            quota: DailyQuota::for_account(&account, warmup, now),
            pace: sending_pace(account.created_at, now),
        })
    }

    async fn health_report(&self, account: &EmailAccount) -> Result<HealthReport> {
        let recent = self
            .repos
            .campaigns
            .recent_stats(account.id, self.settings.lookback_campaigns)
            .await?;
        Ok(self.monitor.check_health(&recent))
    }

    fn quota(&self, account: &EmailAccount) -> DailyQuota {
        let now = Utc::now();
        let limit = effective_daily_limit(account.daily_limit.max(0) as u32, account.created_at, now);
        DailyQuota::for_account(account, limit, now)
    }

    fn check_content(&self, campaign: &EmailCampaign) -> Result<()> {
        let subjects = std::iter::once(campaign.subject.as_str()).chain(campaign.subject_b.as_deref());
        for subject in subjects {
            let report = self.analyzer.analyze(subject, &campaign.html_content);
            if report.is_blocked() {
                self.reject("spam");
                return Err(Error::PolicyBlocked(format!(
                    "Content spam score {:.1} is too high to send",
                    report.score
                )));
            }
        }
        Ok(())
    }

    fn reject(&self, gate: &str) {
        self.metrics.policy_rejections.with_label_values(&[gate]).inc();
    }
}

#[derive(Debug, Default)]
struct Progress {
    attempted: usize,
    sent: usize,
    failed: usize,
    sent_a: usize,
    sent_b: usize,
    cancelled: bool,
}
