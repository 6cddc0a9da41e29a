//! Scheduled campaign worker - starts SCHEDULED campaigns once they are due

use super::orchestrator::CampaignOrchestrator;
use chrono::{DateTime, Utc};
use mailwarden_common::{Error, Result};
use mailwarden_storage::Repositories;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Polls for due campaigns and hands them to the orchestrator
pub struct CampaignScheduler {
    repos: Repositories,
    orchestrator: Arc<CampaignOrchestrator>,
    poll_interval: Duration,
}

impl CampaignScheduler {
    pub fn new(repos: Repositories, orchestrator: Arc<CampaignOrchestrator>) -> Self {
        Self {
            repos,
            orchestrator,
            poll_interval: Duration::from_secs(30),
        }
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval = Duration::from_secs(secs.max(1));
        self
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = interval(self.poll_interval);

        info!(
            "Campaign scheduler started (interval: {}s)",
            self.poll_interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Campaign scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once(Utc::now()).await {
                        error!("Error starting scheduled campaigns: {}", e);
                    }
                }
            }
        }
    }

    /// Start every campaign due at `now`. Campaigns refused by a policy gate
    /// stay SCHEDULED and are retried on the next poll.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<Vec<JoinHandle<()>>> {
        let due = self.repos.campaigns.due_scheduled(now).await?;
        let mut started = Vec::new();

        for campaign in due {
            let prepared = match self.orchestrator.prepare(campaign.owner_id, campaign.id).await {
                Ok(prepared) => prepared,
                Err(Error::PolicyBlocked(reason)) => {
                    warn!(campaign_id = %campaign.id, "Scheduled campaign held back: {}", reason);
                    continue;
                }
                Err(e) => {
                    error!(campaign_id = %campaign.id, "Failed to start scheduled campaign: {}", e);
                    continue;
                }
            };

            info!(
                campaign_id = %campaign.id,
                recipients = prepared.recipients(),
                "Starting scheduled campaign"
            );

            let orchestrator = self.orchestrator.clone();
            started.push(tokio::spawn(async move {
                let campaign_id = prepared.campaign_id();
                if let Err(e) = orchestrator.execute(prepared).await {
                    error!(campaign_id = %campaign_id, "Scheduled campaign failed: {}", e);
                }
            }));
        }

        Ok(started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::LoggingUsageMeter;
    use crate::metrics::Metrics;
    use crate::testing::{FixtureBuilder, ScriptedTransport};
    use chrono::Duration as ChronoDuration;
    use mailwarden_storage::{AccountRepository, CampaignRepository, CampaignStatus, NewCampaign};
    use pretty_assertions::assert_eq;

    async fn scheduled_fixture(
        daily_limit: i32,
    ) -> (crate::testing::Fixture, CampaignScheduler, mailwarden_storage::EmailCampaign) {
        let f = FixtureBuilder::new().contacts(3).daily_limit(daily_limit).build().await;
        let campaign = f
            .repos
            .campaigns
            .create(NewCampaign {
                owner_id: f.campaign.owner_id,
                account_id: f.account.id,
                list_id: f.list.id,
                name: "Scheduled".to_string(),
                subject: "Weekly digest".to_string(),
                subject_b: None,
                ab_split_percent: None,
                html_content: "<html><body><p>Digest</p></body></html>".to_string(),
                text_content: None,
                scheduled_at: Some(Utc::now() - ChronoDuration::minutes(1)),
            })
            .await
            .unwrap();
        assert_eq!(campaign.status, CampaignStatus::Scheduled);

        let orchestrator = CampaignOrchestrator::new(
            f.repos.clone(),
            Arc::new(ScriptedTransport::default()),
            Arc::new(LoggingUsageMeter),
            &f.config,
            Metrics::new().unwrap(),
        )
        .unwrap();
        let scheduler = CampaignScheduler::new(f.repos.clone(), Arc::new(orchestrator));
        (f, scheduler, campaign)
    }

    #[tokio::test]
    async fn test_due_campaign_is_sent() {
        let (f, scheduler, campaign) = scheduled_fixture(1000).await;

        let handles = scheduler.run_once(Utc::now()).await.unwrap();
        assert_eq!(handles.len(), 1);
        for handle in handles {
            handle.await.unwrap();
        }

        let campaign = f.repos.campaigns.get(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Sent);
        assert_eq!(campaign.total_sent, 3);
    }

    #[tokio::test]
    async fn test_future_campaign_waits() {
        let (f, scheduler, campaign) = scheduled_fixture(1000).await;

        let handles = scheduler
            .run_once(Utc::now() - ChronoDuration::hours(1))
            .await
            .unwrap();
        assert!(handles.is_empty());

        let campaign = f.repos.campaigns.get(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_blocked_campaign_stays_scheduled() {
        let (f, scheduler, campaign) = scheduled_fixture(2).await;
        f.repos
            .accounts
            .record_sends(f.account.id, 2, Utc::now())
            .await
            .unwrap();

        let handles = scheduler.run_once(Utc::now()).await.unwrap();
        assert!(handles.is_empty());

        let campaign = f.repos.campaigns.get(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_f, scheduler, _campaign) = scheduled_fixture(1000).await;
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        scheduler.run(shutdown).await;
    }
}
