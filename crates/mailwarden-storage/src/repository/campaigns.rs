//! Campaign repository

use crate::db::DatabasePool;
use crate::models::{
    CampaignCounter, CampaignDeliveryStats, CampaignStatus, EmailCampaign, NewCampaign, Variant,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailwarden_common::types::{AccountId, CampaignId, OwnerId};
use mailwarden_common::{Error, Result};
use uuid::Uuid;

/// Campaign repository trait
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn create(&self, input: NewCampaign) -> Result<EmailCampaign>;
    async fn get(&self, id: CampaignId) -> Result<Option<EmailCampaign>>;
    async fn get_for_owner(
        &self,
        owner_id: OwnerId,
        id: CampaignId,
    ) -> Result<Option<EmailCampaign>>;

    /// Compare-and-set status change. Returns false when the row was no
    /// longer in `from`. Entering SENDING stamps `sent_at`.
    async fn transition(
        &self,
        id: CampaignId,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<bool>;

    /// Move a SENDING campaign to its terminal status, adding `sent` to
    /// `total_sent` and stamping `completed_at`
    async fn complete(
        &self,
        id: CampaignId,
        status: CampaignStatus,
        sent: i32,
        ab_winner: Option<Variant>,
    ) -> Result<bool>;

    async fn increment(&self, id: CampaignId, counter: CampaignCounter) -> Result<()>;
    async fn set_ab_winner(&self, id: CampaignId, winner: Variant) -> Result<()>;

    /// Totals of the account's most recently completed campaigns
    async fn recent_stats(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<CampaignDeliveryStats>>;

    /// SCHEDULED campaigns whose time has come, oldest first
    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<EmailCampaign>>;
}

/// Database campaign repository
pub struct DbCampaignRepository {
    pool: DatabasePool,
}

impl DbCampaignRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for DbCampaignRepository {
    async fn create(&self, input: NewCampaign) -> Result<EmailCampaign> {
        let id = Uuid::now_v7();
        let status = if input.scheduled_at.is_some() {
            CampaignStatus::Scheduled
        } else {
            CampaignStatus::Draft
        };

        sqlx::query_as::<_, EmailCampaign>(
            r#"
            INSERT INTO email_campaigns (
                id, owner_id, account_id, list_id, name, subject, subject_b,
                ab_split_percent, html_content, text_content, status, scheduled_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.owner_id)
        .bind(input.account_id)
        .bind(input.list_id)
        .bind(&input.name)
        .bind(&input.subject)
        .bind(&input.subject_b)
        .bind(input.ab_split_percent)
        .bind(&input.html_content)
        .bind(&input.text_content)
        .bind(status.as_str())
        .bind(input.scheduled_at)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: CampaignId) -> Result<Option<EmailCampaign>> {
        sqlx::query_as::<_, EmailCampaign>("SELECT * FROM email_campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get_for_owner(
        &self,
        owner_id: OwnerId,
        id: CampaignId,
    ) -> Result<Option<EmailCampaign>> {
        sqlx::query_as::<_, EmailCampaign>(
            "SELECT * FROM email_campaigns WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn transition(
        &self,
        id: CampaignId,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<bool> {
        from.transition(to)?;

        let result = sqlx::query(
            r#"
            UPDATE email_campaigns SET
                status = $3,
                sent_at = CASE WHEN $3 = 'sending' THEN NOW() ELSE sent_at END
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete(
        &self,
        id: CampaignId,
        status: CampaignStatus,
        sent: i32,
        ab_winner: Option<Variant>,
    ) -> Result<bool> {
        CampaignStatus::Sending.transition(status)?;

        let result = sqlx::query(
            r#"
            UPDATE email_campaigns SET
                status = $2,
                total_sent = total_sent + $3,
                completed_at = NOW(),
                ab_winner = COALESCE($4, ab_winner)
            WHERE id = $1 AND status = 'sending'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(sent)
        .bind(ab_winner.map(|v| v.as_str()))
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment(&self, id: CampaignId, counter: CampaignCounter) -> Result<()> {
        // Column names come from a closed enum, never from input.
        let sql = format!(
            "UPDATE email_campaigns SET {col} = {col} + 1 WHERE id = $1",
            col = counter.column()
        );

        sqlx::query(&sql)
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn set_ab_winner(&self, id: CampaignId, winner: Variant) -> Result<()> {
        sqlx::query("UPDATE email_campaigns SET ab_winner = $2 WHERE id = $1")
            .bind(id)
            .bind(winner.as_str())
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn recent_stats(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<CampaignDeliveryStats>> {
        sqlx::query_as::<_, CampaignDeliveryStats>(
            r#"
            SELECT total_sent, total_bounced, total_complaints
            FROM email_campaigns
            WHERE account_id = $1 AND status IN ('sent', 'failed')
            ORDER BY completed_at DESC NULLS LAST
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(limit as i64)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<EmailCampaign>> {
        sqlx::query_as::<_, EmailCampaign>(
            r#"
            SELECT * FROM email_campaigns
            WHERE status = 'scheduled'
              AND scheduled_at IS NOT NULL
              AND scheduled_at <= $1
            ORDER BY scheduled_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
