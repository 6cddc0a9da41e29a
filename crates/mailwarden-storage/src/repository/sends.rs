//! Send repository

use crate::db::DatabasePool;
use crate::models::{normalize_message_id, EmailSend, SendStatus, Variant, VariantStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailwarden_common::types::{CampaignId, ContactId, SendId};
use mailwarden_common::{Error, Result};
use uuid::Uuid;

/// Send repository trait
#[async_trait]
pub trait SendRepository: Send + Sync {
    /// Create a QUEUED send
    async fn create(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        variant: Option<Variant>,
    ) -> Result<EmailSend>;

    async fn get(&self, id: SendId) -> Result<Option<EmailSend>>;

    /// QUEUED -> SENT with the transport's Message-ID
    async fn mark_sent(&self, id: SendId, message_id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// QUEUED -> FAILED with the transport error
    async fn mark_failed(&self, id: SendId, error: &str) -> Result<bool>;

    /// Compare-and-set status change for feedback events. The timestamp
    /// column matching `to` is set on first entry only.
    async fn transition(
        &self,
        id: SendId,
        from: SendStatus,
        to: SendStatus,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<EmailSend>>;

    /// Most recent send of the contact whose status is in `statuses`
    /// (any status when empty)
    async fn latest_for_contact(
        &self,
        contact_id: ContactId,
        statuses: &[SendStatus],
    ) -> Result<Option<EmailSend>>;

    async fn list_for_campaign(&self, campaign_id: CampaignId) -> Result<Vec<EmailSend>>;

    /// Sent/opened/clicked counts per A/B variant
    async fn variant_stats(&self, campaign_id: CampaignId) -> Result<Vec<VariantStats>>;
}

/// Timestamp column stamped when a send enters `status`
pub(crate) fn timestamp_column(status: SendStatus) -> Option<&'static str> {
    match status {
        SendStatus::Sent => Some("sent_at"),
        SendStatus::Delivered => Some("delivered_at"),
        SendStatus::Bounced => Some("bounced_at"),
        SendStatus::Opened => Some("opened_at"),
        SendStatus::Clicked => Some("clicked_at"),
        SendStatus::Queued | SendStatus::Failed | SendStatus::Complained => None,
    }
}

/// Database send repository
pub struct DbSendRepository {
    pool: DatabasePool,
}

impl DbSendRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SendRepository for DbSendRepository {
    async fn create(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        variant: Option<Variant>,
    ) -> Result<EmailSend> {
        sqlx::query_as::<_, EmailSend>(
            r#"
            INSERT INTO email_sends (id, campaign_id, contact_id, variant, status)
            VALUES ($1, $2, $3, $4, 'queued')
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(campaign_id)
        .bind(contact_id)
        .bind(variant.map(|v| v.as_str()))
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: SendId) -> Result<Option<EmailSend>> {
        sqlx::query_as::<_, EmailSend>("SELECT * FROM email_sends WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_sent(&self, id: SendId, message_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE email_sends SET status = 'sent', message_id = $2, sent_at = $3
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(id)
        .bind(normalize_message_id(message_id))
        .bind(at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, id: SendId, error: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE email_sends SET status = 'failed', error = $2 WHERE id = $1 AND status = 'queued'",
        )
        .bind(id)
        .bind(error)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn transition(
        &self,
        id: SendId,
        from: SendStatus,
        to: SendStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        from.transition(to)?;

        let column = timestamp_column(to);
        let sql = match column {
            Some(col) => format!(
                "UPDATE email_sends SET status = $3, {col} = COALESCE({col}, $4) \
                 WHERE id = $1 AND status = $2",
                col = col
            ),
            None => "UPDATE email_sends SET status = $3 WHERE id = $1 AND status = $2".to_string(),
        };

        let mut query = sqlx::query(&sql)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str());
        if column.is_some() {
            query = query.bind(at);
        }

        let result = query
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<EmailSend>> {
        sqlx::query_as::<_, EmailSend>(
            "SELECT * FROM email_sends WHERE message_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(normalize_message_id(message_id))
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn latest_for_contact(
        &self,
        contact_id: ContactId,
        statuses: &[SendStatus],
    ) -> Result<Option<EmailSend>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();

        sqlx::query_as::<_, EmailSend>(
            r#"
            SELECT * FROM email_sends
            WHERE contact_id = $1
              AND (cardinality($2::text[]) = 0 OR status = ANY($2))
            ORDER BY sent_at DESC NULLS LAST, created_at DESC
            LIMIT 1
            "#,
        )
        .bind(contact_id)
        .bind(&statuses)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_for_campaign(&self, campaign_id: CampaignId) -> Result<Vec<EmailSend>> {
        sqlx::query_as::<_, EmailSend>(
            "SELECT * FROM email_sends WHERE campaign_id = $1 ORDER BY created_at ASC",
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn variant_stats(&self, campaign_id: CampaignId) -> Result<Vec<VariantStats>> {
        sqlx::query_as::<_, VariantStats>(
            r#"
            SELECT
                variant,
                COUNT(*) FILTER (WHERE status NOT IN ('queued', 'failed')) AS sent,
                COUNT(*) FILTER (WHERE opened_at IS NOT NULL) AS opened,
                COUNT(*) FILTER (WHERE clicked_at IS NOT NULL) AS clicked
            FROM email_sends
            WHERE campaign_id = $1 AND variant IS NOT NULL
            GROUP BY variant
            ORDER BY variant
            "#,
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
