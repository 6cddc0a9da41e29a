//! Contact repository
//!
//! Every status change is a single conditional statement guarded by
//! `status = 'active'`, so concurrent webhooks for the same contact
//! cannot suppress it twice.

use crate::db::DatabasePool;
use crate::models::{ContactStatus, EmailContact, NewContact};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailwarden_common::types::{normalize_email, ContactId, ListId};
use mailwarden_common::{Error, Result};
use uuid::Uuid;

/// Contact repository trait
#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// Insert a contact and bump the list's counters
    async fn create(&self, input: NewContact) -> Result<EmailContact>;
    async fn get(&self, id: ContactId) -> Result<Option<EmailContact>>;

    /// ACTIVE contacts of a list in list order
    async fn active_in_list(&self, list_id: ListId) -> Result<Vec<EmailContact>>;

    /// ACTIVE contacts with this (normalized) address across all lists
    async fn active_by_email(&self, email: &str) -> Result<Vec<EmailContact>>;

    /// ACTIVE -> `status`. Returns whether this call made the change.
    async fn suppress(&self, id: ContactId, status: ContactStatus) -> Result<bool>;

    /// Atomic `soft_bounce_count += 1` on an ACTIVE contact; `None` if it
    /// is no longer active
    async fn increment_soft_bounce(&self, id: ContactId) -> Result<Option<i32>>;

    async fn reset_soft_bounces(&self, id: ContactId) -> Result<()>;
    async fn record_open(&self, id: ContactId, at: DateTime<Utc>) -> Result<()>;
    async fn record_click(&self, id: ContactId, at: DateTime<Utc>) -> Result<()>;
}

/// Database contact repository
pub struct DbContactRepository {
    pool: DatabasePool,
}

impl DbContactRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactRepository for DbContactRepository {
    async fn create(&self, input: NewContact) -> Result<EmailContact> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let contact = sqlx::query_as::<_, EmailContact>(
            r#"
            INSERT INTO email_contacts (
                id, list_id, email, first_name, last_name, attributes, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'active')
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.list_id)
        .bind(normalize_email(&input.email))
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(input.attributes.unwrap_or_else(|| serde_json::json!({})))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE email_lists SET
                contact_count = contact_count + 1,
                active_count = active_count + 1
            WHERE id = $1
            "#,
        )
        .bind(input.list_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(contact)
    }

    async fn get(&self, id: ContactId) -> Result<Option<EmailContact>> {
        sqlx::query_as::<_, EmailContact>("SELECT * FROM email_contacts WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn active_in_list(&self, list_id: ListId) -> Result<Vec<EmailContact>> {
        sqlx::query_as::<_, EmailContact>(
            r#"
            SELECT * FROM email_contacts
            WHERE list_id = $1 AND status = 'active'
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(list_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn active_by_email(&self, email: &str) -> Result<Vec<EmailContact>> {
        sqlx::query_as::<_, EmailContact>(
            "SELECT * FROM email_contacts WHERE email = $1 AND status = 'active'",
        )
        .bind(normalize_email(email))
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn suppress(&self, id: ContactId, status: ContactStatus) -> Result<bool> {
        ContactStatus::Active.transition(status)?;

        let result = sqlx::query(
            r#"
            UPDATE email_contacts SET
                status = $2,
                unsubscribed_at = CASE WHEN $2 = 'unsubscribed' THEN NOW() ELSE unsubscribed_at END
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_soft_bounce(&self, id: ContactId) -> Result<Option<i32>> {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE email_contacts SET soft_bounce_count = soft_bounce_count + 1
            WHERE id = $1 AND status = 'active'
            RETURNING soft_bounce_count
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(row.map(|r| r.0))
    }

    async fn reset_soft_bounces(&self, id: ContactId) -> Result<()> {
        sqlx::query("UPDATE email_contacts SET soft_bounce_count = 0 WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn record_open(&self, id: ContactId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE email_contacts SET open_count = open_count + 1, last_open_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn record_click(&self, id: ContactId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE email_contacts SET click_count = click_count + 1, last_click_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
