//! Sending account repository

use crate::db::DatabasePool;
use crate::models::{EmailAccount, NewAccount};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailwarden_common::types::{AccountId, OwnerId};
use mailwarden_common::{Error, Result};
use uuid::Uuid;

/// Account repository trait
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn create(&self, input: NewAccount) -> Result<EmailAccount>;
    async fn get(&self, id: AccountId) -> Result<Option<EmailAccount>>;
    async fn get_for_owner(&self, owner_id: OwnerId, id: AccountId)
        -> Result<Option<EmailAccount>>;

    /// Add `count` sends to the rolling 24h counter in one statement.
    /// A window older than 24h at `now` restarts at `count`.
    async fn record_sends(&self, id: AccountId, count: i32, now: DateTime<Utc>)
        -> Result<EmailAccount>;
}

/// Database account repository
pub struct DbAccountRepository {
    pool: DatabasePool,
}

impl DbAccountRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for DbAccountRepository {
    async fn create(&self, input: NewAccount) -> Result<EmailAccount> {
        let id = Uuid::now_v7();
        let created_at = input.created_at.unwrap_or_else(Utc::now);

        sqlx::query_as::<_, EmailAccount>(
            r#"
            INSERT INTO email_accounts (
                id, owner_id, email, from_name, smtp_host, smtp_port, smtp_username,
                smtp_password, smtp_security, daily_limit, sent_today, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, $11)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.owner_id)
        .bind(input.email.trim().to_lowercase())
        .bind(&input.from_name)
        .bind(&input.smtp_host)
        .bind(input.smtp_port)
        .bind(&input.smtp_username)
        .bind(&input.smtp_password)
        .bind(input.smtp_security.as_str())
        .bind(input.daily_limit)
        .bind(created_at)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: AccountId) -> Result<Option<EmailAccount>> {
        sqlx::query_as::<_, EmailAccount>("SELECT * FROM email_accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get_for_owner(
        &self,
        owner_id: OwnerId,
        id: AccountId,
    ) -> Result<Option<EmailAccount>> {
        sqlx::query_as::<_, EmailAccount>(
            "SELECT * FROM email_accounts WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn record_sends(
        &self,
        id: AccountId,
        count: i32,
        now: DateTime<Utc>,
    ) -> Result<EmailAccount> {
        sqlx::query_as::<_, EmailAccount>(
            r#"
            UPDATE email_accounts SET
                sent_today = CASE
                    WHEN last_reset_at IS NULL OR last_reset_at <= $3 - INTERVAL '24 hours'
                    THEN $2
                    ELSE sent_today + $2
                END,
                last_reset_at = CASE
                    WHEN last_reset_at IS NULL OR last_reset_at <= $3 - INTERVAL '24 hours'
                    THEN $3
                    ELSE last_reset_at
                END
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(count)
        .bind(now)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?
        .ok_or_else(|| Error::NotFound(format!("Account {} not found", id)))
    }
}
