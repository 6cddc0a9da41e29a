//! Contact list repository

use crate::db::DatabasePool;
use crate::models::{EmailList, NewList};
use async_trait::async_trait;
use mailwarden_common::types::{ListId, OwnerId};
use mailwarden_common::{Error, Result};
use uuid::Uuid;

/// List repository trait
#[async_trait]
pub trait ListRepository: Send + Sync {
    async fn create(&self, input: NewList) -> Result<EmailList>;
    async fn get(&self, id: ListId) -> Result<Option<EmailList>>;
    async fn get_for_owner(&self, owner_id: OwnerId, id: ListId) -> Result<Option<EmailList>>;

    /// `active_count -= 1`, floored at zero
    async fn decrement_active(&self, id: ListId) -> Result<()>;
}

/// Database list repository
pub struct DbListRepository {
    pool: DatabasePool,
}

impl DbListRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ListRepository for DbListRepository {
    async fn create(&self, input: NewList) -> Result<EmailList> {
        sqlx::query_as::<_, EmailList>(
            r#"
            INSERT INTO email_lists (id, owner_id, name, contact_count, active_count)
            VALUES ($1, $2, $3, 0, 0)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.owner_id)
        .bind(&input.name)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: ListId) -> Result<Option<EmailList>> {
        sqlx::query_as::<_, EmailList>("SELECT * FROM email_lists WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get_for_owner(&self, owner_id: OwnerId, id: ListId) -> Result<Option<EmailList>> {
        sqlx::query_as::<_, EmailList>(
            "SELECT * FROM email_lists WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn decrement_active(&self, id: ListId) -> Result<()> {
        sqlx::query(
            "UPDATE email_lists SET active_count = GREATEST(active_count - 1, 0) WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
