//! Audit event repository

use crate::db::DatabasePool;
use crate::models::{EmailEvent, NewEvent};
use async_trait::async_trait;
use mailwarden_common::{Error, Result};
use uuid::Uuid;

/// Event repository trait. Events are never updated or deleted.
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn append(&self, input: NewEvent) -> Result<EmailEvent>;
}

/// Database event repository
pub struct DbEventRepository {
    pool: DatabasePool,
}

impl DbEventRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepository for DbEventRepository {
    async fn append(&self, input: NewEvent) -> Result<EmailEvent> {
        sqlx::query_as::<_, EmailEvent>(
            r#"
            INSERT INTO email_events (id, send_id, event_type, metadata)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.send_id)
        .bind(input.event_type.as_str())
        .bind(&input.metadata)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
