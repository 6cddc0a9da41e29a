//! Repository layer for data access

pub mod accounts;
pub mod campaigns;
pub mod contacts;
pub mod events;
pub mod lists;
pub mod sends;

use crate::db::DatabasePool;
use crate::memory::MemoryStore;
use mailwarden_common::Result;
use std::sync::Arc;

// Re-export repository traits
pub use accounts::AccountRepository;
pub use campaigns::CampaignRepository;
pub use contacts::ContactRepository;
pub use events::EventRepository;
pub use lists::ListRepository;
pub use sends::SendRepository;

// Re-export database implementations
pub use accounts::DbAccountRepository;
pub use campaigns::DbCampaignRepository;
pub use contacts::DbContactRepository;
pub use events::DbEventRepository;
pub use lists::DbListRepository;
pub use sends::DbSendRepository;

/// Every repository the engine needs, behind trait objects so the
/// PostgreSQL and in-memory backends are interchangeable
#[derive(Clone)]
pub struct Repositories {
    pub accounts: Arc<dyn AccountRepository>,
    pub campaigns: Arc<dyn CampaignRepository>,
    pub lists: Arc<dyn ListRepository>,
    pub contacts: Arc<dyn ContactRepository>,
    pub sends: Arc<dyn SendRepository>,
    pub events: Arc<dyn EventRepository>,
    pool: Option<DatabasePool>,
}

impl Repositories {
    /// PostgreSQL-backed repositories sharing one pool
    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            accounts: Arc::new(DbAccountRepository::new(pool.clone())),
            campaigns: Arc::new(DbCampaignRepository::new(pool.clone())),
            lists: Arc::new(DbListRepository::new(pool.clone())),
            contacts: Arc::new(DbContactRepository::new(pool.clone())),
            sends: Arc::new(DbSendRepository::new(pool.clone())),
            events: Arc::new(DbEventRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Repositories over a shared in-memory store
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            accounts: store.clone(),
            campaigns: store.clone(),
            lists: store.clone(),
            contacts: store.clone(),
            sends: store.clone(),
            events: store,
            pool: None,
        }
    }

    /// Backend readiness; the in-memory store is always ready
    pub async fn health_check(&self) -> Result<()> {
        match &self.pool {
            Some(pool) => pool.health_check().await,
            None => Ok(()),
        }
    }
}
