//! MailWarden Storage - Persistence for accounts, campaigns, contacts and sends
//!
//! Repository traits with a PostgreSQL implementation (sqlx) and an
//! in-memory implementation sharing the same conditional-update semantics.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;
