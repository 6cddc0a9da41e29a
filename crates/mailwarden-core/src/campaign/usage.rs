//! Usage metering hook for billing

use async_trait::async_trait;
use mailwarden_common::types::OwnerId;
use mailwarden_common::Result;
use tracing::info;

/// Receives the number of messages an owner sent
#[async_trait]
pub trait UsageMeter: Send + Sync {
    async fn deduct(&self, owner_id: OwnerId, count: u32) -> Result<()>;
}

/// Meter that only logs; used when no billing backend is attached
#[derive(Debug, Default)]
pub struct LoggingUsageMeter;

#[async_trait]
impl UsageMeter for LoggingUsageMeter {
    async fn deduct(&self, owner_id: OwnerId, count: u32) -> Result<()> {
        info!(owner_id = %owner_id, count, "Usage recorded");
        Ok(())
    }
}
