//! Repository port for the improvement cycle audit trail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{HumanCheckpoint, ImprovementCycle};

#[async_trait]
pub trait CycleRepository: Send + Sync {
    /// Append a finished cycle. Cycles are never updated.
    async fn append(&self, cycle: &ImprovementCycle) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<ImprovementCycle>>;

    /// Most recent cycles first.
    async fn list(&self, limit: usize) -> DomainResult<Vec<ImprovementCycle>>;

    /// Committed cycles finished after `since` (all when `None`).
    async fn count_committed_since(&self, since: Option<DateTime<Utc>>) -> DomainResult<u32>;

    async fn record_checkpoint(&self, checkpoint: &HumanCheckpoint) -> DomainResult<()>;

    async fn latest_checkpoint(&self) -> DomainResult<Option<HumanCheckpoint>>;
}
