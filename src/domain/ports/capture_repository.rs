//! Repository port for the capture log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Capture, CaptureFlagCounts};

/// Durable log of live outputs.
#[async_trait]
pub trait CaptureRepository: Send + Sync {
    /// Insert a capture. Re-inserting an existing id is a no-op.
    async fn insert(&self, capture: &Capture) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Capture>>;

    /// Most recent captures first.
    async fn list_recent(&self, limit: usize) -> DomainResult<Vec<Capture>>;

    /// Captures bound to a contract, captured at or after `since`, oldest first.
    async fn list_with_contract_since(&self, since: DateTime<Utc>) -> DomainResult<Vec<Capture>>;

    async fn mark_reviewed(&self, id: Uuid) -> DomainResult<()>;

    /// Mark a capture promoted and link it to the fixture created from it.
    async fn link_fixture(&self, id: Uuid, fixture_id: Uuid) -> DomainResult<()>;

    /// Quality flag counts for captures in `[from, to)`.
    async fn flag_counts_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DomainResult<CaptureFlagCounts>;

    /// Delete unpromoted captures older than their retention cutoff.
    /// Returns the number of captures deleted.
    async fn prune(
        &self,
        clean_before: DateTime<Utc>,
        flagged_before: DateTime<Utc>,
    ) -> DomainResult<u64>;
}
