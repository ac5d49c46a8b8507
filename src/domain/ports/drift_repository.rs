//! Repository port for drift records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::DriftRecord;

/// Append-only drift history. Only a contract evolve resets it.
#[async_trait]
pub trait DriftRepository: Send + Sync {
    async fn append(&self, record: &DriftRecord) -> DomainResult<()>;

    /// Whether this capture was already evaluated against this contract.
    async fn exists(&self, contract_id: Uuid, capture_id: Uuid) -> DomainResult<bool>;

    /// Records created at or after `since`, oldest first.
    async fn list_since(&self, since: DateTime<Utc>) -> DomainResult<Vec<DriftRecord>>;

    /// Most recent records for one contract.
    async fn list_for_contract(&self, contract_id: Uuid, limit: usize)
        -> DomainResult<Vec<DriftRecord>>;
}
