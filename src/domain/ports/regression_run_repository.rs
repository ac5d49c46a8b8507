//! Repository port for regression run history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::RegressionRun;

#[async_trait]
pub trait RegressionRunRepository: Send + Sync {
    async fn append(&self, run: &RegressionRun) -> DomainResult<()>;

    async fn latest(&self) -> DomainResult<Option<RegressionRun>>;

    /// Runs started at or after `since`, oldest first.
    async fn list_since(&self, since: DateTime<Utc>) -> DomainResult<Vec<RegressionRun>>;
}
