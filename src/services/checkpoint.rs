//! Human checkpoint ledger.
//!
//! Every `interval` committed cycles a human has to acknowledge what changed
//! before the next cycle may start.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{HumanCheckpoint, ImprovementCycle};
use crate::domain::ports::CycleRepository;

/// Commits since the last human checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointStatus {
    pub committed_since: u32,
    pub interval: u32,
    pub last_checkpoint: Option<HumanCheckpoint>,
}

impl CheckpointStatus {
    pub fn required(&self) -> bool {
        self.committed_since >= self.interval
    }
}

#[derive(Clone)]
pub struct CheckpointLedger {
    cycles: Arc<dyn CycleRepository>,
    interval: u32,
}

impl CheckpointLedger {
    pub fn new(cycles: Arc<dyn CycleRepository>, interval: u32) -> Self {
        Self { cycles, interval }
    }

    pub async fn status(&self) -> DomainResult<CheckpointStatus> {
        let last_checkpoint = self.cycles.latest_checkpoint().await?;
        let committed_since = self
            .cycles
            .count_committed_since(last_checkpoint.as_ref().map(|c| c.acknowledged_at))
            .await?;
        Ok(CheckpointStatus {
            committed_since,
            interval: self.interval,
            last_checkpoint,
        })
    }

    /// Record a human review of the cycles committed so far.
    pub async fn acknowledge(
        &self,
        acknowledged_by: &str,
        note: Option<String>,
    ) -> DomainResult<HumanCheckpoint> {
        if acknowledged_by.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "checkpoint must name who acknowledged it".to_string(),
            ));
        }
        let checkpoint = HumanCheckpoint {
            id: Uuid::new_v4(),
            acknowledged_at: Utc::now(),
            acknowledged_by: acknowledged_by.trim().to_string(),
            note,
        };
        self.cycles.record_checkpoint(&checkpoint).await?;
        tracing::info!(by = %checkpoint.acknowledged_by, "Human checkpoint acknowledged");
        Ok(checkpoint)
    }

    /// Finished cycles, most recent first.
    pub async fn history(&self, limit: usize) -> DomainResult<Vec<ImprovementCycle>> {
        self.cycles.list(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteCycleRepository};

    #[test]
    fn test_required_at_interval() {
        let status = CheckpointStatus {
            committed_since: 5,
            interval: 5,
            last_checkpoint: None,
        };
        assert!(status.required());
        let status = CheckpointStatus {
            committed_since: 4,
            ..status
        };
        assert!(!status.required());
    }

    #[tokio::test]
    async fn test_acknowledge_requires_a_name() {
        let pool = create_migrated_test_pool().await.unwrap();
        let ledger = CheckpointLedger::new(Arc::new(SqliteCycleRepository::new(pool)), 5);
        assert!(matches!(
            ledger.acknowledge("  ", None).await,
            Err(DomainError::ValidationFailed(_))
        ));

        let checkpoint = ledger.acknowledge("dana", Some("looked fine".into())).await.unwrap();
        let status = ledger.status().await.unwrap();
        assert_eq!(status.last_checkpoint.map(|c| c.id), Some(checkpoint.id));
        assert_eq!(status.committed_since, 0);
    }
}
