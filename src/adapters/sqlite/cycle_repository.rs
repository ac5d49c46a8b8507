//! SQLite implementation of the CycleRepository.
//!
//! Cycles are append-only. The full record is kept as JSON, with the fields
//! the report and checkpoint queries filter on mirrored into columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_json, parse_uuid, to_u32};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{HumanCheckpoint, ImprovementCycle};
use crate::domain::ports::CycleRepository;

#[derive(Clone)]
pub struct SqliteCycleRepository {
    pool: SqlitePool,
}

impl SqliteCycleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CycleRepository for SqliteCycleRepository {
    async fn append(&self, cycle: &ImprovementCycle) -> DomainResult<()> {
        let record = serde_json::to_string(cycle)?;
        let result = sqlx::query(
            r#"INSERT INTO improvement_cycles (id, started_at, finished_at, target_stage, outcome,
               score_before, score_after, regressions_count, improvements_count, diff_size, record)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(cycle.id.to_string())
        .bind(format_datetime(&cycle.started_at))
        .bind(format_datetime(&cycle.finished_at))
        .bind(&cycle.target_stage)
        .bind(cycle.outcome.as_str())
        .bind(cycle.score_before)
        .bind(cycle.score_after)
        .bind(i64::from(cycle.regressions_count))
        .bind(i64::from(cycle.improvements_count))
        .bind(i64::try_from(cycle.diff_size).unwrap_or(i64::MAX))
        .bind(&record)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DomainError::ValidationFailed(format!(
                    "cycle {} is already recorded",
                    cycle.id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<ImprovementCycle>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT record FROM improvement_cycles WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(record,)| parse_json(&record)).transpose()
    }

    async fn list(&self, limit: usize) -> DomainResult<Vec<ImprovementCycle>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT record FROM improvement_cycles ORDER BY finished_at DESC, rowid DESC LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|(record,)| parse_json(&record)).collect()
    }

    async fn count_committed_since(&self, since: Option<DateTime<Utc>>) -> DomainResult<u32> {
        let (count,): (i64,) = match since {
            Some(since) => {
                sqlx::query_as(
                    "SELECT COUNT(*) FROM improvement_cycles
                     WHERE outcome = 'committed' AND finished_at > ?",
                )
                .bind(format_datetime(&since))
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT COUNT(*) FROM improvement_cycles WHERE outcome = 'committed'",
                )
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(to_u32(count))
    }

    async fn record_checkpoint(&self, checkpoint: &HumanCheckpoint) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO human_checkpoints (id, acknowledged_at, acknowledged_by, note)
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(checkpoint.id.to_string())
        .bind(format_datetime(&checkpoint.acknowledged_at))
        .bind(&checkpoint.acknowledged_by)
        .bind(&checkpoint.note)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_checkpoint(&self) -> DomainResult<Option<HumanCheckpoint>> {
        let row: Option<CheckpointRow> = sqlx::query_as(
            "SELECT id, acknowledged_at, acknowledged_by, note FROM human_checkpoints
             ORDER BY acknowledged_at DESC, rowid DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.map(HumanCheckpoint::try_from).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct CheckpointRow {
    id: String,
    acknowledged_at: String,
    acknowledged_by: String,
    note: Option<String>,
}

impl TryFrom<CheckpointRow> for HumanCheckpoint {
    type Error = DomainError;

    fn try_from(row: CheckpointRow) -> Result<Self, Self::Error> {
        Ok(HumanCheckpoint {
            id: parse_uuid(&row.id)?,
            acknowledged_at: parse_datetime(&row.acknowledged_at)?,
            acknowledged_by: row.acknowledged_by,
            note: row.note,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{CycleOutcome, CyclePlan, RollbackReason};
    use chrono::Duration;

    fn cycle(outcome: CycleOutcome, finished_at: DateTime<Utc>) -> ImprovementCycle {
        let id = Uuid::new_v4();
        ImprovementCycle {
            id,
            started_at: finished_at - Duration::seconds(30),
            finished_at,
            target_stage: "echo_removal".into(),
            problem_statement: "echo leaks".into(),
            plan: CyclePlan {
                cycle_id: id,
                target_stage: "echo_removal".into(),
                problem_statement: "echo leaks".into(),
                proposed_approach: "tighten the echo filter".into(),
                affected_fixture_ids: vec![],
                estimated_diff_lines: 5,
            },
            diff_size: 4,
            score_before: 0.7,
            score_after: Some(0.75),
            regressions_count: 0,
            improvements_count: 1,
            outcome,
            rollback_reason: match outcome {
                CycleOutcome::Committed => None,
                CycleOutcome::RolledBack => Some(RollbackReason::RegressionDetected {
                    regressions: 1,
                }),
            },
            consumed_feedback_ids: vec![],
            checkpoint_required: false,
        }
    }

    #[tokio::test]
    async fn test_append_and_list_newest_first() {
        let repo = SqliteCycleRepository::new(create_migrated_test_pool().await.unwrap());
        let now = Utc::now();
        let older = cycle(CycleOutcome::RolledBack, now - Duration::minutes(5));
        let newer = cycle(CycleOutcome::Committed, now);
        repo.append(&older).await.unwrap();
        repo.append(&newer).await.unwrap();

        let listed = repo.list(10).await.unwrap();
        assert_eq!(listed[0].id, newer.id);
        assert_eq!(listed[1].rollback_reason, older.rollback_reason);
        assert!(repo.get(older.id).await.unwrap().is_some());
        assert!(repo.append(&older).await.is_err());
    }

    #[tokio::test]
    async fn test_committed_count_resets_at_checkpoint() {
        let repo = SqliteCycleRepository::new(create_migrated_test_pool().await.unwrap());
        let now = Utc::now();
        for i in 0..3 {
            repo.append(&cycle(CycleOutcome::Committed, now - Duration::minutes(10 - i)))
                .await
                .unwrap();
        }
        repo.append(&cycle(CycleOutcome::RolledBack, now)).await.unwrap();
        assert_eq!(repo.count_committed_since(None).await.unwrap(), 3);

        let checkpoint = HumanCheckpoint {
            id: Uuid::new_v4(),
            acknowledged_at: now - Duration::minutes(9) + Duration::seconds(30),
            acknowledged_by: "reviewer".into(),
            note: None,
        };
        repo.record_checkpoint(&checkpoint).await.unwrap();
        let latest = repo.latest_checkpoint().await.unwrap().unwrap();
        assert_eq!(latest.id, checkpoint.id);
        assert_eq!(
            repo.count_committed_since(Some(latest.acknowledged_at)).await.unwrap(),
            1
        );
    }
}
