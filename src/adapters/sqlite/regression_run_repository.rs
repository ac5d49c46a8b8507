//! SQLite implementation of the RegressionRunRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{format_datetime, parse_datetime, parse_json, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::RegressionRun;
use crate::domain::ports::RegressionRunRepository;

#[derive(Clone)]
pub struct SqliteRegressionRunRepository {
    pool: SqlitePool,
}

impl SqliteRegressionRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    started_at: String,
    finished_at: String,
    report: String,
}

impl TryFrom<RunRow> for RegressionRun {
    type Error = DomainError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        Ok(RegressionRun {
            id: parse_uuid(&row.id)?,
            started_at: parse_datetime(&row.started_at)?,
            finished_at: parse_datetime(&row.finished_at)?,
            report: parse_json(&row.report)?,
        })
    }
}

#[async_trait]
impl RegressionRunRepository for SqliteRegressionRunRepository {
    async fn append(&self, run: &RegressionRun) -> DomainResult<()> {
        let report = serde_json::to_string(&run.report)?;
        sqlx::query(
            r#"INSERT INTO regression_runs (id, started_at, finished_at, pass_rate,
               overall_score, regressions, report)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(format_datetime(&run.started_at))
        .bind(format_datetime(&run.finished_at))
        .bind(run.report.pass_rate)
        .bind(run.report.overall_score)
        .bind(i64::from(run.report.regressions))
        .bind(&report)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest(&self) -> DomainResult<Option<RegressionRun>> {
        let row: Option<RunRow> = sqlx::query_as(
            "SELECT id, started_at, finished_at, report FROM regression_runs
             ORDER BY started_at DESC, rowid DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.map(RegressionRun::try_from).transpose()
    }

    async fn list_since(&self, since: DateTime<Utc>) -> DomainResult<Vec<RegressionRun>> {
        let rows: Vec<RunRow> = sqlx::query_as(
            "SELECT id, started_at, finished_at, report FROM regression_runs
             WHERE started_at >= ? ORDER BY started_at ASC, rowid ASC",
        )
        .bind(format_datetime(&since))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RegressionRun::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::RegressionReport;
    use chrono::Duration;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn run(started_at: DateTime<Utc>, pass_rate: f64) -> RegressionRun {
        let id = Uuid::new_v4();
        RegressionRun {
            id,
            started_at,
            finished_at: started_at,
            report: RegressionReport {
                run_id: id,
                started_at,
                finished_at: started_at,
                total: 4,
                passed: 3,
                failed: 1,
                regressions: 0,
                improvements: 0,
                transform_failures: 0,
                pass_rate,
                overall_score: 0.9,
                per_category: BTreeMap::new(),
                dimension_failures: BTreeMap::new(),
                top_failing: vec![],
                regressed_fixture_ids: vec![],
                improved_fixture_ids: vec![],
            },
        }
    }

    #[tokio::test]
    async fn test_latest_and_window() {
        let repo = SqliteRegressionRunRepository::new(create_migrated_test_pool().await.unwrap());
        assert!(repo.latest().await.unwrap().is_none());

        let now = Utc::now();
        repo.append(&run(now - Duration::days(10), 0.5)).await.unwrap();
        let recent = run(now - Duration::hours(1), 0.75);
        repo.append(&recent).await.unwrap();

        let latest = repo.latest().await.unwrap().unwrap();
        assert_eq!(latest.id, recent.id);
        assert_eq!(latest.report.pass_rate, 0.75);
        assert_eq!(repo.list_since(now - Duration::days(7)).await.unwrap().len(), 1);
    }
}
