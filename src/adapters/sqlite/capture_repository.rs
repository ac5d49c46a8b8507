//! SQLite implementation of the CaptureRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Capture, CaptureFlagCounts, QualityFlags};
use crate::domain::ports::CaptureRepository;

const CAPTURE_COLUMNS: &str = "id, captured_at, input, produced_output, is_scheduled, contract_id, \
     flag_empty, flag_artifact_leak, flag_echo_leak, flag_truncated, reviewed, promoted, \
     linked_fixture_id";

#[derive(Clone)]
pub struct SqliteCaptureRepository {
    pool: SqlitePool,
}

impl SqliteCaptureRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CaptureRepository for SqliteCaptureRepository {
    async fn insert(&self, capture: &Capture) -> DomainResult<()> {
        let flags = &capture.quality_flags;
        sqlx::query(
            r#"INSERT INTO captures (id, captured_at, input, produced_output, is_scheduled,
               contract_id, flag_empty, flag_artifact_leak, flag_echo_leak, flag_truncated,
               reviewed, promoted, linked_fixture_id)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO NOTHING"#,
        )
        .bind(capture.id.to_string())
        .bind(format_datetime(&capture.captured_at))
        .bind(&capture.input)
        .bind(&capture.produced_output)
        .bind(capture.is_scheduled)
        .bind(capture.contract_id.map(|id| id.to_string()))
        .bind(flags.empty)
        .bind(flags.artifact_leak)
        .bind(flags.echo_leak)
        .bind(flags.truncated)
        .bind(capture.reviewed)
        .bind(capture.promoted)
        .bind(capture.linked_fixture_id.map(|id| id.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Capture>> {
        let row: Option<CaptureRow> =
            sqlx::query_as(&format!("SELECT {CAPTURE_COLUMNS} FROM captures WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(Capture::try_from).transpose()
    }

    async fn list_recent(&self, limit: usize) -> DomainResult<Vec<Capture>> {
        let rows: Vec<CaptureRow> = sqlx::query_as(&format!(
            "SELECT {CAPTURE_COLUMNS} FROM captures ORDER BY captured_at DESC, rowid DESC LIMIT ?"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Capture::try_from).collect()
    }

    async fn list_with_contract_since(&self, since: DateTime<Utc>) -> DomainResult<Vec<Capture>> {
        let rows: Vec<CaptureRow> = sqlx::query_as(&format!(
            "SELECT {CAPTURE_COLUMNS} FROM captures
             WHERE contract_id IS NOT NULL AND captured_at >= ?
             ORDER BY captured_at ASC, rowid ASC"
        ))
        .bind(format_datetime(&since))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Capture::try_from).collect()
    }

    async fn mark_reviewed(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("UPDATE captures SET reviewed = 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::CaptureNotFound(id));
        }
        Ok(())
    }

    async fn link_fixture(&self, id: Uuid, fixture_id: Uuid) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE captures SET reviewed = 1, promoted = 1, linked_fixture_id = ? WHERE id = ?",
        )
        .bind(fixture_id.to_string())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::CaptureNotFound(id));
        }
        Ok(())
    }

    async fn flag_counts_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DomainResult<CaptureFlagCounts> {
        let row: FlagCountRow = sqlx::query_as(
            r#"SELECT
                   COUNT(*) AS total,
                   COALESCE(SUM(CASE WHEN flag_empty + flag_artifact_leak + flag_echo_leak
                                          + flag_truncated > 0 THEN 1 ELSE 0 END), 0) AS flagged,
                   COALESCE(SUM(flag_empty), 0) AS empty,
                   COALESCE(SUM(flag_artifact_leak), 0) AS artifact_leak,
                   COALESCE(SUM(flag_echo_leak), 0) AS echo_leak,
                   COALESCE(SUM(flag_truncated), 0) AS truncated
               FROM captures
               WHERE captured_at >= ? AND captured_at < ?"#,
        )
        .bind(format_datetime(&from))
        .bind(format_datetime(&to))
        .fetch_one(&self.pool)
        .await?;

        let count = |n: i64| u64::try_from(n).unwrap_or(0);
        Ok(CaptureFlagCounts {
            total: count(row.total),
            flagged: count(row.flagged),
            empty: count(row.empty),
            artifact_leak: count(row.artifact_leak),
            echo_leak: count(row.echo_leak),
            truncated: count(row.truncated),
        })
    }

    async fn prune(
        &self,
        clean_before: DateTime<Utc>,
        flagged_before: DateTime<Utc>,
    ) -> DomainResult<u64> {
        let result = sqlx::query(
            r#"DELETE FROM captures
               WHERE promoted = 0 AND (
                   (flag_empty + flag_artifact_leak + flag_echo_leak + flag_truncated = 0
                        AND captured_at < ?)
                   OR (flag_empty + flag_artifact_leak + flag_echo_leak + flag_truncated > 0
                        AND captured_at < ?)
               )"#,
        )
        .bind(format_datetime(&clean_before))
        .bind(format_datetime(&flagged_before))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct FlagCountRow {
    total: i64,
    flagged: i64,
    empty: i64,
    artifact_leak: i64,
    echo_leak: i64,
    truncated: i64,
}

#[derive(sqlx::FromRow)]
struct CaptureRow {
    id: String,
    captured_at: String,
    input: String,
    produced_output: String,
    is_scheduled: bool,
    contract_id: Option<String>,
    flag_empty: bool,
    flag_artifact_leak: bool,
    flag_echo_leak: bool,
    flag_truncated: bool,
    reviewed: bool,
    promoted: bool,
    linked_fixture_id: Option<String>,
}

impl TryFrom<CaptureRow> for Capture {
    type Error = DomainError;

    fn try_from(row: CaptureRow) -> Result<Self, Self::Error> {
        Ok(Capture {
            id: parse_uuid(&row.id)?,
            captured_at: parse_datetime(&row.captured_at)?,
            input: row.input,
            produced_output: row.produced_output,
            is_scheduled: row.is_scheduled,
            contract_id: parse_optional_uuid(row.contract_id)?,
            quality_flags: QualityFlags {
                empty: row.flag_empty,
                artifact_leak: row.flag_artifact_leak,
                echo_leak: row.flag_echo_leak,
                truncated: row.flag_truncated,
            },
            reviewed: row.reviewed,
            promoted: row.promoted,
            linked_fixture_id: parse_optional_uuid(row.linked_fixture_id)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use chrono::Duration;

    async fn repo() -> SqliteCaptureRepository {
        SqliteCaptureRepository::new(create_migrated_test_pool().await.unwrap())
    }

    fn aged(days: i64, flags: QualityFlags) -> Capture {
        let mut capture = Capture::new("in", "out", flags);
        capture.captured_at = Utc::now() - Duration::days(days);
        capture
    }

    const FLAGGED: QualityFlags = QualityFlags {
        empty: false,
        artifact_leak: true,
        echo_leak: false,
        truncated: false,
    };

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let repo = repo().await;
        let capture = Capture::new("in", "out", QualityFlags::default());
        repo.insert(&capture).await.unwrap();
        repo.insert(&capture).await.unwrap();
        assert_eq!(repo.list_recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_prune_respects_retention_and_promotion() {
        let repo = repo().await;
        let old_clean = aged(20, QualityFlags::default());
        let recent_clean = aged(3, QualityFlags::default());
        let old_flagged = aged(20, FLAGGED);
        let ancient_flagged = aged(100, FLAGGED);
        let mut promoted = aged(200, QualityFlags::default());
        promoted.promoted = true;
        for c in [&old_clean, &recent_clean, &old_flagged, &ancient_flagged, &promoted] {
            repo.insert(c).await.unwrap();
        }

        let now = Utc::now();
        let deleted = repo
            .prune(now - Duration::days(14), now - Duration::days(90))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert!(repo.get(old_clean.id).await.unwrap().is_none());
        assert!(repo.get(ancient_flagged.id).await.unwrap().is_none());
        assert!(repo.get(old_flagged.id).await.unwrap().is_some());
        assert!(repo.get(promoted.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_flag_counts_window() {
        let repo = repo().await;
        repo.insert(&aged(0, FLAGGED)).await.unwrap();
        repo.insert(&aged(0, QualityFlags::default())).await.unwrap();
        repo.insert(&aged(3, FLAGGED)).await.unwrap();

        let now = Utc::now();
        let counts = repo
            .flag_counts_between(now - Duration::hours(24), now + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.flagged, 1);
        assert_eq!(counts.artifact_leak, 1);
    }

    #[tokio::test]
    async fn test_contract_window_oldest_first() {
        let repo = repo().await;
        let contract = Uuid::new_v4();
        let newer = aged(0, QualityFlags::default()).with_contract(contract);
        let older = aged(1, QualityFlags::default()).with_contract(contract);
        repo.insert(&newer).await.unwrap();
        repo.insert(&older).await.unwrap();
        repo.insert(&aged(0, QualityFlags::default())).await.unwrap();

        let listed = repo
            .list_with_contract_since(Utc::now() - Duration::days(2))
            .await
            .unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![older.id, newer.id]);
    }
}
