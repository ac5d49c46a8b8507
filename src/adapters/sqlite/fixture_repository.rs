//! SQLite implementation of the FixtureRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{
    format_datetime, format_optional_datetime, parse_datetime, parse_json,
    parse_optional_datetime, parse_uuid, to_u32,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Difficulty, Fixture, HistoryUpdate, Provenance};
use crate::domain::ports::FixtureRepository;

const FIXTURE_COLUMNS: &str = "id, key, input, expected_output, category, difficulty, provenance, \
     active, last_pass, fail_count, last_regressed_at, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteFixtureRepository {
    pool: SqlitePool,
}

impl SqliteFixtureRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FixtureRepository for SqliteFixtureRepository {
    async fn create(&self, fixture: &Fixture) -> DomainResult<()> {
        fixture.validate()?;
        let provenance = serde_json::to_string(&fixture.provenance)?;

        let result = sqlx::query(
            r#"INSERT INTO fixtures (id, key, input, expected_output, category, difficulty,
               provenance, active, last_pass, fail_count, last_regressed_at, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(fixture.id.to_string())
        .bind(&fixture.key)
        .bind(&fixture.input)
        .bind(&fixture.expected_output)
        .bind(&fixture.category)
        .bind(fixture.difficulty.as_str())
        .bind(&provenance)
        .bind(fixture.active)
        .bind(fixture.last_pass)
        .bind(i64::from(fixture.fail_count))
        .bind(format_optional_datetime(fixture.last_regressed_at.as_ref()))
        .bind(format_datetime(&fixture.created_at))
        .bind(format_datetime(&fixture.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DomainError::ValidationFailed(format!(
                    "fixture key '{}' already exists",
                    fixture.key
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Fixture>> {
        let row: Option<FixtureRow> =
            sqlx::query_as(&format!("SELECT {FIXTURE_COLUMNS} FROM fixtures WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(Fixture::try_from).transpose()
    }

    async fn get_by_key(&self, key: &str) -> DomainResult<Option<Fixture>> {
        let row: Option<FixtureRow> =
            sqlx::query_as(&format!("SELECT {FIXTURE_COLUMNS} FROM fixtures WHERE key = ?"))
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Fixture::try_from).transpose()
    }

    async fn list(&self, active_only: bool) -> DomainResult<Vec<Fixture>> {
        let sql = if active_only {
            format!("SELECT {FIXTURE_COLUMNS} FROM fixtures WHERE active = 1 ORDER BY key")
        } else {
            format!("SELECT {FIXTURE_COLUMNS} FROM fixtures ORDER BY key")
        };
        let rows: Vec<FixtureRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Fixture::try_from).collect()
    }

    async fn set_active(&self, id: Uuid, active: bool) -> DomainResult<()> {
        let result = sqlx::query("UPDATE fixtures SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(format_datetime(&chrono::Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::FixtureNotFound(id));
        }
        Ok(())
    }

    async fn apply_history(&self, updates: &[HistoryUpdate]) -> DomainResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for update in updates {
            sqlx::query(
                r#"UPDATE fixtures SET
                       last_pass = ?,
                       fail_count = fail_count + ?,
                       last_regressed_at = CASE WHEN ? THEN ? ELSE last_regressed_at END,
                       updated_at = ?
                   WHERE id = ?"#,
            )
            .bind(update.passed)
            .bind(i64::from(!update.passed))
            .bind(update.regressed)
            .bind(format_datetime(&update.evaluated_at))
            .bind(format_datetime(&update.evaluated_at))
            .bind(update.fixture_id.to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct FixtureRow {
    id: String,
    key: String,
    input: String,
    expected_output: String,
    category: String,
    difficulty: String,
    provenance: String,
    active: bool,
    last_pass: Option<bool>,
    fail_count: i64,
    last_regressed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<FixtureRow> for Fixture {
    type Error = DomainError;

    fn try_from(row: FixtureRow) -> Result<Self, Self::Error> {
        let difficulty = Difficulty::from_str(&row.difficulty).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid difficulty: {}", row.difficulty))
        })?;
        let provenance: Provenance = parse_json(&row.provenance)?;

        Ok(Fixture {
            id: parse_uuid(&row.id)?,
            key: row.key,
            input: row.input,
            expected_output: row.expected_output,
            category: row.category,
            difficulty,
            provenance,
            active: row.active,
            last_pass: row.last_pass,
            fail_count: to_u32(row.fail_count),
            last_regressed_at: parse_optional_datetime(row.last_regressed_at)?,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use chrono::Utc;

    async fn repo() -> SqliteFixtureRepository {
        SqliteFixtureRepository::new(create_migrated_test_pool().await.unwrap())
    }

    fn fixture(key: &str) -> Fixture {
        Fixture::new(key, "hi", "Hi there.", "conversation", Difficulty::Easy, Provenance::Curated)
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_by_key() {
        let repo = repo().await;
        let f = fixture("conv-001");
        repo.create(&f).await.unwrap();

        let loaded = repo.get_by_key("conv-001").await.unwrap().unwrap();
        assert_eq!(loaded.id, f.id);
        assert_eq!(loaded.provenance, Provenance::Curated);
        assert_eq!(loaded.last_pass, None);
        assert!(repo.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let repo = repo().await;
        repo.create(&fixture("conv-001")).await.unwrap();
        let err = repo.create(&fixture("conv-001")).await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_apply_history_batch() {
        let repo = repo().await;
        let a = fixture("a");
        let b = fixture("b");
        repo.create(&a).await.unwrap();
        repo.create(&b).await.unwrap();

        let now = Utc::now();
        repo.apply_history(&[
            HistoryUpdate {
                fixture_id: a.id,
                passed: false,
                regressed: true,
                evaluated_at: now,
            },
            HistoryUpdate {
                fixture_id: b.id,
                passed: true,
                regressed: false,
                evaluated_at: now,
            },
        ])
        .await
        .unwrap();

        let a = repo.get(a.id).await.unwrap().unwrap();
        assert_eq!(a.last_pass, Some(false));
        assert_eq!(a.fail_count, 1);
        assert!(a.last_regressed_at.is_some());
        let b = repo.get(b.id).await.unwrap().unwrap();
        assert_eq!(b.last_pass, Some(true));
        assert_eq!(b.fail_count, 0);
        assert!(b.last_regressed_at.is_none());
    }

    #[tokio::test]
    async fn test_set_active_filters_list() {
        let repo = repo().await;
        let f = fixture("conv-001");
        repo.create(&f).await.unwrap();
        repo.create(&fixture("conv-002")).await.unwrap();
        repo.set_active(f.id, false).await.unwrap();

        assert_eq!(repo.list(true).await.unwrap().len(), 1);
        assert_eq!(repo.list(false).await.unwrap().len(), 2);
        assert!(matches!(
            repo.set_active(Uuid::new_v4(), true).await,
            Err(DomainError::FixtureNotFound(_))
        ));
    }
}
