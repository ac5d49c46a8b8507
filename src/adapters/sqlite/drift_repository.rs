//! SQLite implementation of the DriftRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_json, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DriftRecord, RecommendedAction};
use crate::domain::ports::DriftRepository;

const DRIFT_COLUMNS: &str =
    "id, contract_id, capture_id, score, drifted, explanation, recommended_action, created_at";

#[derive(Clone)]
pub struct SqliteDriftRepository {
    pool: SqlitePool,
}

impl SqliteDriftRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DriftRepository for SqliteDriftRepository {
    async fn append(&self, record: &DriftRecord) -> DomainResult<()> {
        let score = serde_json::to_string(&record.score)?;
        let explanation = serde_json::to_string(&record.explanation)?;
        sqlx::query(
            r#"INSERT INTO drift_records (id, contract_id, capture_id, score, overall, drifted,
               explanation, recommended_action, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(contract_id, capture_id) DO NOTHING"#,
        )
        .bind(record.id.to_string())
        .bind(record.contract_id.to_string())
        .bind(record.capture_id.to_string())
        .bind(&score)
        .bind(record.score.overall)
        .bind(record.drifted)
        .bind(&explanation)
        .bind(record.recommended_action.as_str())
        .bind(format_datetime(&record.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn exists(&self, contract_id: Uuid, capture_id: Uuid) -> DomainResult<bool> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM drift_records WHERE contract_id = ? AND capture_id = ?",
        )
        .bind(contract_id.to_string())
        .bind(capture_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn list_since(&self, since: DateTime<Utc>) -> DomainResult<Vec<DriftRecord>> {
        let rows: Vec<DriftRow> = sqlx::query_as(&format!(
            "SELECT {DRIFT_COLUMNS} FROM drift_records WHERE created_at >= ?
             ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(format_datetime(&since))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(DriftRecord::try_from).collect()
    }

    async fn list_for_contract(
        &self,
        contract_id: Uuid,
        limit: usize,
    ) -> DomainResult<Vec<DriftRecord>> {
        let rows: Vec<DriftRow> = sqlx::query_as(&format!(
            "SELECT {DRIFT_COLUMNS} FROM drift_records WHERE contract_id = ?
             ORDER BY created_at DESC, rowid DESC LIMIT ?"
        ))
        .bind(contract_id.to_string())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(DriftRecord::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct DriftRow {
    id: String,
    contract_id: String,
    capture_id: String,
    score: String,
    drifted: bool,
    explanation: String,
    recommended_action: String,
    created_at: String,
}

impl TryFrom<DriftRow> for DriftRecord {
    type Error = DomainError;

    fn try_from(row: DriftRow) -> Result<Self, Self::Error> {
        let recommended_action =
            RecommendedAction::from_str(&row.recommended_action).ok_or_else(|| {
                DomainError::SerializationError(format!(
                    "Invalid recommended action: {}",
                    row.recommended_action
                ))
            })?;
        Ok(DriftRecord {
            id: parse_uuid(&row.id)?,
            contract_id: parse_uuid(&row.contract_id)?,
            capture_id: parse_uuid(&row.capture_id)?,
            score: parse_json(&row.score)?,
            drifted: row.drifted,
            explanation: parse_json(&row.explanation)?,
            recommended_action,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
