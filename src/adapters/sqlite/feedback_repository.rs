//! SQLite implementation of the FeedbackRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    FeedbackCounts, FeedbackItem, FeedbackPriority, FeedbackStatus, InputMethod,
};
use crate::domain::ports::FeedbackRepository;

const FEEDBACK_COLUMNS: &str = "id, created_at, updated_at, input_method, category, \
     linked_capture_id, priority, description, status, consumed_by_cycle_id, resolution_note";

#[derive(Clone)]
pub struct SqliteFeedbackRepository {
    pool: SqlitePool,
}

impl SqliteFeedbackRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedbackRepository for SqliteFeedbackRepository {
    async fn insert(&self, item: &FeedbackItem) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO feedback (id, created_at, updated_at, input_method, category,
               linked_capture_id, priority, description, status, consumed_by_cycle_id,
               resolution_note)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(item.id.to_string())
        .bind(format_datetime(&item.created_at))
        .bind(format_datetime(&item.updated_at))
        .bind(item.input_method.as_str())
        .bind(&item.category)
        .bind(item.linked_capture_id.map(|id| id.to_string()))
        .bind(item.priority.as_str())
        .bind(&item.description)
        .bind(item.status.as_str())
        .bind(item.consumed_by_cycle_id.map(|id| id.to_string()))
        .bind(&item.resolution_note)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<FeedbackItem>> {
        let row: Option<FeedbackRow> =
            sqlx::query_as(&format!("SELECT {FEEDBACK_COLUMNS} FROM feedback WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(FeedbackItem::try_from).transpose()
    }

    async fn pending(&self) -> DomainResult<Vec<FeedbackItem>> {
        // Priority is stored as text; rank it explicitly.
        let rows: Vec<FeedbackRow> = sqlx::query_as(&format!(
            "SELECT {FEEDBACK_COLUMNS} FROM feedback WHERE status = 'pending'
             ORDER BY CASE priority WHEN 'high' THEN 1 ELSE 0 END DESC,
                      created_at ASC, rowid ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(FeedbackItem::try_from).collect()
    }

    async fn list_by_status(&self, status: FeedbackStatus) -> DomainResult<Vec<FeedbackItem>> {
        let rows: Vec<FeedbackRow> = sqlx::query_as(&format!(
            "SELECT {FEEDBACK_COLUMNS} FROM feedback WHERE status = ?
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(FeedbackItem::try_from).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: FeedbackStatus,
        consumed_by_cycle_id: Option<Uuid>,
        resolution_note: Option<&str>,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE feedback
               SET status = ?, consumed_by_cycle_id = ?, resolution_note = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(status.as_str())
        .bind(consumed_by_cycle_id.map(|id| id.to_string()))
        .bind(resolution_note)
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::FeedbackNotFound(id));
        }
        Ok(())
    }

    async fn counts(&self) -> DomainResult<FeedbackCounts> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT status, priority, COUNT(*) FROM feedback GROUP BY status, priority",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = FeedbackCounts::default();
        for (status, priority, count) in rows {
            let count = u64::try_from(count).unwrap_or(0);
            match FeedbackStatus::from_str(&status) {
                Some(FeedbackStatus::Pending) => {
                    counts.pending += count;
                    if FeedbackPriority::from_str(&priority) == Some(FeedbackPriority::High) {
                        counts.high_priority_pending += count;
                    }
                }
                Some(FeedbackStatus::Processing) => counts.processing += count,
                Some(FeedbackStatus::Resolved) => counts.resolved += count,
                Some(FeedbackStatus::WontFix) => counts.wont_fix += count,
                Some(FeedbackStatus::Duplicate) => counts.duplicate += count,
                None => tracing::warn!(status = %status, "Unknown feedback status in store"),
            }
        }
        Ok(counts)
    }
}

#[derive(sqlx::FromRow)]
struct FeedbackRow {
    id: String,
    created_at: String,
    updated_at: String,
    input_method: String,
    category: String,
    linked_capture_id: Option<String>,
    priority: String,
    description: Option<String>,
    status: String,
    consumed_by_cycle_id: Option<String>,
    resolution_note: Option<String>,
}

impl TryFrom<FeedbackRow> for FeedbackItem {
    type Error = DomainError;

    fn try_from(row: FeedbackRow) -> Result<Self, Self::Error> {
        let input_method = InputMethod::from_str(&row.input_method).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid input method: {}", row.input_method))
        })?;
        let priority = FeedbackPriority::from_str(&row.priority).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid priority: {}", row.priority))
        })?;
        let status = FeedbackStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid feedback status: {}", row.status))
        })?;

        Ok(FeedbackItem {
            id: parse_uuid(&row.id)?,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            input_method,
            category: row.category,
            linked_capture_id: parse_optional_uuid(row.linked_capture_id)?,
            priority,
            description: row.description,
            status,
            consumed_by_cycle_id: parse_optional_uuid(row.consumed_by_cycle_id)?,
            resolution_note: row.resolution_note,
        })
    }
}
