//! Short id prefix resolution, so tables can show 8-character ids.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

pub async fn resolve_capture_id(pool: &SqlitePool, prefix: &str) -> Result<Uuid> {
    resolve_prefix(pool, prefix, "capture", CAPTURE_QUERY).await
}

pub async fn resolve_feedback_id(pool: &SqlitePool, prefix: &str) -> Result<Uuid> {
    resolve_prefix(pool, prefix, "feedback item", FEEDBACK_QUERY).await
}

pub async fn resolve_cycle_id(pool: &SqlitePool, prefix: &str) -> Result<Uuid> {
    resolve_prefix(pool, prefix, "cycle", CYCLE_QUERY).await
}

const CAPTURE_QUERY: &str = "SELECT id FROM captures WHERE id LIKE ?";
const FEEDBACK_QUERY: &str = "SELECT id FROM feedback WHERE id LIKE ?";
const CYCLE_QUERY: &str = "SELECT id FROM improvement_cycles WHERE id LIKE ?";

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        bail!("ID prefix must not be empty");
    }
    if !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        bail!("Invalid ID prefix '{prefix}': must contain only hex characters and dashes");
    }
    Ok(())
}

async fn resolve_prefix(
    pool: &SqlitePool,
    prefix: &str,
    entity: &str,
    query: &str,
) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(prefix) {
        return Ok(uuid);
    }
    validate_prefix(prefix)?;

    let rows: Vec<(String,)> = sqlx::query_as(query)
        .bind(format!("{}%", prefix.to_lowercase()))
        .fetch_all(pool)
        .await?;

    match rows.len() {
        0 => bail!("No {entity} found matching '{prefix}'"),
        1 => Ok(Uuid::parse_str(&rows[0].0)?),
        n => {
            let mut msg = format!("Ambiguous prefix '{prefix}': matches {n} {entity}s:");
            for row in &rows {
                msg.push_str(&format!("\n  {}", row.0));
            }
            bail!("{msg}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteFeedbackRepository};
    use crate::domain::models::{
        FeedbackItem, FeedbackPriority, FeedbackStatus, InputMethod, GENERAL_CATEGORY,
    };
    use crate::domain::ports::FeedbackRepository;

    fn item() -> FeedbackItem {
        let now = chrono::Utc::now();
        FeedbackItem {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            input_method: InputMethod::Command,
            category: GENERAL_CATEGORY.to_string(),
            linked_capture_id: None,
            priority: FeedbackPriority::Normal,
            description: Some("too long".into()),
            status: FeedbackStatus::Pending,
            consumed_by_cycle_id: None,
            resolution_note: None,
        }
    }

    #[tokio::test]
    async fn test_resolves_unique_prefix() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteFeedbackRepository::new(pool.clone());
        let item = item();
        repo.insert(&item).await.unwrap();

        let prefix = &item.id.to_string()[..8];
        assert_eq!(resolve_feedback_id(&pool, prefix).await.unwrap(), item.id);
        assert!(resolve_feedback_id(&pool, "zz").await.is_err());
        assert!(resolve_capture_id(&pool, prefix).await.is_err());
    }
}
