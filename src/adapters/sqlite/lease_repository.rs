//! SQLite implementation of the LeaseRepository.
//!
//! Acquisition is a single upsert guarded by a WHERE clause, so two writers
//! racing for an expired lease cannot both win.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;

use super::{format_datetime, parse_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Lease;
use crate::domain::ports::LeaseRepository;

#[derive(Clone)]
pub struct SqliteLeaseRepository {
    pool: SqlitePool,
}

impl SqliteLeaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct LeaseRow {
    name: String,
    owner: String,
    acquired_at: String,
    expires_at: String,
}

impl TryFrom<LeaseRow> for Lease {
    type Error = DomainError;

    fn try_from(row: LeaseRow) -> Result<Self, Self::Error> {
        Ok(Lease {
            name: row.name,
            owner: row.owner,
            acquired_at: parse_datetime(&row.acquired_at)?,
            expires_at: parse_datetime(&row.expires_at)?,
        })
    }
}

#[async_trait]
impl LeaseRepository for SqliteLeaseRepository {
    async fn try_acquire(&self, name: &str, owner: &str, ttl: Duration) -> DomainResult<Lease> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| DomainError::ValidationFailed(format!("invalid lease ttl: {e}")))?;
        let lease = Lease {
            name: name.to_string(),
            owner: owner.to_string(),
            acquired_at: now,
            expires_at: now + ttl,
        };

        let result = sqlx::query(
            r#"INSERT INTO leases (name, owner, acquired_at, expires_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(name) DO UPDATE SET
                   owner = excluded.owner,
                   acquired_at = excluded.acquired_at,
                   expires_at = excluded.expires_at
               WHERE leases.expires_at <= ? OR leases.owner = excluded.owner"#,
        )
        .bind(&lease.name)
        .bind(&lease.owner)
        .bind(format_datetime(&lease.acquired_at))
        .bind(format_datetime(&lease.expires_at))
        .bind(format_datetime(&now))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(lease);
        }

        match self.get(name).await? {
            Some(held) => Err(DomainError::LeaseHeld {
                name: held.name,
                owner: held.owner,
                expires_at: format_datetime(&held.expires_at),
            }),
            None => Err(DomainError::DatabaseError(format!(
                "lease '{name}' was neither acquired nor found"
            ))),
        }
    }

    async fn release(&self, name: &str, owner: &str) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM leases WHERE name = ? AND owner = ?")
            .bind(name)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, name: &str) -> DomainResult<Option<Lease>> {
        let row: Option<LeaseRow> = sqlx::query_as(
            "SELECT name, owner, acquired_at, expires_at FROM leases WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Lease::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_second_owner_is_refused_while_live() {
        let repo = SqliteLeaseRepository::new(create_migrated_test_pool().await.unwrap());
        repo.try_acquire("writer", "a", TTL).await.unwrap();

        let err = repo.try_acquire("writer", "b", TTL).await.unwrap_err();
        assert!(matches!(err, DomainError::LeaseHeld { ref owner, .. } if owner == "a"));

        // Re-entrant for the same owner.
        repo.try_acquire("writer", "a", TTL).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_lease_is_taken_over() {
        let repo = SqliteLeaseRepository::new(create_migrated_test_pool().await.unwrap());
        repo.try_acquire("writer", "crashed", Duration::ZERO).await.unwrap();

        let lease = repo.try_acquire("writer", "b", TTL).await.unwrap();
        assert_eq!(lease.owner, "b");
        assert_eq!(repo.get("writer").await.unwrap().unwrap().owner, "b");
    }

    #[tokio::test]
    async fn test_release_only_by_owner() {
        let repo = SqliteLeaseRepository::new(create_migrated_test_pool().await.unwrap());
        repo.try_acquire("writer", "a", TTL).await.unwrap();
        assert!(!repo.release("writer", "b").await.unwrap());
        assert!(repo.release("writer", "a").await.unwrap());
        assert!(repo.get("writer").await.unwrap().is_none());
    }
}
