//! SQLite implementation of the ContractRepository.
//!
//! The full contract is stored as JSON; name and version are mirrored into
//! columns for lookup and listing.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_json};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::OutputContract;
use crate::domain::ports::ContractRepository;

#[derive(Clone)]
pub struct SqliteContractRepository {
    pool: SqlitePool,
}

impl SqliteContractRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ContractRow {
    definition: String,
}

impl TryFrom<ContractRow> for OutputContract {
    type Error = DomainError;

    fn try_from(row: ContractRow) -> Result<Self, Self::Error> {
        parse_json(&row.definition)
    }
}

#[async_trait]
impl ContractRepository for SqliteContractRepository {
    async fn create(&self, contract: &OutputContract) -> DomainResult<()> {
        let definition = serde_json::to_string(contract)?;
        let result = sqlx::query(
            r#"INSERT INTO output_contracts (id, name, version, definition, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(contract.id.to_string())
        .bind(&contract.name)
        .bind(i64::from(contract.version))
        .bind(&definition)
        .bind(format_datetime(&contract.created_at))
        .bind(format_datetime(&contract.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DomainError::InvalidContract {
                    contract: contract.name.clone(),
                    reason: "a contract with this name already exists".to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<OutputContract>> {
        let row: Option<ContractRow> =
            sqlx::query_as("SELECT definition FROM output_contracts WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(OutputContract::try_from).transpose()
    }

    async fn get_by_name(&self, name: &str) -> DomainResult<Option<OutputContract>> {
        let row: Option<ContractRow> =
            sqlx::query_as("SELECT definition FROM output_contracts WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        row.map(OutputContract::try_from).transpose()
    }

    async fn list(&self) -> DomainResult<Vec<OutputContract>> {
        let rows: Vec<ContractRow> =
            sqlx::query_as("SELECT definition FROM output_contracts ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(OutputContract::try_from).collect()
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM drift_records WHERE contract_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM output_contracts WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::ContractNotFound(id));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn evolve(&self, contract: &OutputContract) -> DomainResult<u64> {
        let definition = serde_json::to_string(contract)?;
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"UPDATE output_contracts
               SET name = ?, version = ?, definition = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&contract.name)
        .bind(i64::from(contract.version))
        .bind(&definition)
        .bind(format_datetime(&contract.updated_at))
        .bind(contract.id.to_string())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(DomainError::ContractNotFound(contract.id));
        }
        let reset = sqlx::query("DELETE FROM drift_records WHERE contract_id = ?")
            .bind(contract.id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(reset.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::SectionSpec;

    #[tokio::test]
    async fn test_round_trip_preserves_definition() {
        let repo = SqliteContractRepository::new(create_migrated_test_pool().await.unwrap());
        let mut contract = OutputContract::new("weekly summary");
        contract.required_sections = vec![SectionSpec::with_keywords("wins", &["win", "shipped"])];
        contract.required_markers = vec!["---".into()];
        repo.create(&contract).await.unwrap();

        let loaded = repo.get_by_name("weekly summary").await.unwrap().unwrap();
        assert_eq!(loaded.id, contract.id);
        assert_eq!(loaded.required_sections, contract.required_sections);
        assert_eq!(loaded.required_markers, contract.required_markers);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_contract() {
        let repo = SqliteContractRepository::new(create_migrated_test_pool().await.unwrap());
        assert!(matches!(
            repo.delete(Uuid::new_v4()).await,
            Err(DomainError::ContractNotFound(_))
        ));
    }
}
