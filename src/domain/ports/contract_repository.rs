//! Repository port for the output contract registry.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::OutputContract;

#[async_trait]
pub trait ContractRepository: Send + Sync {
    async fn create(&self, contract: &OutputContract) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<OutputContract>>;

    async fn get_by_name(&self, name: &str) -> DomainResult<Option<OutputContract>>;

    async fn list(&self) -> DomainResult<Vec<OutputContract>>;

    /// Delete a contract together with its drift history.
    async fn delete(&self, id: Uuid) -> DomainResult<()>;

    /// Store an evolved contract and reset its drift history atomically.
    /// Returns the number of drift records removed.
    async fn evolve(&self, contract: &OutputContract) -> DomainResult<u64>;
}
