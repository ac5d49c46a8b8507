//! Repository port for the fixture store.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Fixture, HistoryUpdate};

/// Durable corpus of fixtures. Fixtures are never deleted.
#[async_trait]
pub trait FixtureRepository: Send + Sync {
    /// Insert a new fixture. Fails if the key already exists.
    async fn create(&self, fixture: &Fixture) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Fixture>>;

    async fn get_by_key(&self, key: &str) -> DomainResult<Option<Fixture>>;

    /// List fixtures, optionally only active ones, ordered by key.
    async fn list(&self, active_only: bool) -> DomainResult<Vec<Fixture>>;

    /// Promote (activate) or demote (deactivate) a fixture.
    async fn set_active(&self, id: Uuid, active: bool) -> DomainResult<()>;

    /// Apply a batch of history updates in a single transaction.
    async fn apply_history(&self, updates: &[HistoryUpdate]) -> DomainResult<()>;
}
