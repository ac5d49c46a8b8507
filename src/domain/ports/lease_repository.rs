//! Repository port for the single-writer lease.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::errors::DomainResult;
use crate::domain::models::Lease;

#[async_trait]
pub trait LeaseRepository: Send + Sync {
    /// Take the lease if it is free, expired, or already held by `owner`.
    ///
    /// Returns `DomainError::LeaseHeld` when another owner holds a live lease.
    async fn try_acquire(&self, name: &str, owner: &str, ttl: Duration) -> DomainResult<Lease>;

    /// Release the lease if held by `owner`. Returns whether it was released.
    async fn release(&self, name: &str, owner: &str) -> DomainResult<bool>;

    async fn get(&self, name: &str) -> DomainResult<Option<Lease>>;
}
