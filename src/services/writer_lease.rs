//! Single-writer lease shared by improvement cycles and manual regression runs.
//!
//! A held lease is renewed on a heartbeat at a third of its TTL, so a cycle
//! keeps it for as long as it runs and a crashed holder still loses it
//! within one TTL.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Lease, WRITER_LEASE_NAME};
use crate::domain::ports::LeaseRepository;

const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

/// Handle on the writer lease for one process.
#[derive(Clone)]
pub struct WriterLease {
    repo: Arc<dyn LeaseRepository>,
    owner: String,
    ttl: Duration,
}

/// A held lease with its renewal task. Dropping it stops renewal; the lease
/// then expires on its own.
pub struct LeaseGuard {
    lease: WriterLease,
    heartbeat: Option<JoinHandle<()>>,
}

impl LeaseGuard {
    /// Stop renewing and release the lease.
    pub async fn release(mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
            let _ = heartbeat.await;
        }
        self.lease.release().await;
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
    }
}

impl WriterLease {
    pub fn new(repo: Arc<dyn LeaseRepository>, ttl: Duration) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        let owner = format!("pid{}-{}", std::process::id(), &suffix[..8]);
        Self::with_owner(repo, owner, ttl)
    }

    pub fn with_owner(
        repo: Arc<dyn LeaseRepository>,
        owner: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            repo,
            owner: owner.into(),
            ttl,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub async fn acquire(&self) -> DomainResult<Lease> {
        let lease = self
            .repo
            .try_acquire(WRITER_LEASE_NAME, &self.owner, self.ttl)
            .await?;
        tracing::debug!(
            owner = %self.owner,
            expires_at = %lease.expires_at,
            "Writer lease acquired"
        );
        Ok(lease)
    }

    /// Acquire the lease and keep renewing it until the guard is released.
    pub async fn hold(&self) -> DomainResult<LeaseGuard> {
        self.acquire().await?;
        let heartbeat = tokio::spawn(renew(self.clone()));
        Ok(LeaseGuard {
            lease: self.clone(),
            heartbeat: Some(heartbeat),
        })
    }

    /// Fails with `LeaseLost` unless this owner still holds a live lease.
    pub async fn ensure_held(&self) -> DomainResult<()> {
        match self.repo.get(WRITER_LEASE_NAME).await? {
            Some(lease) if lease.owner == self.owner && !lease.is_expired_at(Utc::now()) => Ok(()),
            _ => Err(DomainError::LeaseLost {
                name: WRITER_LEASE_NAME.to_string(),
                owner: self.owner.clone(),
            }),
        }
    }

    /// Release the lease. Failure is logged; the lease will expire on its own.
    pub async fn release(&self) {
        match self.repo.release(WRITER_LEASE_NAME, &self.owner).await {
            Ok(true) => tracing::debug!(owner = %self.owner, "Writer lease released"),
            Ok(false) => tracing::warn!(owner = %self.owner, "Writer lease was no longer held"),
            Err(e) => {
                tracing::warn!(owner = %self.owner, error = %e, "Failed to release writer lease");
            }
        }
    }

    /// Run `f` while holding the lease, releasing it afterwards whatever the outcome.
    pub async fn run<T, F, Fut>(&self, f: F) -> DomainResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DomainResult<T>>,
    {
        let guard = self.hold().await?;
        let result = f().await;
        guard.release().await;
        result
    }
}

async fn renew(lease: WriterLease) {
    let period = (lease.ttl / 3).max(MIN_HEARTBEAT);
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticks.tick().await;
        match lease
            .repo
            .try_acquire(WRITER_LEASE_NAME, &lease.owner, lease.ttl)
            .await
        {
            Ok(renewed) => {
                tracing::trace!(
                    owner = %lease.owner,
                    expires_at = %renewed.expires_at,
                    "Writer lease renewed"
                );
            }
            Err(e @ DomainError::LeaseHeld { .. }) => {
                tracing::error!(owner = %lease.owner, error = %e, "Writer lease lost");
                return;
            }
            Err(e) => {
                tracing::warn!(owner = %lease.owner, error = %e, "Failed to renew writer lease");
            }
        }
    }
}
