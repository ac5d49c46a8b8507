//! Repository port for human feedback.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{FeedbackCounts, FeedbackItem, FeedbackStatus};

#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    async fn insert(&self, item: &FeedbackItem) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<FeedbackItem>>;

    /// Pending items ordered by priority descending, then oldest first.
    async fn pending(&self) -> DomainResult<Vec<FeedbackItem>>;

    /// Items in the given status, newest first.
    async fn list_by_status(&self, status: FeedbackStatus) -> DomainResult<Vec<FeedbackItem>>;

    /// Persist a status change. Transition rules are enforced by the caller.
    async fn update_status(
        &self,
        id: Uuid,
        status: FeedbackStatus,
        consumed_by_cycle_id: Option<Uuid>,
        resolution_note: Option<&str>,
    ) -> DomainResult<()>;

    async fn counts(&self) -> DomainResult<FeedbackCounts>;
}
