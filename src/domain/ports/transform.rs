//! Ports for the pipeline under test and the agent that proposes changes to it.

use async_trait::async_trait;

use crate::domain::errors::{DomainResult, TransformError};
use crate::domain::models::{ChangeProposal, CyclePlan, StageSnapshot};

/// The text transformation being gated. Opaque to the framework.
#[async_trait]
pub trait Transform: Send + Sync {
    async fn transform(&self, input: &str) -> Result<String, TransformError>;
}

/// A transform made of ordered, named stages that can be mutated one at a time.
#[async_trait]
pub trait StagedPipeline: Transform {
    /// Stage names in pipeline order.
    async fn stages(&self) -> DomainResult<Vec<String>>;

    /// Current content of a stage.
    async fn snapshot(&self, stage: &str) -> DomainResult<StageSnapshot>;

    /// Replace a stage's content in the working copy.
    async fn apply(&self, stage: &str, content: &str) -> DomainResult<()>;

    /// Put a stage back to a previously taken snapshot.
    async fn restore(&self, snapshot: &StageSnapshot) -> DomainResult<()>;

    /// Make the current working copy of a stage durable.
    async fn persist(&self, stage: &str) -> DomainResult<()>;
}

/// Produces a candidate change for a planned cycle.
#[async_trait]
pub trait ChangeProposer: Send + Sync {
    async fn propose(
        &self,
        plan: &CyclePlan,
        current: &StageSnapshot,
    ) -> DomainResult<ChangeProposal>;
}
