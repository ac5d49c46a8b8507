//! Domain errors for the gatekeep quality gate.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the gatekeep system.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Fixture not found: {0}")]
    FixtureNotFound(Uuid),

    #[error("No fixture with key '{0}'")]
    FixtureKeyNotFound(String),

    #[error("Capture not found: {0}")]
    CaptureNotFound(Uuid),

    #[error("Output contract not found: {0}")]
    ContractNotFound(Uuid),

    #[error("No output contract named '{0}'")]
    ContractNameNotFound(String),

    #[error("Feedback item not found: {0}")]
    FeedbackNotFound(Uuid),

    #[error("Improvement cycle not found: {0}")]
    CycleNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid output contract '{contract}': {reason}")]
    InvalidContract { contract: String, reason: String },

    #[error("Lease '{name}' is held by {owner} until {expires_at}")]
    LeaseHeld {
        name: String,
        owner: String,
        expires_at: String,
    },

    #[error("Lease '{name}' is no longer held by {owner}")]
    LeaseLost { name: String, owner: String },

    #[error("Human checkpoint required: {committed} cycles committed since last review")]
    HumanCheckpointRequired { committed: u32 },

    #[error("Unknown pipeline stage: {0}")]
    UnknownStage(String),

    #[error("Change proposal failed: {0}")]
    ProposalFailed(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    #[error("Notification failed: {0}")]
    NotificationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

/// Failure raised by a transform under test.
///
/// Never propagated past the regression runner: a failing transform is scored
/// as an automatic fail for the fixture that triggered it.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    #[error("Transform timed out after {0}s")]
    Timeout(u64),

    #[error("Transform process failed: {0}")]
    Process(String),

    #[error("Transform produced invalid output: {0}")]
    InvalidOutput(String),
}
