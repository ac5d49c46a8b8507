//! Domain models for the quality gate.

pub mod capture;
pub mod config;
pub mod contract;
pub mod cycle;
pub mod drift;
pub mod feedback;
pub mod fixture;
pub mod lease;
pub mod regression;
pub mod score;
pub mod stage;

pub use capture::{Capture, CaptureFlagCounts, QualityFlags};
pub use config::{
    CaptureConfig, Config, CycleConfig, DatabaseConfig, DriftConfig, LoggingConfig, NotifyConfig,
    PipelineConfig, RegressionConfig, ScoringConfig,
};
pub use contract::{
    CompiledContract, ContractEvolution, LengthBounds, OutputContract, SectionSpec,
    DEFAULT_DRIFT_THRESHOLD,
};
pub use cycle::{
    ChangeProposal, CycleOutcome, CyclePhase, CyclePlan, GuardrailViolation, HumanCheckpoint,
    ImprovementCycle, RollbackReason, StageEdit, StageSnapshot,
};
pub use drift::{DriftRecord, RecommendedAction};
pub use feedback::{
    FeedbackCounts, FeedbackItem, FeedbackPriority, FeedbackStatus, InputMethod, GENERAL_CATEGORY,
};
pub use fixture::{Difficulty, Fixture, HistoryUpdate, Provenance, EMPTY_RESPONSE_CATEGORY};
pub use lease::{Lease, WRITER_LEASE_NAME};
pub use regression::{
    CategoryStats, FailingFixture, FixtureOutcome, RegressionEvaluation, RegressionReport,
    RegressionRun,
};
pub use score::{ScoreResult, FAILING_DIMENSION_THRESHOLD};
