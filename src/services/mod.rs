//! Services coordinating the domain through the ports.

pub mod capture_ingest;
pub mod checkpoint;
pub mod contract_registry;
pub mod drift_detector;
pub mod feedback_intake;
pub mod fixture_service;
pub mod guardrails;
pub mod improvement_cycle;
pub mod quality_report;
pub mod regression_runner;
pub mod scoring;
pub mod signal_accumulator;
pub mod writer_lease;

pub use capture_ingest::{CaptureIngest, CaptureSubmission, DrainSummary, DrainerHandle};
pub use checkpoint::{CheckpointLedger, CheckpointStatus};
pub use contract_registry::{ContractDefinition, ContractRegistry, Evolved};
pub use drift_detector::{DriftDetector, SweepSummary};
pub use feedback_intake::{FeedbackIntake, NewFeedback};
pub use fixture_service::{FixtureService, FixtureSpec, ImportSummary, Promotion};
pub use guardrails::{ChangeGuardrails, GuardrailResult};
pub use improvement_cycle::{should_commit, CycleRunResult, ImprovementCycleService, SkipReason};
pub use quality_report::{QualityReport, QualityReportBuilder};
pub use regression_runner::RegressionRunner;
pub use scoring::DimensionSet;
pub use signal_accumulator::{SignalAccumulator, StageSignal};
pub use writer_lease::{LeaseGuard, WriterLease};
