//! Port trait definitions (Hexagonal Architecture)
//!
//! Repositories persist one aggregate each. `Transform`, `StagedPipeline`,
//! `ChangeProposer` and `Notifier` are the external collaborators the quality
//! gate drives but never implements itself.

pub mod capture_repository;
pub mod contract_repository;
pub mod cycle_repository;
pub mod drift_repository;
pub mod feedback_repository;
pub mod fixture_repository;
pub mod lease_repository;
pub mod notifier;
pub mod regression_run_repository;
pub mod transform;

pub use capture_repository::CaptureRepository;
pub use contract_repository::ContractRepository;
pub use cycle_repository::CycleRepository;
pub use drift_repository::DriftRepository;
pub use feedback_repository::FeedbackRepository;
pub use fixture_repository::FixtureRepository;
pub use lease_repository::LeaseRepository;
pub use notifier::{NotificationEvent, Notifier};
pub use regression_run_repository::RegressionRunRepository;
pub use transform::{ChangeProposer, StagedPipeline, Transform};
