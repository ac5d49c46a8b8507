//! gatekeep - regression-gated improvement loop for text transformation pipelines
//!
//! gatekeep keeps a curated corpus of input/expected-output fixtures, scores
//! every transform output on weighted quality dimensions, and only lets an
//! automated change to the pipeline land when the corpus shows no regression.
//! Live outputs are captured and checked against declared output contracts so
//! format drift is caught between cycles, and human feedback feeds the signal
//! that decides which stage to work on next.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the ports services depend on
//! - **Service Layer** (`services`): scoring, regression, drift, cycles, reporting
//! - **Adapters** (`adapters`): SQLite store, command-backed transform and
//!   proposer, file-backed pipeline, notifiers
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use gatekeep::domain::models::ScoringConfig;
//! use gatekeep::services::scoring::ScoringContext;
//! use gatekeep::services::DimensionSet;
//!
//! let fidelity = DimensionSet::transform_fidelity(&ScoringConfig::default())?;
//! let score = fidelity.score("Hi there.", "Hi there.", &ScoringContext::for_input("hi"))?;
//! assert!(score.passed);
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult, TransformError};
pub use domain::models::{
    Capture, Config, FeedbackItem, Fixture, ImprovementCycle, OutputContract, RegressionReport,
    ScoreResult,
};
pub use domain::ports::{ChangeProposer, Notifier, StagedPipeline, Transform};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    DimensionSet, DriftDetector, ImprovementCycleService, QualityReportBuilder, RegressionRunner,
};
