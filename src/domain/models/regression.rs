//! Regression run results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::fixture::HistoryUpdate;
use super::score::ScoreResult;

/// Scored result of replaying one fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureOutcome {
    pub fixture_id: Uuid,
    pub fixture_key: String,
    pub category: String,
    pub score: ScoreResult,
    /// Set when the transform errored or timed out.
    pub transform_error: Option<String>,
    pub previous_pass: Option<bool>,
    pub regressed: bool,
    pub improved: bool,
}

/// Pass rate for one fixture category.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryStats {
    pub total: usize,
    pub passed: usize,
    pub pass_rate: f64,
}

/// A failing fixture surfaced in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailingFixture {
    pub fixture_id: Uuid,
    pub fixture_key: String,
    pub category: String,
    pub overall: f64,
    pub failing_dimensions: Vec<String>,
}

/// Aggregate outcome of replaying the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub regressions: u32,
    pub improvements: u32,
    pub transform_failures: usize,
    pub pass_rate: f64,
    /// Mean overall score across all evaluated fixtures.
    pub overall_score: f64,
    pub per_category: BTreeMap<String, CategoryStats>,
    /// Number of fixtures failing each dimension.
    pub dimension_failures: BTreeMap<String, usize>,
    /// Lowest-scoring failures first.
    pub top_failing: Vec<FailingFixture>,
    pub regressed_fixture_ids: Vec<Uuid>,
    pub improved_fixture_ids: Vec<Uuid>,
}

impl RegressionReport {
    /// A report with regressions is a hard signal: never commit on top of it.
    pub fn has_regressions(&self) -> bool {
        self.regressions > 0
    }
}

/// Full output of one evaluation: the report plus per-fixture detail and the
/// history updates still to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionEvaluation {
    pub report: RegressionReport,
    pub outcomes: Vec<FixtureOutcome>,
    pub history_updates: Vec<HistoryUpdate>,
}

/// A persisted regression run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub report: RegressionReport,
}
