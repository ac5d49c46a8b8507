//! Signal accumulator for the Review phase.
//!
//! Fixture dimension failures, pending feedback and drift recommendations are
//! summed per pipeline stage. The stage with the highest total becomes the
//! cycle's target; ties go to the lexicographically smallest stage name.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::{
    CycleConfig, DriftRecord, FeedbackItem, FeedbackPriority, FixtureOutcome, RecommendedAction,
};

/// Weight of one fixture failing one dimension.
pub const DIMENSION_FAILURE_WEIGHT: f64 = 1.0;
/// Weight of one pending feedback item.
pub const FEEDBACK_WEIGHT: f64 = 3.0;
/// Added on top of [`FEEDBACK_WEIGHT`] for high-priority feedback.
pub const HIGH_PRIORITY_BONUS: f64 = 2.0;
/// Weight of one drift recommendation.
pub const DRIFT_WEIGHT: f64 = 1.0;

/// Everything that pointed at one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSignal {
    pub score: f64,
    pub dimension_failures: BTreeMap<String, usize>,
    pub feedback_ids: Vec<Uuid>,
    pub drift_actions: BTreeMap<String, usize>,
    pub affected_fixture_ids: BTreeSet<Uuid>,
}

impl StageSignal {
    pub fn feedback_count(&self) -> usize {
        self.feedback_ids.len()
    }

    pub fn drift_count(&self) -> usize {
        self.drift_actions.values().sum()
    }

    pub fn dimension_failure_count(&self) -> usize {
        self.dimension_failures.values().sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignalAccumulator {
    stages: BTreeMap<String, StageSignal>,
}

impl SignalAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum every Review input using the configured stage maps.
    pub fn from_review(
        outcomes: &[FixtureOutcome],
        feedback: &[FeedbackItem],
        drift: &[DriftRecord],
        config: &CycleConfig,
    ) -> Self {
        let mut acc = Self::new();
        for outcome in outcomes {
            for dimension in &outcome.score.failing_dimensions {
                if let Some(stage) = config.dimension_stages.get(dimension) {
                    acc.add_dimension_failure(stage, dimension, outcome.fixture_id);
                }
            }
        }
        for item in feedback {
            acc.add_feedback(item);
        }
        for record in drift.iter().filter(|r| r.drifted) {
            if let Some(stage) = config
                .drift_action_stages
                .get(record.recommended_action.as_str())
            {
                acc.add_drift(stage, record.recommended_action);
            }
        }
        acc
    }

    fn stage(&mut self, stage: &str) -> &mut StageSignal {
        self.stages.entry(stage.to_string()).or_default()
    }

    pub fn add_dimension_failure(&mut self, stage: &str, dimension: &str, fixture_id: Uuid) {
        let signal = self.stage(stage);
        signal.score += DIMENSION_FAILURE_WEIGHT;
        *signal
            .dimension_failures
            .entry(dimension.to_string())
            .or_default() += 1;
        signal.affected_fixture_ids.insert(fixture_id);
    }

    /// Feedback in the `general` category has no stage and is ignored.
    pub fn add_feedback(&mut self, item: &FeedbackItem) {
        if !crate::domain::models::stage::ALL.contains(&item.category.as_str()) {
            return;
        }
        let signal = self.stage(&item.category);
        signal.score += FEEDBACK_WEIGHT;
        if item.priority == FeedbackPriority::High {
            signal.score += HIGH_PRIORITY_BONUS;
        }
        signal.feedback_ids.push(item.id);
    }

    pub fn add_drift(&mut self, stage: &str, action: RecommendedAction) {
        let signal = self.stage(stage);
        signal.score += DRIFT_WEIGHT;
        *signal
            .drift_actions
            .entry(action.as_str().to_string())
            .or_default() += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.stages.values().all(|s| s.score <= 0.0)
    }

    /// The stage with the strongest signal, if any.
    pub fn winner(&self) -> Option<(&str, &StageSignal)> {
        let mut best: Option<(&str, &StageSignal)> = None;
        for (stage, signal) in &self.stages {
            if signal.score <= 0.0 {
                continue;
            }
            if best.is_none_or(|(_, b)| signal.score > b.score) {
                best = Some((stage.as_str(), signal));
            }
        }
        best
    }

    pub fn stages(&self) -> &BTreeMap<String, StageSignal> {
        &self.stages
    }
}
