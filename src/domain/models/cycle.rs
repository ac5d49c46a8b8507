//! Improvement cycle domain model.
//!
//! A cycle walks `Review -> Plan -> Implement -> Validate` and ends in either
//! `Commit` or `Rollback`. Every finished cycle is appended to the audit trail
//! as an [`ImprovementCycle`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Phase of an improvement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Review,
    Plan,
    Implement,
    Validate,
    Commit,
    Rollback,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Plan => "plan",
            Self::Implement => "implement",
            Self::Validate => "validate",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Commit | Self::Rollback)
    }

    /// Legal transitions. Any non-terminal phase may abort into `Rollback`.
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Review, Self::Plan)
                | (Self::Plan, Self::Implement)
                | (Self::Implement, Self::Validate)
                | (Self::Validate, Self::Commit)
                | (
                    Self::Review | Self::Plan | Self::Implement | Self::Validate,
                    Self::Rollback
                )
        )
    }

    pub fn transition(self, next: Self) -> DomainResult<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
                reason: "illegal improvement cycle transition".to_string(),
            })
        }
    }
}

/// Descriptive output of the Plan phase. Nothing is mutated yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CyclePlan {
    pub cycle_id: Uuid,
    pub target_stage: String,
    pub problem_statement: String,
    pub proposed_approach: String,
    pub affected_fixture_ids: Vec<Uuid>,
    pub estimated_diff_lines: usize,
}

/// Replacement content for one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEdit {
    pub stage: String,
    pub new_content: String,
}

/// A change produced by the proposer during Implement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProposal {
    #[serde(default)]
    pub edits: Vec<StageEdit>,
    /// New stage order, if the proposer wants one. Always rejected when it differs.
    #[serde(default)]
    pub stage_order: Option<Vec<String>>,
    /// External dependencies the change would introduce.
    #[serde(default)]
    pub new_dependencies: Vec<String>,
    #[serde(default)]
    pub rationale: Option<String>,
}

impl ChangeProposal {
    pub fn touched_stages(&self) -> Vec<String> {
        let mut stages: Vec<String> = self.edits.iter().map(|e| e.stage.clone()).collect();
        stages.sort();
        stages.dedup();
        stages
    }
}

/// Saved content of a stage, used to restore it on rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub stage: String,
    pub content: String,
}

/// Hard constraint broken by a proposed change. Never overridden by score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuardrailViolation {
    #[error("diff of {lines} lines exceeds limit of {limit}")]
    DiffTooLarge { lines: usize, limit: usize },

    #[error("change touches multiple stages: {}", stages.join(", "))]
    MultipleStagesTouched { stages: Vec<String> },

    #[error("change touches stage '{touched}' but cycle targets '{target}'")]
    WrongStage { target: String, touched: String },

    #[error("change is empty")]
    EmptyChange,

    #[error("change alters function signatures in stage '{stage}'")]
    SignatureChanged { stage: String },

    #[error("change reorders pipeline stages")]
    StageReordered,

    #[error("change introduces external dependencies: {}", names.join(", "))]
    NewDependency { names: Vec<String> },

    #[error("wall-clock budget of {budget_secs}s exceeded")]
    WallClockExceeded { budget_secs: u64 },
}

impl GuardrailViolation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DiffTooLarge { .. } => "diff_too_large",
            Self::MultipleStagesTouched { .. } => "multiple_stages_touched",
            Self::WrongStage { .. } => "wrong_stage",
            Self::EmptyChange => "empty_change",
            Self::SignatureChanged { .. } => "signature_changed",
            Self::StageReordered => "stage_reordered",
            Self::NewDependency { .. } => "new_dependency",
            Self::WallClockExceeded { .. } => "wall_clock_exceeded",
        }
    }
}

/// Why a cycle was rolled back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RollbackReason {
    GuardrailViolation { violation: GuardrailViolation },
    RegressionDetected { regressions: u32 },
    NoImprovement { score_delta: f64 },
    ProposalFailed { message: String },
    PipelineFailed { message: String },
    /// A store write failed mid-cycle.
    PersistenceFailed { message: String },
    /// Another writer took the lease before the change could be committed.
    LeaseLost { owner: String },
}

impl RollbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GuardrailViolation { .. } => "guardrail_violation",
            Self::RegressionDetected { .. } => "regression_detected",
            Self::NoImprovement { .. } => "no_improvement",
            Self::ProposalFailed { .. } => "proposal_failed",
            Self::PipelineFailed { .. } => "pipeline_failed",
            Self::PersistenceFailed { .. } => "persistence_failed",
            Self::LeaseLost { .. } => "lease_lost",
        }
    }

    /// `guardrail_violation(diff_too_large)` style summary.
    pub fn summary(&self) -> String {
        match self {
            Self::GuardrailViolation { violation } => {
                format!("{}({})", self.as_str(), violation.kind())
            }
            Self::RegressionDetected { regressions } => {
                format!("{}({regressions})", self.as_str())
            }
            Self::NoImprovement { score_delta } => format!("{}({score_delta:+.4})", self.as_str()),
            Self::ProposalFailed { message }
            | Self::PipelineFailed { message }
            | Self::PersistenceFailed { message } => format!("{}: {message}", self.as_str()),
            Self::LeaseLost { owner } => format!("{}({owner})", self.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Committed,
    RolledBack,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "committed" => Some(Self::Committed),
            "rolled_back" => Some(Self::RolledBack),
            _ => None,
        }
    }
}

/// Audit record of one finished cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementCycle {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub target_stage: String,
    pub problem_statement: String,
    pub plan: CyclePlan,
    pub diff_size: usize,
    pub score_before: f64,
    pub score_after: Option<f64>,
    pub regressions_count: u32,
    pub improvements_count: u32,
    pub outcome: CycleOutcome,
    pub rollback_reason: Option<RollbackReason>,
    pub consumed_feedback_ids: Vec<Uuid>,
    /// Set on the commit that reached the human checkpoint interval.
    pub checkpoint_required: bool,
}

impl ImprovementCycle {
    pub fn score_delta(&self) -> Option<f64> {
        self.score_after.map(|after| after - self.score_before)
    }
}

/// A human acknowledging review of the committed cycles since the last one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanCheckpoint {
    pub id: Uuid,
    pub acknowledged_at: DateTime<Utc>,
    pub acknowledged_by: String,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let phase = CyclePhase::Review
            .transition(CyclePhase::Plan)
            .and_then(|p| p.transition(CyclePhase::Implement))
            .and_then(|p| p.transition(CyclePhase::Validate))
            .and_then(|p| p.transition(CyclePhase::Commit))
            .unwrap();
        assert!(phase.is_terminal());
    }

    #[test]
    fn test_cannot_skip_validate() {
        assert!(CyclePhase::Implement.transition(CyclePhase::Commit).is_err());
        assert!(CyclePhase::Review.transition(CyclePhase::Validate).is_err());
    }

    #[test]
    fn test_terminal_phases_are_final() {
        assert!(CyclePhase::Commit.transition(CyclePhase::Rollback).is_err());
        assert!(CyclePhase::Rollback.transition(CyclePhase::Review).is_err());
    }

    #[test]
    fn test_rollback_reason_summary() {
        let reason = RollbackReason::GuardrailViolation {
            violation: GuardrailViolation::DiffTooLarge {
                lines: 140,
                limit: 100,
            },
        };
        assert_eq!(reason.summary(), "guardrail_violation(diff_too_large)");
    }

    #[test]
    fn test_touched_stages_dedup() {
        let proposal = ChangeProposal {
            edits: vec![
                StageEdit {
                    stage: "echo_removal".into(),
                    new_content: "a".into(),
                },
                StageEdit {
                    stage: "echo_removal".into(),
                    new_content: "b".into(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(proposal.touched_stages(), vec!["echo_removal".to_string()]);
    }
}
