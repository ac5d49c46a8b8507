//! Improvement cycle service.
//!
//! Drives one guardrailed mutation of the pipeline:
//! 1. Review: baseline regression run, pending feedback, recent drift
//! 2. Plan: pick the stage with the strongest signal and consume its feedback
//! 3. Implement: ask the proposer for a change and check it against guardrails
//! 4. Validate: re-run the corpus against the changed pipeline
//! 5. Commit or Rollback
//!
//! At most one cycle runs at a time; the writer lease enforces it across
//! processes. After a fixed number of commits a human must acknowledge a
//! checkpoint before the next cycle may start.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ChangeProposal, CycleConfig, CycleOutcome, CyclePhase, CyclePlan, FeedbackItem,
    FeedbackStatus, Fixture, GuardrailViolation, HumanCheckpoint, ImprovementCycle,
    RegressionEvaluation, RollbackReason, StageSnapshot,
};
use crate::domain::ports::{
    ChangeProposer, CycleRepository, DriftRepository, FeedbackRepository, NotificationEvent,
    Notifier, StagedPipeline,
};
use crate::services::checkpoint::{CheckpointLedger, CheckpointStatus};
use crate::services::guardrails::{ChangeGuardrails, GuardrailResult};
use crate::services::regression_runner::RegressionRunner;
use crate::services::signal_accumulator::{SignalAccumulator, StageSignal};
use crate::services::writer_lease::WriterLease;

/// Float slack when comparing score deltas.
const SCORE_EPSILON: f64 = 1e-9;

/// The commit predicate: no regressions, and either a fixture improved or the
/// mean score rose by at least `min_delta`.
pub fn should_commit(
    score_before: f64,
    score_after: f64,
    regressions: u32,
    improvements: u32,
    min_delta: f64,
) -> bool {
    regressions == 0
        && (improvements > 0 || score_after - score_before + SCORE_EPSILON >= min_delta)
}

/// Why a cycle did not run past Review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// No fixture failure, feedback or drift pointed at any stage.
    NoSignal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CycleRunResult {
    Skipped { reason: SkipReason },
    Finished { cycle: Box<ImprovementCycle> },
}

/// State carried from Plan into the terminal phase.
struct CycleDraft {
    id: Uuid,
    started_at: chrono::DateTime<Utc>,
    plan: CyclePlan,
    baseline: RegressionEvaluation,
    consumed: Vec<FeedbackItem>,
}

/// How far a change got into the pipeline before it was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageState {
    Untouched,
    Applied,
    Persisted,
}

/// A commit that stopped before its audit record was written.
struct CommitFailure {
    state: StageState,
    reason: RollbackReason,
}

/// What Implement and Validate produced.
enum Attempt {
    Validated {
        diff_lines: usize,
        validation: RegressionEvaluation,
    },
    Aborted {
        diff_lines: usize,
        reason: RollbackReason,
        applied: bool,
    },
}

pub struct ImprovementCycleService {
    config: CycleConfig,
    runner: Arc<RegressionRunner>,
    pipeline: Arc<dyn StagedPipeline>,
    proposer: Arc<dyn ChangeProposer>,
    feedback: Arc<dyn FeedbackRepository>,
    drift: Arc<dyn DriftRepository>,
    cycles: Arc<dyn CycleRepository>,
    lease: WriterLease,
    guardrails: ChangeGuardrails,
    checkpoints: CheckpointLedger,
    notifier: Option<Arc<dyn Notifier>>,
}

impl ImprovementCycleService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CycleConfig,
        runner: Arc<RegressionRunner>,
        pipeline: Arc<dyn StagedPipeline>,
        proposer: Arc<dyn ChangeProposer>,
        feedback: Arc<dyn FeedbackRepository>,
        drift: Arc<dyn DriftRepository>,
        cycles: Arc<dyn CycleRepository>,
        lease: WriterLease,
    ) -> DomainResult<Self> {
        let guardrails = ChangeGuardrails::new(&config)?;
        let checkpoints = CheckpointLedger::new(cycles.clone(), config.checkpoint_interval);
        Ok(Self {
            config,
            runner,
            pipeline,
            proposer,
            feedback,
            drift,
            cycles,
            lease,
            guardrails,
            checkpoints,
            notifier: None,
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub async fn checkpoint_status(&self) -> DomainResult<CheckpointStatus> {
        self.checkpoints.status().await
    }

    /// Record a human review of the cycles committed so far, unblocking new cycles.
    pub async fn acknowledge_checkpoint(
        &self,
        acknowledged_by: &str,
        note: Option<String>,
    ) -> DomainResult<HumanCheckpoint> {
        self.checkpoints.acknowledge(acknowledged_by, note).await
    }

    /// Run one cycle under the writer lease.
    pub async fn run_cycle(&self) -> DomainResult<CycleRunResult> {
        let guard = self.lease.hold().await?;
        let result = self.run_locked().await;
        guard.release().await;
        result
    }

    async fn run_locked(&self) -> DomainResult<CycleRunResult> {
        let status = self.checkpoint_status().await?;
        if status.required() {
            tracing::warn!(
                committed = status.committed_since,
                "Improvement cycle refused until a human checkpoint is acknowledged"
            );
            return Err(DomainError::HumanCheckpointRequired {
                committed: status.committed_since,
            });
        }

        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut phase = CyclePhase::Review;
        tracing::info!(cycle_id = %id, phase = phase.as_str(), "Improvement cycle started");

        let fixtures = self.runner.active_fixtures().await?;
        let baseline = self.runner.evaluate(&fixtures, &*self.pipeline).await;
        let pending = self.feedback.pending().await?;
        let since = started_at - chrono::Duration::hours(self.config.drift_lookback_hours);
        let drift = self.drift.list_since(since).await?;

        let signals =
            SignalAccumulator::from_review(&baseline.outcomes, &pending, &drift, &self.config);
        let Some((target, signal)) = signals.winner() else {
            tracing::info!(cycle_id = %id, "No improvement signal, cycle skipped");
            return Ok(CycleRunResult::Skipped {
                reason: SkipReason::NoSignal,
            });
        };
        let target = target.to_string();
        let signal = signal.clone();

        self.runner.record(&baseline).await?;

        phase = phase.transition(CyclePhase::Plan)?;
        let plan = self.plan(id, &target, &signal, &baseline);
        tracing::info!(
            cycle_id = %id,
            phase = phase.as_str(),
            stage = %target,
            signal = signal.score,
            "Cycle planned"
        );
        let mut draft = CycleDraft {
            id,
            started_at,
            plan,
            baseline,
            consumed: Vec::new(),
        };

        let snapshot = match self.pipeline.snapshot(&target).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                phase.transition(CyclePhase::Rollback)?;
                let reason = pipeline_failed(e);
                let cycle = self
                    .rollback(&draft, None, StageState::Untouched, 0, None, reason)
                    .await?;
                return Ok(finished(cycle));
            }
        };
        if let Err(e) = self.consume_feedback(&mut draft, &pending, &signal).await {
            phase.transition(CyclePhase::Rollback)?;
            let reason = persistence_failed(e);
            let cycle = self
                .rollback(&draft, None, StageState::Untouched, 0, None, reason)
                .await?;
            return Ok(finished(cycle));
        }

        phase = phase.transition(CyclePhase::Implement)?;
        tracing::info!(cycle_id = %id, phase = phase.as_str(), "Implementing change");
        let attempt = self.implement_and_validate(&draft, &snapshot, &fixtures, &mut phase).await;

        let cycle = match attempt {
            Attempt::Validated {
                diff_lines,
                validation,
            } => {
                let before = draft.baseline.report.overall_score;
                let after = validation.report.overall_score;
                let report = &validation.report;
                if should_commit(
                    before,
                    after,
                    report.regressions,
                    report.improvements,
                    self.config.min_score_delta,
                ) {
                    match self
                        .commit(&draft, diff_lines, &validation, status.committed_since)
                        .await
                    {
                        Ok(cycle) => {
                            phase.transition(CyclePhase::Commit)?;
                            self.committed(cycle, &validation).await?
                        }
                        Err(CommitFailure { state, reason }) => {
                            phase.transition(CyclePhase::Rollback)?;
                            self.rollback(
                                &draft,
                                Some(&snapshot),
                                state,
                                diff_lines,
                                Some(&validation),
                                reason,
                            )
                            .await?
                        }
                    }
                } else {
                    phase.transition(CyclePhase::Rollback)?;
                    let reason = if report.has_regressions() {
                        RollbackReason::RegressionDetected {
                            regressions: report.regressions,
                        }
                    } else {
                        RollbackReason::NoImprovement {
                            score_delta: after - before,
                        }
                    };
                    self.rollback(
                        &draft,
                        Some(&snapshot),
                        StageState::Applied,
                        diff_lines,
                        Some(&validation),
                        reason,
                    )
                    .await?
                }
            }
            Attempt::Aborted {
                diff_lines,
                reason,
                applied,
            } => {
                phase.transition(CyclePhase::Rollback)?;
                let state = if applied {
                    StageState::Applied
                } else {
                    StageState::Untouched
                };
                self.rollback(&draft, Some(&snapshot), state, diff_lines, None, reason)
                    .await?
            }
        };

        Ok(finished(cycle))
    }

    fn plan(
        &self,
        cycle_id: Uuid,
        target: &str,
        signal: &StageSignal,
        baseline: &RegressionEvaluation,
    ) -> CyclePlan {
        let mut problems = Vec::new();
        if signal.dimension_failure_count() > 0 {
            let dims = signal
                .dimension_failures
                .iter()
                .map(|(d, n)| format!("{d} x{n}"))
                .collect::<Vec<_>>()
                .join(", ");
            problems.push(format!(
                "{} fixture(s) failing ({dims})",
                signal.affected_fixture_ids.len()
            ));
        }
        if signal.feedback_count() > 0 {
            problems.push(format!("{} pending feedback item(s)", signal.feedback_count()));
        }
        if signal.drift_count() > 0 {
            let actions = signal
                .drift_actions
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            problems.push(format!(
                "{} drift recommendation(s) ({actions})",
                signal.drift_count()
            ));
        }
        let problem_statement = format!("Stage '{target}': {}", problems.join("; "));
        let proposed_approach = format!(
            "Make one bounded edit to stage '{target}' that fixes the listed failures \
             without touching any other stage (baseline score {:.3}, pass rate {:.1}%)",
            baseline.report.overall_score,
            baseline.report.pass_rate * 100.0
        );
        let weight = signal.score.ceil().max(1.0) as usize;
        CyclePlan {
            cycle_id,
            target_stage: target.to_string(),
            problem_statement,
            proposed_approach,
            affected_fixture_ids: signal.affected_fixture_ids.iter().copied().collect(),
            estimated_diff_lines: (weight * 5).min(self.config.max_diff_lines),
        }
    }

    /// Mark the target stage's feedback `processing`. Items already marked
    /// stay on the draft even when a later update fails.
    async fn consume_feedback(
        &self,
        draft: &mut CycleDraft,
        pending: &[FeedbackItem],
        signal: &StageSignal,
    ) -> DomainResult<()> {
        for item in pending.iter().filter(|i| signal.feedback_ids.contains(&i.id)) {
            self.feedback
                .update_status(item.id, FeedbackStatus::Processing, Some(draft.id), None)
                .await?;
            draft.consumed.push(item.clone());
        }
        Ok(())
    }

    async fn implement_and_validate(
        &self,
        draft: &CycleDraft,
        snapshot: &StageSnapshot,
        fixtures: &[Fixture],
        phase: &mut CyclePhase,
    ) -> Attempt {
        let budget_secs = self.config.wall_clock_budget_secs;
        let budget = Duration::from_secs(budget_secs);
        let mut applied = false;
        let mut diff_lines = 0;

        let work = async {
            let proposal = match self.proposer.propose(&draft.plan, snapshot).await {
                Ok(proposal) => proposal,
                Err(e) => {
                    return Err(RollbackReason::ProposalFailed {
                        message: e.to_string(),
                    })
                }
            };
            let order = self.pipeline.stages().await.map_err(pipeline_failed)?;
            diff_lines = match self.guardrails.check(
                &draft.plan.target_stage,
                &proposal,
                snapshot,
                &order,
            ) {
                GuardrailResult::Allowed { diff_lines } => diff_lines,
                GuardrailResult::Blocked(violation) => {
                    return Err(RollbackReason::GuardrailViolation { violation });
                }
            };
            self.apply(&draft.plan.target_stage, &proposal, &mut applied)
                .await?;

            *phase = phase
                .transition(CyclePhase::Validate)
                .map_err(pipeline_failed)?;
            tracing::info!(
                cycle_id = %draft.id,
                phase = phase.as_str(),
                diff_lines,
                "Validating change"
            );
            let fixtures = with_history(fixtures, &draft.baseline);
            Ok(self.runner.evaluate(&fixtures, &*self.pipeline).await)
        };

        let outcome = tokio::time::timeout(budget, work).await;
        match outcome {
            Ok(Ok(validation)) => Attempt::Validated {
                diff_lines,
                validation,
            },
            Ok(Err(reason)) => Attempt::Aborted {
                diff_lines,
                reason,
                applied,
            },
            Err(_) => {
                tracing::warn!(
                    cycle_id = %draft.id,
                    budget_secs,
                    "Cycle exceeded wall-clock budget"
                );
                Attempt::Aborted {
                    diff_lines,
                    reason: RollbackReason::GuardrailViolation {
                        violation: GuardrailViolation::WallClockExceeded { budget_secs },
                    },
                    applied,
                }
            }
        }
    }

    async fn apply(
        &self,
        stage: &str,
        proposal: &ChangeProposal,
        applied: &mut bool,
    ) -> Result<(), RollbackReason> {
        if let Some(edit) = proposal.edits.last() {
            *applied = true;
            self.pipeline
                .apply(stage, &edit.new_content)
                .await
                .map_err(pipeline_failed)?;
        }
        Ok(())
    }

    /// Make the change durable and write the committed audit record. Any
    /// failure before the record exists is handed back for a rollback.
    async fn commit(
        &self,
        draft: &CycleDraft,
        diff_lines: usize,
        validation: &RegressionEvaluation,
        committed_before: u32,
    ) -> Result<ImprovementCycle, CommitFailure> {
        if let Err(e) = self.lease.ensure_held().await {
            tracing::error!(cycle_id = %draft.id, error = %e, "Commit refused");
            return Err(CommitFailure {
                state: StageState::Applied,
                reason: RollbackReason::LeaseLost {
                    owner: self.lease.owner().to_string(),
                },
            });
        }
        if let Err(e) = self.pipeline.persist(&draft.plan.target_stage).await {
            return Err(CommitFailure {
                state: StageState::Applied,
                reason: pipeline_failed(e),
            });
        }

        let note = format!("resolved by improvement cycle {}", draft.id);
        for item in &draft.consumed {
            if let Err(e) = self
                .feedback
                .update_status(item.id, FeedbackStatus::Resolved, Some(draft.id), Some(&note))
                .await
            {
                return Err(CommitFailure {
                    state: StageState::Persisted,
                    reason: persistence_failed(e),
                });
            }
        }

        let checkpoint_required = committed_before + 1 >= self.config.checkpoint_interval;
        let cycle = self.finish(
            draft,
            diff_lines,
            Some(validation),
            CycleOutcome::Committed,
            None,
            checkpoint_required,
        );
        if let Err(e) = self.cycles.append(&cycle).await {
            return Err(CommitFailure {
                state: StageState::Persisted,
                reason: persistence_failed(e),
            });
        }
        Ok(cycle)
    }

    /// The commit is on record; apply the validation history and announce it.
    async fn committed(
        &self,
        cycle: ImprovementCycle,
        validation: &RegressionEvaluation,
    ) -> DomainResult<ImprovementCycle> {
        if let Err(e) = self.runner.record(validation).await {
            tracing::error!(
                cycle_id = %cycle.id,
                error = %e,
                "Committed cycle could not record fixture history"
            );
            return Err(e);
        }

        tracing::info!(
            cycle_id = %cycle.id,
            stage = %cycle.target_stage,
            score_before = cycle.score_before,
            score_after = ?cycle.score_after,
            improvements = cycle.improvements_count,
            checkpoint_required = cycle.checkpoint_required,
            "Improvement cycle committed"
        );
        self.notify(NotificationEvent::CycleCommitted {
            cycle_id: cycle.id,
            stage: cycle.target_stage.clone(),
            score_delta: cycle.score_delta().unwrap_or_default(),
            regressions: cycle.regressions_count,
            improvements: cycle.improvements_count,
            checkpoint_required: cycle.checkpoint_required,
        })
        .await;
        Ok(cycle)
    }

    /// Undo whatever reached the pipeline, hand consumed feedback back and
    /// write the rolled-back audit record. Only the record write is fatal.
    async fn rollback(
        &self,
        draft: &CycleDraft,
        snapshot: Option<&StageSnapshot>,
        state: StageState,
        diff_lines: usize,
        validation: Option<&RegressionEvaluation>,
        reason: RollbackReason,
    ) -> DomainResult<ImprovementCycle> {
        if let Some(snapshot) = snapshot.filter(|_| state != StageState::Untouched) {
            self.restore(snapshot, state).await;
        }
        for item in &draft.consumed {
            if let Err(e) = self
                .feedback
                .update_status(item.id, FeedbackStatus::Pending, None, None)
                .await
            {
                tracing::error!(
                    cycle_id = %draft.id,
                    feedback_id = %item.id,
                    error = %e,
                    "Failed to return feedback to pending"
                );
            }
        }

        let cycle = self.finish(
            draft,
            diff_lines,
            validation,
            CycleOutcome::RolledBack,
            Some(reason.clone()),
            false,
        );
        self.cycles.append(&cycle).await?;

        tracing::warn!(
            cycle_id = %cycle.id,
            stage = %draft.plan.target_stage,
            reason = %reason.summary(),
            "Improvement cycle rolled back"
        );
        self.notify(NotificationEvent::CycleRolledBack {
            cycle_id: cycle.id,
            stage: draft.plan.target_stage.clone(),
            score_delta: cycle.score_delta(),
            regressions: cycle.regressions_count,
            improvements: cycle.improvements_count,
            reason: reason.summary(),
        })
        .await;
        Ok(cycle)
    }

    async fn restore(&self, snapshot: &StageSnapshot, state: StageState) {
        let mut result = self.pipeline.restore(snapshot).await;
        if result.is_ok() && state == StageState::Persisted {
            result = self.pipeline.persist(&snapshot.stage).await;
        }
        if let Err(e) = result {
            tracing::error!(
                stage = %snapshot.stage,
                error = %e,
                "Failed to restore stage after rollback"
            );
        }
    }

    fn finish(
        &self,
        draft: &CycleDraft,
        diff_lines: usize,
        validation: Option<&RegressionEvaluation>,
        outcome: CycleOutcome,
        rollback_reason: Option<RollbackReason>,
        checkpoint_required: bool,
    ) -> ImprovementCycle {
        ImprovementCycle {
            id: draft.id,
            started_at: draft.started_at,
            finished_at: Utc::now(),
            target_stage: draft.plan.target_stage.clone(),
            problem_statement: draft.plan.problem_statement.clone(),
            plan: draft.plan.clone(),
            diff_size: diff_lines,
            score_before: draft.baseline.report.overall_score,
            score_after: validation.map(|v| v.report.overall_score),
            regressions_count: validation.map_or(0, |v| v.report.regressions),
            improvements_count: validation.map_or(0, |v| v.report.improvements),
            outcome,
            rollback_reason,
            consumed_feedback_ids: draft.consumed.iter().map(|i| i.id).collect(),
            checkpoint_required,
        }
    }

    async fn notify(&self, event: NotificationEvent) {
        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notify(&event).await {
                tracing::warn!(event = event.name(), error = %e, "Failed to send notification");
            }
        }
    }

    pub async fn history(&self, limit: usize) -> DomainResult<Vec<ImprovementCycle>> {
        self.checkpoints.history(limit).await
    }
}

fn finished(cycle: ImprovementCycle) -> CycleRunResult {
    CycleRunResult::Finished {
        cycle: Box::new(cycle),
    }
}

fn persistence_failed(e: DomainError) -> RollbackReason {
    RollbackReason::PersistenceFailed {
        message: e.to_string(),
    }
}

fn pipeline_failed(e: DomainError) -> RollbackReason {
    RollbackReason::PipelineFailed {
        message: e.to_string(),
    }
}

/// Fixtures as they stand after the baseline history has been applied.
fn with_history(fixtures: &[Fixture], baseline: &RegressionEvaluation) -> Vec<Fixture> {
    fixtures
        .iter()
        .cloned()
        .map(|mut fixture| {
            if let Some(update) = baseline
                .history_updates
                .iter()
                .find(|u| u.fixture_id == fixture.id)
            {
                fixture.apply_history(update);
            }
            fixture
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_predicate() {
        assert!(!should_commit(0.90, 0.90, 0, 0, 0.005));
        assert!(should_commit(0.90, 0.906, 0, 0, 0.005));
        assert!(should_commit(0.90, 0.905, 0, 0, 0.005));
        assert!(should_commit(0.90, 0.80, 0, 1, 0.005));
        assert!(!should_commit(0.90, 0.99, 1, 3, 0.005));
    }
}
