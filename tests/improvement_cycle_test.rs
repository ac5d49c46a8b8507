//! Improvement cycle scenarios against an in-memory pipeline.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{single_edit, Harness, ScriptedProposer, BREAK_MARKER};
use gatekeep::domain::errors::DomainError;
use gatekeep::domain::models::{
    stage, ChangeProposal, Config, CycleOutcome, FeedbackPriority, FeedbackStatus,
    GuardrailViolation, ImprovementCycle, InputMethod, RollbackReason, StageEdit,
};
use gatekeep::domain::ports::{CycleRepository, FeedbackRepository, FixtureRepository};
use gatekeep::services::{CycleRunResult, NewFeedback, SkipReason, WriterLease};

fn finished(result: CycleRunResult) -> ImprovementCycle {
    match result {
        CycleRunResult::Finished { cycle } => *cycle,
        CycleRunResult::Skipped { reason } => panic!("cycle skipped: {reason:?}"),
    }
}

async fn echo_feedback(h: &Harness) -> uuid::Uuid {
    h.ctx
        .feedback_intake()
        .record(NewFeedback {
            input_method: Some(InputMethod::Command),
            category: Some(stage::ECHO_REMOVAL.to_string()),
            description: Some("the reply repeats my question".into()),
            linked_capture_id: None,
            priority: FeedbackPriority::High,
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_no_signal_skips_without_persisting() {
    let h = Harness::new(ScriptedProposer::appending_rule()).await;
    h.add_fixture("conv-001", "Hi there.", "Hi there.").await;

    let result = h.cycle_service().run_cycle().await.unwrap();

    assert_eq!(
        result,
        CycleRunResult::Skipped {
            reason: SkipReason::NoSignal
        }
    );
    assert_eq!(h.proposer.calls(), 0);
    assert!(h.ctx.cycles.list(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_diff_rolls_back_before_validate() {
    let h = Harness::new(ScriptedProposer::new(|plan, _| {
        let body: String = (0..140).map(|i| format!("rule {i}\n")).collect();
        single_edit(&plan.target_stage, body)
    }))
    .await;
    h.add_fixture("conv-001", "Hi there.", "Hi there.").await;
    let feedback_id = echo_feedback(&h).await;

    let cycle = finished(h.cycle_service().run_cycle().await.unwrap());

    assert_eq!(cycle.target_stage, stage::ECHO_REMOVAL);
    assert_eq!(cycle.outcome, CycleOutcome::RolledBack);
    assert_eq!(
        cycle.rollback_reason,
        Some(RollbackReason::GuardrailViolation {
            violation: GuardrailViolation::DiffTooLarge {
                lines: 140,
                limit: 100
            }
        })
    );
    assert_eq!(
        cycle.rollback_reason.as_ref().map(RollbackReason::summary),
        Some("guardrail_violation(diff_too_large)".to_string())
    );
    // Validate never ran.
    assert_eq!(cycle.score_after, None);
    assert_eq!(h.pipeline.content(stage::ECHO_REMOVAL), "");

    let item = h.ctx.feedback.get(feedback_id).await.unwrap().unwrap();
    assert_eq!(item.status, FeedbackStatus::Pending);
    assert_eq!(item.consumed_by_cycle_id, None);
    assert_eq!(h.ctx.cycles.list(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_change_touching_two_stages_is_rejected() {
    let h = Harness::new(ScriptedProposer::new(|plan, _| ChangeProposal {
        edits: vec![
            StageEdit {
                stage: plan.target_stage.clone(),
                new_content: "strip echoes\n".into(),
            },
            StageEdit {
                stage: stage::NOISE_FILTERING.to_string(),
                new_content: "drop noise\n".into(),
            },
        ],
        ..Default::default()
    }))
    .await;
    h.add_fixture("conv-001", "Hi there.", "Hi there.").await;
    echo_feedback(&h).await;

    let cycle = finished(h.cycle_service().run_cycle().await.unwrap());

    assert!(matches!(
        cycle.rollback_reason,
        Some(RollbackReason::GuardrailViolation {
            violation: GuardrailViolation::MultipleStagesTouched { .. }
        })
    ));
    assert_eq!(cycle.score_after, None);
    assert_eq!(h.pipeline.content(stage::ECHO_REMOVAL), "");
    assert_eq!(h.pipeline.content(stage::NOISE_FILTERING), "");
}

#[tokio::test]
async fn test_regressing_change_is_restored() {
    let h = Harness::new(ScriptedProposer::new(|plan, _| {
        single_edit(&plan.target_stage, format!("{BREAK_MARKER}\n"))
    }))
    .await;
    let fixture = h.add_fixture("conv-001", "Hi there.", "Hi there.").await;
    echo_feedback(&h).await;

    let cycle = finished(h.cycle_service().run_cycle().await.unwrap());

    assert_eq!(cycle.outcome, CycleOutcome::RolledBack);
    assert_eq!(
        cycle.rollback_reason,
        Some(RollbackReason::RegressionDetected { regressions: 1 })
    );
    assert_eq!(cycle.regressions_count, 1);
    assert!(cycle.score_after.is_some());
    assert_eq!(h.pipeline.content(stage::ECHO_REMOVAL), "");
    assert!(h.pipeline.persisted().is_empty());

    // Only the baseline was recorded, so the fixture still reads as passing.
    let stored = h.ctx.fixtures.get(fixture.id).await.unwrap().unwrap();
    assert_eq!(stored.last_pass, Some(true));
}

#[tokio::test]
async fn test_unchanged_score_is_not_committed() {
    let h = Harness::new(ScriptedProposer::appending_rule()).await;
    h.add_fixture("conv-001", "Hi there.", "Hi there.").await;
    echo_feedback(&h).await;

    let cycle = finished(h.cycle_service().run_cycle().await.unwrap());

    assert_eq!(cycle.outcome, CycleOutcome::RolledBack);
    assert!(matches!(
        cycle.rollback_reason,
        Some(RollbackReason::NoImprovement { .. })
    ));
    assert_eq!(h.pipeline.content(stage::ECHO_REMOVAL), "");
}

#[tokio::test]
async fn test_improving_change_commits_and_resolves_feedback() {
    let h = Harness::new(ScriptedProposer::appending_rule()).await;
    h.add_fixture("answer-1", "q1", "Answer 1.").await;
    let feedback_id = echo_feedback(&h).await;

    let cycle = finished(h.cycle_service().run_cycle().await.unwrap());

    assert_eq!(cycle.outcome, CycleOutcome::Committed);
    assert_eq!(cycle.improvements_count, 1);
    assert_eq!(cycle.regressions_count, 0);
    assert!(cycle.score_delta().unwrap() > 0.0);
    assert_eq!(cycle.consumed_feedback_ids, vec![feedback_id]);
    assert_eq!(h.pipeline.persisted(), vec![cycle.target_stage.clone()]);

    let item = h.ctx.feedback.get(feedback_id).await.unwrap().unwrap();
    assert_eq!(item.status, FeedbackStatus::Resolved);
    assert_eq!(item.consumed_by_cycle_id, Some(cycle.id));
}

#[tokio::test]
async fn test_sixth_commit_waits_for_human_checkpoint() {
    let h = Harness::new(ScriptedProposer::appending_rule()).await;
    for n in 1..=6 {
        h.add_fixture(&format!("answer-{n}"), &format!("q{n}"), &format!("Answer {n}."))
            .await;
    }
    let service = h.cycle_service();

    for n in 1..=5u32 {
        let cycle = finished(service.run_cycle().await.unwrap());
        assert_eq!(cycle.outcome, CycleOutcome::Committed, "cycle {n}");
        assert_eq!(cycle.checkpoint_required, n == 5);
    }

    let blocked = service.run_cycle().await;
    assert!(matches!(
        blocked,
        Err(DomainError::HumanCheckpointRequired { committed: 5 })
    ));
    assert_eq!(h.proposer.calls(), 5);
    assert!(service.checkpoint_status().await.unwrap().required());

    service
        .acknowledge_checkpoint("reviewer", Some("five small rules, all fine".into()))
        .await
        .unwrap();
    let cycle = finished(service.run_cycle().await.unwrap());
    assert_eq!(cycle.outcome, CycleOutcome::Committed);
    assert_eq!(service.checkpoint_status().await.unwrap().committed_since, 1);
}

#[tokio::test]
async fn test_unreadable_stage_rolls_back_and_keeps_feedback_pending() {
    let h = Harness::new(ScriptedProposer::appending_rule()).await;
    h.add_fixture("conv-001", "Hi there.", "Hi there.").await;
    let feedback_id = echo_feedback(&h).await;
    h.pipeline.fail_snapshots();

    let cycle = finished(h.cycle_service().run_cycle().await.unwrap());

    assert_eq!(cycle.outcome, CycleOutcome::RolledBack);
    assert!(matches!(
        cycle.rollback_reason,
        Some(RollbackReason::PipelineFailed { .. })
    ));
    assert!(cycle.consumed_feedback_ids.is_empty());
    assert_eq!(h.proposer.calls(), 0);

    let item = h.ctx.feedback.get(feedback_id).await.unwrap().unwrap();
    assert_eq!(item.status, FeedbackStatus::Pending);
    assert_eq!(item.consumed_by_cycle_id, None);
    assert_eq!(h.ctx.feedback.pending().await.unwrap().len(), 1);
    assert_eq!(h.ctx.cycles.list(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_persist_restores_stage_and_feedback() {
    let h = Harness::new(ScriptedProposer::appending_rule()).await;
    let fixture = h.add_fixture("answer-1", "q1", "Answer 1.").await;
    let feedback_id = echo_feedback(&h).await;
    h.pipeline.fail_persists();

    let cycle = finished(h.cycle_service().run_cycle().await.unwrap());

    assert_eq!(cycle.outcome, CycleOutcome::RolledBack);
    assert!(matches!(
        cycle.rollback_reason,
        Some(RollbackReason::PipelineFailed { ref message }) if message.contains("disk full")
    ));
    assert_eq!(cycle.consumed_feedback_ids, vec![feedback_id]);
    assert_eq!(h.pipeline.content(stage::ECHO_REMOVAL), "");
    assert!(h.pipeline.persisted().is_empty());

    let item = h.ctx.feedback.get(feedback_id).await.unwrap().unwrap();
    assert_eq!(item.status, FeedbackStatus::Pending);
    let stored = h.ctx.fixtures.get(fixture.id).await.unwrap().unwrap();
    assert_eq!(stored.last_pass, Some(false));

    let audit = h.ctx.cycles.list(10).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].outcome, CycleOutcome::RolledBack);
}

#[tokio::test]
async fn test_slow_validation_exceeds_wall_clock_budget() {
    let mut config = Config::default();
    config.cycle.wall_clock_budget_secs = 1;
    let h = Harness::with_config(config, ScriptedProposer::appending_rule()).await;
    h.add_fixture("conv-001", "Hi there.", "Hi there.").await;
    let feedback_id = echo_feedback(&h).await;
    h.pipeline.set_delay(Duration::from_millis(1200));

    let cycle = finished(h.cycle_service().run_cycle().await.unwrap());

    assert_eq!(
        cycle.rollback_reason,
        Some(RollbackReason::GuardrailViolation {
            violation: GuardrailViolation::WallClockExceeded { budget_secs: 1 }
        })
    );
    assert_eq!(
        cycle.rollback_reason.as_ref().map(RollbackReason::summary),
        Some("guardrail_violation(wall_clock_exceeded)".to_string())
    );
    assert_eq!(cycle.score_after, None);
    assert_eq!(h.proposer.calls(), 1);
    assert_eq!(h.pipeline.content(stage::ECHO_REMOVAL), "");

    let item = h.ctx.feedback.get(feedback_id).await.unwrap().unwrap();
    assert_eq!(item.status, FeedbackStatus::Pending);
}

#[tokio::test]
async fn test_long_cycle_keeps_the_writer_lease() {
    let h = Harness::new(ScriptedProposer::appending_rule()).await;
    h.add_fixture("conv-001", "Hi there.", "Hi there.").await;
    echo_feedback(&h).await;
    h.pipeline.set_delay(Duration::from_millis(1500));

    let lease = WriterLease::with_owner(h.ctx.leases.clone(), "cycle", Duration::from_secs(1));
    let service = Arc::new(h.cycle_service_with_lease(lease));
    let running = tokio::spawn({
        let service = service.clone();
        async move { service.run_cycle().await }
    });

    tokio::time::sleep(Duration::from_millis(2200)).await;
    let manual =
        WriterLease::with_owner(h.ctx.leases.clone(), "manual-run", Duration::from_secs(60));
    assert!(matches!(
        manual.acquire().await,
        Err(DomainError::LeaseHeld { ref owner, .. }) if owner == "cycle"
    ));

    let cycle = finished(running.await.unwrap().unwrap());
    assert_eq!(cycle.outcome, CycleOutcome::RolledBack);
    manual.acquire().await.unwrap();
}
