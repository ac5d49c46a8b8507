//! Regression runs against the stored corpus.

mod common;

use common::{single_edit, Harness, ScriptedProposer, BREAK_MARKER};
use gatekeep::domain::models::stage;
use gatekeep::domain::ports::{
    ChangeProposer, FixtureRepository, RegressionRunRepository, StagedPipeline,
};

#[tokio::test]
async fn test_passing_fixture_that_fails_is_a_regression() {
    let h = Harness::new(ScriptedProposer::appending_rule()).await;
    let greeting = h.add_fixture("conv-001", "Hi there.", "Hi there.").await;
    // The break line alone is not enough rules to answer q2.
    h.add_fixture("answer-2", "q2", "Answer 2.").await;
    let runner = h.runner();
    let lease = h.lease();

    let first = runner.run_now(&*h.pipeline, &lease).await.unwrap();
    assert_eq!(first.report.total, 2);
    assert_eq!(first.report.passed, 1);
    assert_eq!(first.report.regressions, 0);

    h.pipeline
        .apply(stage::ECHO_REMOVAL, &format!("{BREAK_MARKER}\n"))
        .await
        .unwrap();
    let second = runner.run_now(&*h.pipeline, &lease).await.unwrap();

    assert_eq!(second.report.regressions, 1);
    assert!(second.report.has_regressions());
    assert_eq!(second.report.regressed_fixture_ids, vec![greeting.id]);
    assert_eq!(second.report.passed, 0);

    let stored = h.ctx.fixtures.get(greeting.id).await.unwrap().unwrap();
    assert_eq!(stored.last_pass, Some(false));
    assert_eq!(stored.fail_count, 1);
    assert!(stored.last_regressed_at.is_some());

    let latest = h.ctx.runs.latest().await.unwrap().unwrap();
    assert_eq!(latest.id, second.report.run_id);
}

#[tokio::test]
async fn test_fixed_fixture_counts_as_improvement() {
    let h = Harness::new(ScriptedProposer::appending_rule()).await;
    let answer = h.add_fixture("answer-1", "q1", "Answer 1.").await;
    let runner = h.runner();
    let lease = h.lease();

    runner.run_now(&*h.pipeline, &lease).await.unwrap();
    let snapshot = h.pipeline.snapshot(stage::NOISE_FILTERING).await.unwrap();
    let plan = gatekeep::domain::models::CyclePlan {
        cycle_id: uuid::Uuid::new_v4(),
        target_stage: stage::NOISE_FILTERING.to_string(),
        problem_statement: String::new(),
        proposed_approach: String::new(),
        affected_fixture_ids: vec![answer.id],
        estimated_diff_lines: 1,
    };
    let proposal = h.proposer.propose(&plan, &snapshot).await.unwrap();
    h.pipeline
        .apply(stage::NOISE_FILTERING, &proposal.edits[0].new_content)
        .await
        .unwrap();

    let after = runner.run_now(&*h.pipeline, &lease).await.unwrap();
    assert_eq!(after.report.improvements, 1);
    assert_eq!(after.report.improved_fixture_ids, vec![answer.id]);
    assert_eq!(after.report.regressions, 0);
}

#[tokio::test]
async fn test_demoted_fixture_is_not_replayed() {
    let h = Harness::new(ScriptedProposer::new(|plan, _| {
        single_edit(&plan.target_stage, String::new())
    }))
    .await;
    h.add_fixture("conv-001", "Hi there.", "Hi there.").await;
    h.add_fixture("answer-1", "q1", "Answer 1.").await;
    h.ctx.fixture_service().demote("answer-1").await.unwrap();

    let evaluation = h.runner().run_now(&*h.pipeline, &h.lease()).await.unwrap();

    assert_eq!(evaluation.report.total, 1);
    assert_eq!(evaluation.report.passed, 1);
    assert!((evaluation.report.pass_rate - 1.0).abs() < f64::EPSILON);
}
