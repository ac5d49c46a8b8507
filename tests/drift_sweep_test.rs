//! Drift sweeps over stored captures.

mod common;

use chrono::Duration;
use common::{Harness, ScriptedProposer};
use gatekeep::domain::models::{
    Capture, OutputContract, QualityFlags, RecommendedAction, SectionSpec,
};
use gatekeep::domain::ports::{CaptureRepository, DriftRepository};

const BRIEF: &str = "## Weather\nSunny, forecast high of 21.\n\n## Calendar\nOne meeting at 10.";
const BRIEF_NO_SECTIONS: &str = "Nothing to report today.";

async fn brief_contract(h: &Harness) -> OutputContract {
    let mut contract = OutputContract::new("morning-brief");
    contract.required_sections = vec![
        SectionSpec::with_keywords("Weather", &["weather", "forecast"]),
        SectionSpec::with_keywords("Calendar", &["calendar", "meeting"]),
    ];
    contract.reference_examples = vec![BRIEF.to_string()];
    h.ctx.contract_registry().create(contract).await.unwrap()
}

async fn store(h: &Harness, capture: Capture) -> Capture {
    h.ctx.captures.insert(&capture).await.unwrap();
    capture
}

#[tokio::test]
async fn test_empty_upstream_points_at_data_source() {
    let h = Harness::new(ScriptedProposer::appending_rule()).await;
    let contract = brief_contract(&h).await;
    store(
        &h,
        Capture::new("", BRIEF_NO_SECTIONS, QualityFlags::default()).scheduled(Some(contract.id)),
    )
    .await;

    let summary = h
        .ctx
        .drift_detector()
        .unwrap()
        .sweep(Duration::hours(24))
        .await
        .unwrap();

    assert_eq!(summary.evaluated, 1);
    assert_eq!(summary.drifted, 1);
    assert_eq!(summary.by_action.get("check_data_source"), Some(&1));

    let records = h.ctx.drift.list_for_contract(contract.id, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].drifted);
    assert_eq!(records[0].recommended_action, RecommendedAction::CheckDataSource);
    assert!(records[0]
        .explanation
        .iter()
        .any(|line| line.contains("Weather") && line.contains("Calendar")));
}

#[tokio::test]
async fn test_missing_section_with_data_reinforces_instructions() {
    let h = Harness::new(ScriptedProposer::appending_rule()).await;
    let contract = brief_contract(&h).await;
    let input = "weather: sunny; calendar: 10:00 sync";
    store(
        &h,
        Capture::new(input, BRIEF_NO_SECTIONS, QualityFlags::default())
            .scheduled(Some(contract.id)),
    )
    .await;

    let summary = h
        .ctx
        .drift_detector()
        .unwrap()
        .sweep(Duration::hours(24))
        .await
        .unwrap();

    assert_eq!(summary.by_action.get("reinforce_section"), Some(&1));
}

#[tokio::test]
async fn test_compliant_output_is_recorded_once() {
    let h = Harness::new(ScriptedProposer::appending_rule()).await;
    let contract = brief_contract(&h).await;
    store(
        &h,
        Capture::new("weather and calendar", BRIEF, QualityFlags::default())
            .with_contract(contract.id),
    )
    .await;
    // No contract: never considered.
    store(&h, Capture::new("hi", "Hi there.", QualityFlags::default())).await;

    let detector = h.ctx.drift_detector().unwrap();
    let first = detector.sweep(Duration::hours(24)).await.unwrap();
    assert_eq!(first.considered, 1);
    assert_eq!(first.evaluated, 1);
    assert_eq!(first.drifted, 0);

    let second = detector.sweep(Duration::hours(24)).await.unwrap();
    assert_eq!(second.evaluated, 0);
    assert_eq!(second.already_evaluated, 1);

    let records = h.ctx.drift.list_for_contract(contract.id, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].recommended_action, RecommendedAction::None);
}

#[tokio::test]
async fn test_deleted_contract_is_skipped() {
    let h = Harness::new(ScriptedProposer::appending_rule()).await;
    let contract = brief_contract(&h).await;
    store(
        &h,
        Capture::new("", BRIEF_NO_SECTIONS, QualityFlags::default()).scheduled(Some(contract.id)),
    )
    .await;
    h.ctx.contract_registry().delete(contract.id).await.unwrap();

    let summary = h
        .ctx
        .drift_detector()
        .unwrap()
        .sweep(Duration::hours(24))
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.evaluated, 0);
}

#[tokio::test]
async fn test_unreadable_contract_does_not_stop_the_sweep() {
    let h = Harness::new(ScriptedProposer::appending_rule()).await;
    let good = brief_contract(&h).await;
    let corrupt = h
        .ctx
        .contract_registry()
        .create(OutputContract::new("evening-digest"))
        .await
        .unwrap();
    sqlx::query("UPDATE output_contracts SET definition = '{not json' WHERE id = ?")
        .bind(corrupt.id.to_string())
        .execute(&h.ctx.pool)
        .await
        .unwrap();
    store(
        &h,
        Capture::new("", "Nothing tonight.", QualityFlags::default()).scheduled(Some(corrupt.id)),
    )
    .await;
    store(
        &h,
        Capture::new("", BRIEF_NO_SECTIONS, QualityFlags::default()).scheduled(Some(good.id)),
    )
    .await;

    let summary = h
        .ctx
        .drift_detector()
        .unwrap()
        .sweep(Duration::hours(24))
        .await
        .unwrap();

    assert_eq!(summary.considered, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.evaluated, 1);
    assert_eq!(h.ctx.drift.list_for_contract(good.id, 10).await.unwrap().len(), 1);
    assert!(h.ctx.drift.list_for_contract(corrupt.id, 10).await.unwrap().is_empty());
}
