//! Regression runner.
//!
//! Replays the transform over every active fixture, scores each output for
//! transform fidelity and compares the verdict with the fixture's previous
//! one. History write-back is computed during the run but applied only after
//! every fixture has been scored, in a single batch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use uuid::Uuid;

use crate::domain::errors::{DomainResult, TransformError};
use crate::domain::models::{
    CategoryStats, FailingFixture, Fixture, FixtureOutcome, HistoryUpdate, RegressionConfig,
    RegressionEvaluation, RegressionReport, RegressionRun,
};
use crate::domain::ports::{
    FixtureRepository, NotificationEvent, Notifier, RegressionRunRepository, Transform,
};
use crate::services::scoring::{DimensionSet, ScoringContext};
use crate::services::writer_lease::WriterLease;

pub struct RegressionRunner {
    fidelity: Arc<DimensionSet>,
    config: RegressionConfig,
    fixtures: Arc<dyn FixtureRepository>,
    runs: Arc<dyn RegressionRunRepository>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl RegressionRunner {
    pub fn new(
        fidelity: Arc<DimensionSet>,
        config: RegressionConfig,
        fixtures: Arc<dyn FixtureRepository>,
        runs: Arc<dyn RegressionRunRepository>,
    ) -> Self {
        Self {
            fidelity,
            config,
            fixtures,
            runs,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Load the active corpus.
    pub async fn active_fixtures(&self) -> DomainResult<Vec<Fixture>> {
        self.fixtures.list(true).await
    }

    /// Score `transform` against the active fixtures in `fixtures`.
    ///
    /// Never mutates anything and never fails: a transform error or timeout
    /// is scored as an all-zero result for that fixture.
    pub async fn evaluate<T: Transform + ?Sized>(
        &self,
        fixtures: &[Fixture],
        transform: &T,
    ) -> RegressionEvaluation {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let timeout = Duration::from_secs(self.config.transform_timeout_secs);

        let outcomes: Vec<FixtureOutcome> = stream::iter(fixtures.iter().filter(|f| f.active))
            .map(|fixture| self.evaluate_one(fixture, transform, timeout))
            .buffered(self.config.concurrency.max(1))
            .boxed()
            .collect()
            .await;

        let finished_at = Utc::now();
        let history_updates = outcomes
            .iter()
            .map(|o| HistoryUpdate {
                fixture_id: o.fixture_id,
                passed: o.score.passed,
                regressed: o.regressed,
                evaluated_at: finished_at,
            })
            .collect();
        let report = self.build_report(run_id, started_at, finished_at, &outcomes);

        tracing::info!(
            run_id = %run_id,
            total = report.total,
            passed = report.passed,
            regressions = report.regressions,
            improvements = report.improvements,
            transform_failures = report.transform_failures,
            overall_score = report.overall_score,
            "Regression evaluation complete"
        );

        RegressionEvaluation {
            report,
            outcomes,
            history_updates,
        }
    }

    async fn evaluate_one<T: Transform + ?Sized>(
        &self,
        fixture: &Fixture,
        transform: &T,
        timeout: Duration,
    ) -> FixtureOutcome {
        let ctx = ScoringContext::for_input(&fixture.input);
        let produced = tokio::time::timeout(timeout, transform.transform(&fixture.input))
            .await
            .unwrap_or(Err(TransformError::Timeout(timeout.as_secs())));

        let (score, transform_error) = match produced {
            Ok(actual) => match self.fidelity.score(&fixture.expected_output, &actual, &ctx) {
                Ok(score) => (score, None),
                Err(e) => {
                    tracing::error!(fixture = %fixture.key, error = %e, "Scoring failed");
                    (self.fidelity.failed_result(&ctx), Some(e.to_string()))
                }
            },
            Err(e) => {
                tracing::warn!(fixture = %fixture.key, error = %e, "Transform failed");
                (self.fidelity.failed_result(&ctx), Some(e.to_string()))
            }
        };

        let passed = score.passed;
        let regressed = fixture.last_pass == Some(true) && !passed;
        let improved = fixture.last_pass == Some(false) && passed;
        if regressed {
            tracing::warn!(
                fixture = %fixture.key,
                overall = score.overall,
                failing = ?score.failing_dimensions,
                "Fixture regressed"
            );
        }

        FixtureOutcome {
            fixture_id: fixture.id,
            fixture_key: fixture.key.clone(),
            category: fixture.category.clone(),
            score,
            transform_error,
            previous_pass: fixture.last_pass,
            regressed,
            improved,
        }
    }

    fn build_report(
        &self,
        run_id: Uuid,
        started_at: chrono::DateTime<Utc>,
        finished_at: chrono::DateTime<Utc>,
        outcomes: &[FixtureOutcome],
    ) -> RegressionReport {
        let total = outcomes.len();
        let passed = outcomes.iter().filter(|o| o.score.passed).count();

        let mut per_category: BTreeMap<String, CategoryStats> = BTreeMap::new();
        let mut dimension_failures: BTreeMap<String, usize> = BTreeMap::new();
        for outcome in outcomes {
            let stats = per_category.entry(outcome.category.clone()).or_default();
            stats.total += 1;
            if outcome.score.passed {
                stats.passed += 1;
            }
            for dimension in &outcome.score.failing_dimensions {
                *dimension_failures.entry(dimension.clone()).or_default() += 1;
            }
        }
        for stats in per_category.values_mut() {
            stats.pass_rate = ratio(stats.passed, stats.total);
        }

        let mut failing: Vec<&FixtureOutcome> =
            outcomes.iter().filter(|o| !o.score.passed).collect();
        failing.sort_by(|a, b| {
            a.score
                .overall
                .total_cmp(&b.score.overall)
                .then_with(|| a.fixture_key.cmp(&b.fixture_key))
        });
        let top_failing = failing
            .into_iter()
            .take(self.config.top_failing)
            .map(|o| FailingFixture {
                fixture_id: o.fixture_id,
                fixture_key: o.fixture_key.clone(),
                category: o.category.clone(),
                overall: o.score.overall,
                failing_dimensions: o.score.failing_dimensions.clone(),
            })
            .collect();

        let overall_score = if total == 0 {
            0.0
        } else {
            outcomes.iter().map(|o| o.score.overall).sum::<f64>() / total as f64
        };

        RegressionReport {
            run_id,
            started_at,
            finished_at,
            total,
            passed,
            failed: total - passed,
            regressions: count_u32(outcomes.iter().filter(|o| o.regressed)),
            improvements: count_u32(outcomes.iter().filter(|o| o.improved)),
            transform_failures: outcomes.iter().filter(|o| o.transform_error.is_some()).count(),
            pass_rate: ratio(passed, total),
            overall_score,
            per_category,
            dimension_failures,
            top_failing,
            regressed_fixture_ids: outcomes
                .iter()
                .filter(|o| o.regressed)
                .map(|o| o.fixture_id)
                .collect(),
            improved_fixture_ids: outcomes
                .iter()
                .filter(|o| o.improved)
                .map(|o| o.fixture_id)
                .collect(),
        }
    }

    /// Write an evaluation's history updates and keep the run for trends.
    /// The caller must hold the writer lease.
    pub async fn record(&self, evaluation: &RegressionEvaluation) -> DomainResult<RegressionRun> {
        self.fixtures
            .apply_history(&evaluation.history_updates)
            .await?;
        let report = &evaluation.report;
        let run = RegressionRun {
            id: report.run_id,
            started_at: report.started_at,
            finished_at: report.finished_at,
            report: report.clone(),
        };
        self.runs.append(&run).await?;

        if report.has_regressions() {
            self.notify_regressions(evaluation).await;
        }
        Ok(run)
    }

    async fn notify_regressions(&self, evaluation: &RegressionEvaluation) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let event = NotificationEvent::RegressionsDetected {
            run_id: evaluation.report.run_id,
            regressions: evaluation.report.regressions,
            fixture_keys: evaluation
                .outcomes
                .iter()
                .filter(|o| o.regressed)
                .map(|o| o.fixture_key.clone())
                .collect(),
        };
        if let Err(e) = notifier.notify(&event).await {
            tracing::warn!(error = %e, "Failed to send regression notification");
        }
    }

    /// Manual run: evaluate the active corpus and persist the outcome under
    /// the writer lease.
    pub async fn run_now<T: Transform + ?Sized>(
        &self,
        transform: &T,
        lease: &WriterLease,
    ) -> DomainResult<RegressionEvaluation> {
        lease
            .run(|| async {
                let fixtures = self.active_fixtures().await?;
                let evaluation = self.evaluate(&fixtures, transform).await;
                lease.ensure_held().await?;
                self.record(&evaluation).await?;
                Ok(evaluation)
            })
            .await
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

fn count_u32<I: Iterator>(iter: I) -> u32 {
    u32::try_from(iter.count()).unwrap_or(u32::MAX)
}
