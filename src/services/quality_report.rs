//! Quality report builder.
//!
//! Pulls the latest regression run, capture flags, cycle history, drift and
//! feedback into one digest. Every source is loaded independently: a source
//! that fails or has no data shows up as an unavailable section instead of
//! failing the whole report.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    CaptureFlagCounts, CycleOutcome, DriftRecord, FeedbackCounts, ImprovementCycle,
    RecommendedAction, RegressionReport,
};
use crate::domain::ports::{
    CaptureRepository, ContractRepository, CycleRepository, DriftRepository, FeedbackRepository,
    RegressionRunRepository,
};
use crate::services::checkpoint::{CheckpointLedger, CheckpointStatus};

/// Capture failure rate above which the report asks for attention.
pub const CAPTURE_FAILURE_ALERT_RATE: f64 = 0.10;
/// Pass rate below which the report asks for attention.
pub const PASS_RATE_ALERT: f64 = 0.95;
pub const TREND_DAYS: i64 = 7;

/// A report section and whether its source could be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Section<T> {
    Available { data: T },
    Unavailable { reason: String },
}

impl<T> Section<T> {
    fn from_result(source: &str, result: DomainResult<T>) -> Self {
        match result {
            Ok(data) => Self::Available { data },
            Err(e) => {
                tracing::warn!(source, error = %e, "Report source unavailable");
                Self::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn from_option(result: DomainResult<Option<T>>, source: &str, missing: &str) -> Self {
        match result {
            Ok(Some(data)) => Self::Available { data },
            Ok(None) => Self::Unavailable {
                reason: missing.to_string(),
            },
            Err(e) => Self::from_result(source, Err(e)),
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Available { data } => Some(data),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            Self::Available { .. } => None,
            Self::Unavailable { reason } => Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub last: Option<ImprovementCycle>,
    pub checkpoint: CheckpointStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDriftSummary {
    pub contract_id: Uuid,
    pub name: String,
    pub version: u32,
    pub evaluated: usize,
    pub drifted: usize,
    pub mean_compliance: Option<f64>,
    /// Action of the most recent drifted evaluation.
    pub latest_action: Option<RecommendedAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub day: NaiveDate,
    pub pass_rate: Option<f64>,
    pub capture_failure_rate: Option<f64>,
    pub mean_compliance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub priority: usize,
    pub rule: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub generated_at: DateTime<Utc>,
    pub regression: Section<RegressionReport>,
    pub captures: Section<CaptureFlagCounts>,
    pub cycle: Section<CycleSummary>,
    pub drift: Section<Vec<ContractDriftSummary>>,
    pub feedback: Section<FeedbackCounts>,
    pub trend: Section<Vec<TrendPoint>>,
    pub actions: Vec<ActionItem>,
}

impl QualityReport {
    pub fn unavailable_sections(&self) -> Vec<(&'static str, &str)> {
        [
            ("regression", self.regression.unavailable_reason()),
            ("captures", self.captures.unavailable_reason()),
            ("cycle", self.cycle.unavailable_reason()),
            ("drift", self.drift.unavailable_reason()),
            ("feedback", self.feedback.unavailable_reason()),
            ("trend", self.trend.unavailable_reason()),
        ]
        .into_iter()
        .filter_map(|(name, reason)| reason.map(|r| (name, r)))
        .collect()
    }

    pub fn headline(&self) -> String {
        match self.regression.data() {
            Some(r) => format!(
                "pass rate {:.1}% ({}/{}), {} regression(s), {} action(s)",
                r.pass_rate * 100.0,
                r.passed,
                r.total,
                r.regressions,
                self.actions.len()
            ),
            None => format!("no regression data, {} action(s)", self.actions.len()),
        }
    }
}

/// Rules deriving the action list, checked in priority order. All matches apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportRule {
    Regressions,
    CheckpointDue,
    CaptureFailures,
    ContractDrift,
    HighPriorityFeedback,
    LowPassRate,
    LastCycleRolledBack,
    MissingSources,
}

const REPORT_RULES: [ReportRule; 8] = [
    ReportRule::Regressions,
    ReportRule::CheckpointDue,
    ReportRule::CaptureFailures,
    ReportRule::ContractDrift,
    ReportRule::HighPriorityFeedback,
    ReportRule::LowPassRate,
    ReportRule::LastCycleRolledBack,
    ReportRule::MissingSources,
];

impl ReportRule {
    fn name(self) -> &'static str {
        match self {
            Self::Regressions => "regressions",
            Self::CheckpointDue => "checkpoint_due",
            Self::CaptureFailures => "capture_failures",
            Self::ContractDrift => "contract_drift",
            Self::HighPriorityFeedback => "high_priority_feedback",
            Self::LowPassRate => "low_pass_rate",
            Self::LastCycleRolledBack => "last_cycle_rolled_back",
            Self::MissingSources => "missing_sources",
        }
    }

    fn messages(self, report: &QualityReport) -> Vec<String> {
        match self {
            Self::Regressions => report
                .regression
                .data()
                .filter(|r| r.has_regressions())
                .map(|r| {
                    let keys: Vec<&str> = r
                        .top_failing
                        .iter()
                        .filter(|f| r.regressed_fixture_ids.contains(&f.fixture_id))
                        .map(|f| f.fixture_key.as_str())
                        .collect();
                    let mut message = format!("Investigate {} regressed fixture(s)", r.regressions);
                    if !keys.is_empty() {
                        let _ = write!(message, ": {}", keys.join(", "));
                    }
                    message
                })
                .into_iter()
                .collect(),
            Self::CheckpointDue => report
                .cycle
                .data()
                .filter(|c| c.checkpoint.required())
                .map(|c| {
                    format!(
                        "Acknowledge human checkpoint: {} cycle(s) committed since last review",
                        c.checkpoint.committed_since
                    )
                })
                .into_iter()
                .collect(),
            Self::CaptureFailures => report
                .captures
                .data()
                .filter(|c| c.failure_rate() > CAPTURE_FAILURE_ALERT_RATE)
                .map(|c| {
                    format!(
                        "Live failure rate {:.1}% in the last 24h ({})",
                        c.failure_rate() * 100.0,
                        dominant_flag(c)
                    )
                })
                .into_iter()
                .collect(),
            Self::ContractDrift => report
                .drift
                .data()
                .map(|contracts| {
                    contracts
                        .iter()
                        .filter(|c| c.drifted > 0)
                        .map(|c| {
                            let action = c
                                .latest_action
                                .unwrap_or(RecommendedAction::Investigate)
                                .description();
                            format!(
                                "Contract '{}' drifted {}/{}: {action}",
                                c.name, c.drifted, c.evaluated
                            )
                        })
                        .collect()
                })
                .unwrap_or_default(),
            Self::HighPriorityFeedback => report
                .feedback
                .data()
                .filter(|f| f.high_priority_pending > 0)
                .map(|f| {
                    format!(
                        "Triage {} high-priority feedback item(s)",
                        f.high_priority_pending
                    )
                })
                .into_iter()
                .collect(),
            Self::LowPassRate => report
                .regression
                .data()
                .filter(|r| r.total > 0 && r.pass_rate < PASS_RATE_ALERT)
                .map(|r| {
                    format!(
                        "Pass rate {:.1}% is below {:.0}%",
                        r.pass_rate * 100.0,
                        PASS_RATE_ALERT * 100.0
                    )
                })
                .into_iter()
                .collect(),
            Self::LastCycleRolledBack => report
                .cycle
                .data()
                .and_then(|c| c.last.as_ref())
                .filter(|c| c.outcome == CycleOutcome::RolledBack)
                .map(|c| {
                    let reason = c
                        .rollback_reason
                        .as_ref()
                        .map_or_else(|| "unknown".to_string(), |r| r.summary());
                    format!(
                        "Last cycle on '{}' rolled back: {reason}",
                        c.target_stage
                    )
                })
                .into_iter()
                .collect(),
            Self::MissingSources => {
                let missing = report.unavailable_sections();
                if missing.is_empty() {
                    Vec::new()
                } else {
                    let names: Vec<&str> = missing.iter().map(|(name, _)| *name).collect();
                    vec![format!("Restore report sources: {}", names.join(", "))]
                }
            }
        }
    }
}

fn dominant_flag(counts: &CaptureFlagCounts) -> &'static str {
    [
        (counts.empty, "mostly empty outputs"),
        (counts.artifact_leak, "mostly artifact leaks"),
        (counts.echo_leak, "mostly echo leaks"),
        (counts.truncated, "mostly truncation"),
    ]
    .into_iter()
    .fold((0, "mixed flags"), |best, (n, label)| {
        if n > best.0 {
            (n, label)
        } else {
            best
        }
    })
    .1
}

/// Apply the report rules in order, numbering the resulting actions.
pub fn derive_actions(report: &QualityReport) -> Vec<ActionItem> {
    REPORT_RULES
        .iter()
        .flat_map(|rule| {
            rule.messages(report)
                .into_iter()
                .map(move |message| (rule.name(), message))
        })
        .enumerate()
        .map(|(i, (rule, message))| ActionItem {
            priority: i + 1,
            rule: rule.to_string(),
            message,
        })
        .collect()
}

pub struct QualityReportBuilder {
    runs: Arc<dyn RegressionRunRepository>,
    captures: Arc<dyn CaptureRepository>,
    cycles: Arc<dyn CycleRepository>,
    contracts: Arc<dyn ContractRepository>,
    drift: Arc<dyn DriftRepository>,
    feedback: Arc<dyn FeedbackRepository>,
    checkpoints: CheckpointLedger,
}

impl QualityReportBuilder {
    pub fn new(
        runs: Arc<dyn RegressionRunRepository>,
        captures: Arc<dyn CaptureRepository>,
        cycles: Arc<dyn CycleRepository>,
        contracts: Arc<dyn ContractRepository>,
        drift: Arc<dyn DriftRepository>,
        feedback: Arc<dyn FeedbackRepository>,
        checkpoint_interval: u32,
    ) -> Self {
        let checkpoints = CheckpointLedger::new(cycles.clone(), checkpoint_interval);
        Self {
            runs,
            captures,
            cycles,
            contracts,
            drift,
            feedback,
            checkpoints,
        }
    }

    pub async fn build(&self) -> QualityReport {
        self.build_at(Utc::now()).await
    }

    pub async fn build_at(&self, now: DateTime<Utc>) -> QualityReport {
        let day_ago = now - Duration::hours(24);

        let regression = Section::from_option(
            self.runs.latest().await.map(|run| run.map(|r| r.report)),
            "regression",
            "no regression run recorded",
        );
        let captures = Section::from_result(
            "captures",
            self.captures.flag_counts_between(day_ago, now).await,
        );
        let cycle = Section::from_result("cycle", self.cycle_summary().await);
        let drift = Section::from_result("drift", self.drift_summary(day_ago).await);
        let feedback = Section::from_result("feedback", self.feedback.counts().await);
        let trend = Section::from_result("trend", self.trend(now).await);

        let mut report = QualityReport {
            generated_at: now,
            regression,
            captures,
            cycle,
            drift,
            feedback,
            trend,
            actions: Vec::new(),
        };
        report.actions = derive_actions(&report);
        tracing::info!(
            actions = report.actions.len(),
            unavailable = report.unavailable_sections().len(),
            "Quality report built"
        );
        report
    }

    async fn cycle_summary(&self) -> DomainResult<CycleSummary> {
        let last = self.cycles.list(1).await?.into_iter().next();
        let checkpoint = self.checkpoints.status().await?;
        Ok(CycleSummary { last, checkpoint })
    }

    async fn drift_summary(&self, since: DateTime<Utc>) -> DomainResult<Vec<ContractDriftSummary>> {
        let contracts = self.contracts.list().await?;
        let records = self.drift.list_since(since).await?;
        let mut by_contract: BTreeMap<Uuid, Vec<&DriftRecord>> = BTreeMap::new();
        for record in &records {
            by_contract.entry(record.contract_id).or_default().push(record);
        }

        Ok(contracts
            .into_iter()
            .map(|contract| {
                let records = by_contract.remove(&contract.id).unwrap_or_default();
                let scores: Vec<f64> = records.iter().map(|r| r.score.overall).collect();
                ContractDriftSummary {
                    contract_id: contract.id,
                    name: contract.name,
                    version: contract.version,
                    evaluated: records.len(),
                    drifted: records.iter().filter(|r| r.drifted).count(),
                    mean_compliance: mean(&scores),
                    latest_action: records
                        .iter()
                        .rev()
                        .find(|r| r.drifted)
                        .map(|r| r.recommended_action),
                }
            })
            .collect())
    }

    async fn trend(&self, now: DateTime<Utc>) -> DomainResult<Vec<TrendPoint>> {
        let today = now.date_naive();
        let first_day = today - Duration::days(TREND_DAYS - 1);
        let start = first_day
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);

        let mut pass_rates: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for run in self.runs.list_since(start).await? {
            pass_rates
                .entry(run.started_at.date_naive())
                .or_default()
                .push(run.report.pass_rate);
        }
        let mut compliance: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for record in self.drift.list_since(start).await? {
            compliance
                .entry(record.created_at.date_naive())
                .or_default()
                .push(record.score.overall);
        }

        let mut points = Vec::with_capacity(TREND_DAYS as usize);
        for offset in 0..TREND_DAYS {
            let day = first_day + Duration::days(offset);
            let from = start + Duration::days(offset);
            let to = from + Duration::days(1);
            let counts = self.captures.flag_counts_between(from, to).await?;
            points.push(TrendPoint {
                day,
                pass_rate: pass_rates.get(&day).and_then(|v| mean(v)),
                capture_failure_rate: (counts.total > 0).then(|| counts.failure_rate()),
                mean_compliance: compliance.get(&day).and_then(|v| mean(v)),
            });
        }
        Ok(points)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn pct(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.1}%", v * 100.0))
}

/// Render the report as a markdown digest. Missing sources are stated, not omitted.
pub fn render_markdown(report: &QualityReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# Quality report {}",
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(out, "\n{}", report.headline());

    let _ = writeln!(out, "\n## Regression");
    match &report.regression {
        Section::Available { data: r } => {
            let _ = writeln!(
                out,
                "- passed {}/{} ({:.1}%), mean score {:.3}",
                r.passed,
                r.total,
                r.pass_rate * 100.0,
                r.overall_score
            );
            let _ = writeln!(
                out,
                "- regressions {}, improvements {}, transform failures {}",
                r.regressions, r.improvements, r.transform_failures
            );
            for f in &r.top_failing {
                let _ = writeln!(
                    out,
                    "  - {} ({}) {:.3}: {}",
                    f.fixture_key,
                    f.category,
                    f.overall,
                    f.failing_dimensions.join(", ")
                );
            }
        }
        Section::Unavailable { reason } => {
            let _ = writeln!(out, "_unavailable: {reason}_");
        }
    }

    let _ = writeln!(out, "\n## Live captures (24h)");
    match &report.captures {
        Section::Available { data: c } => {
            let _ = writeln!(
                out,
                "- {} captured, {} flagged ({:.1}%): empty {}, artifact {}, echo {}, truncated {}",
                c.total,
                c.flagged,
                c.failure_rate() * 100.0,
                c.empty,
                c.artifact_leak,
                c.echo_leak,
                c.truncated
            );
        }
        Section::Unavailable { reason } => {
            let _ = writeln!(out, "_unavailable: {reason}_");
        }
    }

    let _ = writeln!(out, "\n## Improvement cycles");
    match &report.cycle {
        Section::Available { data: c } => {
            match &c.last {
                Some(cycle) => {
                    let _ = writeln!(
                        out,
                        "- last: {} on '{}' ({:.3} -> {})",
                        cycle.outcome.as_str(),
                        cycle.target_stage,
                        cycle.score_before,
                        cycle
                            .score_after
                            .map_or_else(|| "n/a".to_string(), |s| format!("{s:.3}"))
                    );
                }
                None => {
                    let _ = writeln!(out, "- no cycles yet");
                }
            }
            let _ = writeln!(
                out,
                "- {}/{} commits since last checkpoint{}",
                c.checkpoint.committed_since,
                c.checkpoint.interval,
                if c.checkpoint.required() { " (checkpoint required)" } else { "" }
            );
        }
        Section::Unavailable { reason } => {
            let _ = writeln!(out, "_unavailable: {reason}_");
        }
    }

    let _ = writeln!(out, "\n## Contract drift (24h)");
    match &report.drift {
        Section::Available { data } if data.is_empty() => {
            let _ = writeln!(out, "- no contracts registered");
        }
        Section::Available { data } => {
            for c in data {
                let _ = writeln!(
                    out,
                    "- {} v{}: {}/{} drifted, mean compliance {}",
                    c.name,
                    c.version,
                    c.drifted,
                    c.evaluated,
                    c.mean_compliance
                        .map_or_else(|| "n/a".to_string(), |m| format!("{m:.3}"))
                );
            }
        }
        Section::Unavailable { reason } => {
            let _ = writeln!(out, "_unavailable: {reason}_");
        }
    }

    let _ = writeln!(out, "\n## Feedback");
    match &report.feedback {
        Section::Available { data: f } => {
            let _ = writeln!(
                out,
                "- pending {} ({} high), processing {}, resolved {}, won't fix {}, duplicate {}",
                f.pending,
                f.high_priority_pending,
                f.processing,
                f.resolved,
                f.wont_fix,
                f.duplicate
            );
        }
        Section::Unavailable { reason } => {
            let _ = writeln!(out, "_unavailable: {reason}_");
        }
    }

    let _ = writeln!(out, "\n## 7-day trend");
    match &report.trend {
        Section::Available { data } => {
            let _ = writeln!(out, "| day | pass rate | capture failures | compliance |");
            let _ = writeln!(out, "|---|---|---|---|");
            for p in data {
                let _ = writeln!(
                    out,
                    "| {} | {} | {} | {} |",
                    p.day,
                    pct(p.pass_rate),
                    pct(p.capture_failure_rate),
                    p.mean_compliance
                        .map_or_else(|| "n/a".to_string(), |m| format!("{m:.3}"))
                );
            }
        }
        Section::Unavailable { reason } => {
            let _ = writeln!(out, "_unavailable: {reason}_");
        }
    }

    let _ = writeln!(out, "\n## Actions");
    if report.actions.is_empty() {
        let _ = writeln!(out, "- none");
    }
    for action in &report.actions {
        let _ = writeln!(out, "{}. {}", action.priority, action.message);
    }
    out
}
