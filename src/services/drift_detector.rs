//! Drift detector.
//!
//! Scores live captures against their output contract and, when compliance
//! drops below the contract's threshold, explains which parts fell short and
//! recommends an action through an ordered rule list.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::score::dimensions;
use crate::domain::models::{
    Capture, CompiledContract, DriftConfig, DriftRecord, OutputContract, RecommendedAction,
    ScoreResult,
};
use crate::domain::ports::{CaptureRepository, ContractRepository, DriftRepository};
use crate::services::scoring::compliance::{
    below_min_length, missing_markers, missing_sections,
};
use crate::services::scoring::text::char_len;
use crate::services::scoring::{DimensionSet, ScoringContext};

/// Facts about the other captures in the same window.
#[derive(Debug, Clone, Default)]
pub struct DriftContext {
    /// Contracts with at least one capture below their minimum length.
    pub short_contracts: BTreeSet<Uuid>,
}

/// What a drifted evaluation found, as consumed by the rules.
#[derive(Debug, Clone, Default)]
struct DriftFacts {
    missing_sections: Vec<String>,
    missing_markers: Vec<String>,
    below_min_length: bool,
    upstream_data_empty: bool,
    short_contracts_in_window: usize,
    similarity_only: bool,
}

/// Classification rules, checked in declaration order. First match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriftRule {
    MissingSectionNoData,
    MissingSection,
    ShortAcrossContracts,
    ShortSingleContract,
    MissingMarkers,
    StructureOnly,
}

const DRIFT_RULES: [DriftRule; 6] = [
    DriftRule::MissingSectionNoData,
    DriftRule::MissingSection,
    DriftRule::ShortAcrossContracts,
    DriftRule::ShortSingleContract,
    DriftRule::MissingMarkers,
    DriftRule::StructureOnly,
];

impl DriftRule {
    fn matches(self, facts: &DriftFacts) -> bool {
        match self {
            Self::MissingSectionNoData => {
                !facts.missing_sections.is_empty() && facts.upstream_data_empty
            }
            Self::MissingSection => !facts.missing_sections.is_empty(),
            Self::ShortAcrossContracts => {
                facts.below_min_length && facts.short_contracts_in_window >= 2
            }
            Self::ShortSingleContract => facts.below_min_length,
            Self::MissingMarkers => !facts.missing_markers.is_empty(),
            Self::StructureOnly => facts.similarity_only,
        }
    }

    fn action(self) -> RecommendedAction {
        match self {
            Self::MissingSectionNoData => RecommendedAction::CheckDataSource,
            Self::MissingSection => RecommendedAction::ReinforceSection,
            Self::ShortAcrossContracts => RecommendedAction::CheckSharedDataSource,
            Self::ShortSingleContract => RecommendedAction::ReviewEmptyDataHandling,
            Self::MissingMarkers => RecommendedAction::ReinforceFormatting,
            Self::StructureOnly => RecommendedAction::HumanReviewPossibleRedesign,
        }
    }
}

fn classify(facts: &DriftFacts) -> RecommendedAction {
    DRIFT_RULES
        .iter()
        .find(|rule| rule.matches(facts))
        .map_or(RecommendedAction::Investigate, |rule| rule.action())
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub considered: usize,
    pub evaluated: usize,
    pub drifted: usize,
    pub already_evaluated: usize,
    pub skipped: usize,
    pub by_action: BTreeMap<String, usize>,
}

pub struct DriftDetector {
    compliance: Arc<DimensionSet>,
    config: DriftConfig,
    captures: Arc<dyn CaptureRepository>,
    contracts: Arc<dyn ContractRepository>,
    records: Arc<dyn DriftRepository>,
}

impl DriftDetector {
    pub fn new(
        compliance: Arc<DimensionSet>,
        config: DriftConfig,
        captures: Arc<dyn CaptureRepository>,
        contracts: Arc<dyn ContractRepository>,
        records: Arc<dyn DriftRepository>,
    ) -> Self {
        Self {
            compliance,
            config,
            captures,
            contracts,
            records,
        }
    }

    /// Evaluate one capture against one contract.
    pub fn evaluate(
        &self,
        capture: &Capture,
        contract: &OutputContract,
        ctx: &DriftContext,
    ) -> DomainResult<DriftRecord> {
        evaluate_capture(&self.compliance, capture, contract, ctx)
    }

    /// Evaluate every unevaluated capture with a contract in the window.
    /// Missing or malformed contracts are skipped with a warning.
    pub async fn sweep(&self, window: Duration) -> DomainResult<SweepSummary> {
        let since = Utc::now() - window;
        let captures = self.captures.list_with_contract_since(since).await?;
        let mut summary = SweepSummary {
            considered: captures.len(),
            ..Default::default()
        };

        let mut contracts: HashMap<Uuid, Option<OutputContract>> = HashMap::new();
        for id in captures.iter().filter_map(|c| c.contract_id) {
            if contracts.contains_key(&id) {
                continue;
            }
            let usable = match self.contracts.get(id).await {
                Ok(Some(contract)) => match contract.compile() {
                    Ok(_) => Some(contract),
                    Err(e) => {
                        tracing::warn!(
                            contract_id = %id,
                            error = %e,
                            "Skipping malformed contract"
                        );
                        None
                    }
                },
                Ok(None) => {
                    tracing::warn!(contract_id = %id, "Skipping captures for missing contract");
                    None
                }
                Err(
                    e @ (DomainError::SerializationError(_) | DomainError::InvalidContract { .. }),
                ) => {
                    tracing::warn!(
                        contract_id = %id,
                        error = %e,
                        "Skipping unreadable contract"
                    );
                    None
                }
                Err(e) => return Err(e),
            };
            contracts.insert(id, usable);
        }

        let mut ctx = DriftContext::default();
        let mut pending = Vec::new();
        for capture in &captures {
            let contract = capture
                .contract_id
                .and_then(|id| contracts.get(&id))
                .and_then(Option::as_ref);
            let Some(contract) = contract else {
                summary.skipped += 1;
                continue;
            };
            if char_len(&capture.produced_output) < contract.length_bounds.min {
                ctx.short_contracts.insert(contract.id);
            }
            pending.push((capture, contract));
        }

        let ctx = &ctx;
        let results: Vec<DomainResult<Option<DriftRecord>>> = stream::iter(pending)
            .map(|(capture, contract)| async move {
                if self.records.exists(contract.id, capture.id).await? {
                    return Ok(None);
                }
                let record = self.evaluate(capture, contract, ctx)?;
                self.records.append(&record).await?;
                Ok(Some(record))
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for result in results {
            match result {
                Ok(Some(record)) => {
                    summary.evaluated += 1;
                    if record.drifted {
                        summary.drifted += 1;
                        *summary
                            .by_action
                            .entry(record.recommended_action.as_str().to_string())
                            .or_default() += 1;
                        tracing::warn!(
                            contract_id = %record.contract_id,
                            capture_id = %record.capture_id,
                            score = record.score.overall,
                            action = record.recommended_action.as_str(),
                            "Live output drifted from contract"
                        );
                    }
                }
                Ok(None) => summary.already_evaluated += 1,
                Err(e) => {
                    summary.skipped += 1;
                    tracing::warn!(error = %e, "Drift evaluation failed, continuing sweep");
                }
            }
        }

        tracing::info!(
            considered = summary.considered,
            evaluated = summary.evaluated,
            drifted = summary.drifted,
            skipped = summary.skipped,
            "Drift sweep complete"
        );
        Ok(summary)
    }

    /// Sweep the configured window.
    pub async fn sweep_default(&self) -> DomainResult<SweepSummary> {
        self.sweep(Duration::hours(self.config.window_hours)).await
    }
}

/// Score a capture for contract compliance and classify any drift. Pure;
/// fails only when the contract is malformed.
pub fn evaluate_capture(
    compliance: &DimensionSet,
    capture: &Capture,
    contract: &OutputContract,
    ctx: &DriftContext,
) -> DomainResult<DriftRecord> {
    let compiled = contract.compile()?;
    let actual = &capture.produced_output;
    let score = compliance.score(
        "",
        actual,
        &ScoringContext::for_contract(&capture.input, &compiled),
    )?;
    let drifted = score.overall < contract.drift_threshold;

    let (explanation, recommended_action) = if drifted {
        let facts = facts(capture, &compiled, &score, ctx);
        (explain(&compiled, &score, &facts, actual), classify(&facts))
    } else {
        (Vec::new(), RecommendedAction::None)
    };

    Ok(DriftRecord {
        id: Uuid::new_v4(),
        contract_id: contract.id,
        capture_id: capture.id,
        score,
        drifted,
        explanation,
        recommended_action,
        created_at: Utc::now(),
    })
}

fn facts(
    capture: &Capture,
    compiled: &CompiledContract<'_>,
    score: &ScoreResult,
    ctx: &DriftContext,
) -> DriftFacts {
    let actual = &capture.produced_output;
    let below_min = below_min_length(compiled, actual);
    let mut short = ctx.short_contracts.clone();
    if below_min {
        short.insert(compiled.contract.id);
    }
    DriftFacts {
        missing_sections: missing_sections(compiled, actual),
        missing_markers: missing_markers(compiled, actual),
        below_min_length: below_min,
        upstream_data_empty: capture.upstream_data_empty(),
        short_contracts_in_window: short.len(),
        similarity_only: score.failing_dimensions == [dimensions::STRUCTURAL_SIMILARITY],
    }
}

fn explain(
    compiled: &CompiledContract<'_>,
    score: &ScoreResult,
    facts: &DriftFacts,
    actual: &str,
) -> Vec<String> {
    let contract = compiled.contract;
    let mut lines = Vec::new();
    for dimension in &score.failing_dimensions {
        let value = score.dimension(dimension).unwrap_or_default();
        let line = match dimension.as_str() {
            dimensions::SECTION_PRESENCE => {
                format!("missing sections: {}", facts.missing_sections.join(", "))
            }
            dimensions::SECTION_ORDER => format!("sections out of order (score {value:.2})"),
            dimensions::MARKER_PRESENCE => {
                format!("missing markers: {}", facts.missing_markers.join(" "))
            }
            dimensions::LENGTH_COMPLIANCE => {
                let len = char_len(actual);
                let bounds = contract.length_bounds;
                if len < bounds.min {
                    format!("length {len} below minimum {}", bounds.min)
                } else {
                    format!("length {len} above maximum {}", bounds.max)
                }
            }
            dimensions::PATTERN_COMPLIANCE => {
                let mut broken: Vec<String> = compiled
                    .required
                    .iter()
                    .filter(|(_, re)| !re.is_match(actual))
                    .map(|(p, _)| format!("required /{p}/ unmatched"))
                    .collect();
                broken.extend(
                    compiled
                        .forbidden
                        .iter()
                        .filter(|(_, re)| re.is_match(actual))
                        .map(|(p, _)| format!("forbidden /{p}/ present")),
                );
                format!("pattern rules broken: {}", broken.join("; "))
            }
            dimensions::STRUCTURAL_SIMILARITY => {
                format!("layout differs from reference examples (similarity {value:.2})")
            }
            other => format!("{other} scored {value:.2}"),
        };
        lines.push(line);
    }
    if facts.upstream_data_empty {
        lines.push("scheduled capture had empty upstream data".to_string());
    }
    if lines.is_empty() {
        lines.push(format!(
            "overall compliance {:.2} below threshold {:.2}",
            score.overall, contract.drift_threshold
        ));
    }
    lines
}
