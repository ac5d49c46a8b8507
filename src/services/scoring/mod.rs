//! Weighted multi-dimension scoring.
//!
//! A [`DimensionSet`] is a named, ordered list of weighted scorers. Two sets
//! ship with the crate: transform fidelity (fixture expected vs actual) and
//! output contract compliance (live output vs a declared contract).

pub mod compliance;
pub mod fidelity;
pub mod skeleton;
pub mod text;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CompiledContract, ScoreResult, ScoringConfig, FAILING_DIMENSION_THRESHOLD,
};

pub use fidelity::detect_quality_flags;
pub use skeleton::{DiffRatio, SequenceSimilarity};

pub const TRANSFORM_FIDELITY: &str = "transform_fidelity";
pub const CONTRACT_COMPLIANCE: &str = "contract_compliance";

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Inputs a scorer may need beyond the (expected, actual) pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringContext<'a> {
    /// The input that triggered the output.
    pub input: &'a str,
    pub contract: Option<&'a CompiledContract<'a>>,
}

impl<'a> ScoringContext<'a> {
    pub fn for_input(input: &'a str) -> Self {
        Self {
            input,
            contract: None,
        }
    }

    pub fn for_contract(input: &'a str, contract: &'a CompiledContract<'a>) -> Self {
        Self {
            input,
            contract: Some(contract),
        }
    }
}

/// Scores one dimension in `0.0..=1.0`.
pub trait DimensionScorer: Send + Sync {
    fn score(&self, expected: &str, actual: &str, ctx: &ScoringContext<'_>) -> f64;
}

/// How a dimension set decides `passed`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PassThreshold {
    Fixed(f64),
    /// Use the contract's drift threshold.
    ContractDrift,
}

struct Dimension {
    name: &'static str,
    weight: f64,
    scorer: Box<dyn DimensionScorer>,
}

/// Named, ordered, weighted scorers whose weights sum to 1.0.
pub struct DimensionSet {
    name: &'static str,
    dimensions: Vec<Dimension>,
    threshold: PassThreshold,
}

impl std::fmt::Debug for DimensionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DimensionSet")
            .field("name", &self.name)
            .field(
                "dimensions",
                &self
                    .dimensions
                    .iter()
                    .map(|d| (d.name, d.weight))
                    .collect::<Vec<_>>(),
            )
            .field("threshold", &self.threshold)
            .finish()
    }
}

/// Collects dimensions and validates them into a [`DimensionSet`].
pub struct DimensionSetBuilder {
    name: &'static str,
    dimensions: Vec<Dimension>,
    threshold: PassThreshold,
}

impl DimensionSetBuilder {
    #[must_use]
    pub fn dimension(
        mut self,
        name: &'static str,
        weight: f64,
        scorer: impl DimensionScorer + 'static,
    ) -> Self {
        self.dimensions.push(Dimension {
            name,
            weight,
            scorer: Box::new(scorer),
        });
        self
    }

    pub fn build(self) -> DomainResult<DimensionSet> {
        let name = self.name;
        if self.dimensions.is_empty() {
            return Err(DomainError::ValidationFailed(format!(
                "dimension set '{name}' has no dimensions"
            )));
        }
        if let Some(d) = self.dimensions.iter().find(|d| d.weight < 0.0) {
            return Err(DomainError::ValidationFailed(format!(
                "dimension '{}' has negative weight {}",
                d.name, d.weight
            )));
        }
        let total: f64 = self.dimensions.iter().map(|d| d.weight).sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(DomainError::ValidationFailed(format!(
                "dimension set '{name}' weights sum to {total}, expected 1.0"
            )));
        }
        Ok(DimensionSet {
            name,
            dimensions: self.dimensions,
            threshold: self.threshold,
        })
    }
}

impl DimensionSet {
    pub fn builder(name: &'static str, threshold: PassThreshold) -> DimensionSetBuilder {
        DimensionSetBuilder {
            name,
            dimensions: Vec::new(),
            threshold,
        }
    }

    /// Transform fidelity: how faithfully the transform reproduced the expected output.
    pub fn transform_fidelity(config: &ScoringConfig) -> DomainResult<Self> {
        fidelity::dimension_set(config)
    }

    /// Output contract compliance with the default similarity metric.
    pub fn contract_compliance() -> DomainResult<Self> {
        Self::contract_compliance_with(Arc::new(DiffRatio))
    }

    pub fn contract_compliance_with(
        similarity: Arc<dyn SequenceSimilarity>,
    ) -> DomainResult<Self> {
        compliance::dimension_set(similarity)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.dimensions.iter().map(|d| d.name)
    }

    fn resolve_threshold(&self, ctx: &ScoringContext<'_>) -> DomainResult<f64> {
        match self.threshold {
            PassThreshold::Fixed(t) => Ok(t),
            PassThreshold::ContractDrift => ctx
                .contract
                .map(|c| c.contract.drift_threshold)
                .ok_or_else(|| {
                    DomainError::ValidationFailed(format!(
                        "dimension set '{}' needs a contract to score against",
                        self.name
                    ))
                }),
        }
    }

    /// Score `actual` against `expected`. Pure and deterministic.
    pub fn score(
        &self,
        expected: &str,
        actual: &str,
        ctx: &ScoringContext<'_>,
    ) -> DomainResult<ScoreResult> {
        let threshold = self.resolve_threshold(ctx)?;
        let values = self
            .dimensions
            .iter()
            .map(|d| (d.name, d.scorer.score(expected, actual, ctx).clamp(0.0, 1.0)))
            .collect::<Vec<_>>();
        Ok(self.assemble(values, threshold))
    }

    /// An all-zero, failing result for an output that could not be produced.
    pub fn failed_result(&self, ctx: &ScoringContext<'_>) -> ScoreResult {
        let threshold = self.resolve_threshold(ctx).unwrap_or(1.0);
        self.assemble(self.dimensions.iter().map(|d| (d.name, 0.0)).collect(), threshold)
    }

    fn assemble(&self, values: Vec<(&'static str, f64)>, threshold: f64) -> ScoreResult {
        let mut overall = 0.0;
        let mut dimensions = BTreeMap::new();
        let mut weights = BTreeMap::new();
        let mut failing_dimensions = Vec::new();

        for (dimension, (name, value)) in self.dimensions.iter().zip(values) {
            overall += dimension.weight * value;
            if value < FAILING_DIMENSION_THRESHOLD {
                failing_dimensions.push(name.to_string());
            }
            dimensions.insert(name.to_string(), value);
            weights.insert(name.to_string(), dimension.weight);
        }
        let overall = round_score(overall);

        ScoreResult {
            dimension_set: self.name.to_string(),
            dimensions,
            weights,
            overall,
            threshold,
            passed: overall >= threshold,
            failing_dimensions,
        }
    }
}

/// Round away float noise from the weighted sum.
fn round_score(value: f64) -> f64 {
    ((value * 1e9).round() / 1e9).clamp(0.0, 1.0)
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn text_strategy() -> impl Strategy<Value = String> {
        prop::string::string_regex("[a-zA-Z0-9 .,!?*|`#\n-]{0,400}").expect("Valid regex")
    }

    fn fidelity() -> DimensionSet {
        DimensionSet::transform_fidelity(&ScoringConfig::default()).expect("default set builds")
    }

    proptest! {
        /// An output identical to its expectation is perfect
        #[test]
        fn proptest_self_score_is_one(input in text_strategy(), expected in text_strategy()) {
            let result = fidelity()
                .score(&expected, &expected, &ScoringContext::for_input(&input))
                .expect("fidelity scoring needs no contract");
            prop_assert!((result.overall - 1.0).abs() < 1e-9, "{:?}", result);
            prop_assert!(result.failing_dimensions.is_empty());
        }

        /// Same pair, same score
        #[test]
        fn proptest_scoring_is_deterministic(
            expected in text_strategy(),
            actual in text_strategy(),
        ) {
            let set = fidelity();
            let ctx = ScoringContext::for_input("determinism");
            let first = set.score(&expected, &actual, &ctx).expect("scores");
            let second = set.score(&expected, &actual, &ctx).expect("scores");
            prop_assert_eq!(first, second);
        }

        /// Every dimension and the overall stay within the unit interval
        #[test]
        fn proptest_scores_are_bounded(
            input in text_strategy(),
            expected in text_strategy(),
            actual in text_strategy(),
        ) {
            let result = fidelity()
                .score(&expected, &actual, &ScoringContext::for_input(&input))
                .expect("scores");
            prop_assert!((0.0..=1.0).contains(&result.overall));
            for (name, value) in &result.dimensions {
                prop_assert!((0.0..=1.0).contains(value), "{} = {}", name, value);
            }
            prop_assert_eq!(result.passed, result.overall >= result.threshold);
        }
    }
}
