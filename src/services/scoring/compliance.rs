//! Output contract compliance dimensions.
//!
//! These scorers ignore the expected text and read everything they need from
//! the contract carried in the [`ScoringContext`]. A context without a
//! contract is rejected by the dimension set before any scorer runs.

use std::sync::Arc;

use super::skeleton::{self, SequenceSimilarity};
use super::text::{char_len, lcs_len};
use super::{DimensionScorer, DimensionSet, PassThreshold, ScoringContext, CONTRACT_COMPLIANCE};
use crate::domain::errors::DomainResult;
use crate::domain::models::score::dimensions;
use crate::domain::models::{CompiledContract, SectionSpec};

pub(super) fn dimension_set(
    similarity: Arc<dyn SequenceSimilarity>,
) -> DomainResult<DimensionSet> {
    DimensionSet::builder(CONTRACT_COMPLIANCE, PassThreshold::ContractDrift)
        .dimension(dimensions::SECTION_PRESENCE, 0.25, SectionPresence)
        .dimension(dimensions::SECTION_ORDER, 0.10, SectionOrder)
        .dimension(dimensions::MARKER_PRESENCE, 0.15, MarkerPresence)
        .dimension(dimensions::LENGTH_COMPLIANCE, 0.10, BoundedLength)
        .dimension(dimensions::PATTERN_COMPLIANCE, 0.15, PatternCompliance)
        .dimension(
            dimensions::STRUCTURAL_SIMILARITY,
            0.25,
            StructuralSimilarity { similarity },
        )
        .build()
}

/// Where, if anywhere, a required section was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDetection {
    pub name: String,
    pub hits: usize,
    pub detected: bool,
    /// Byte offset of the earliest keyword hit.
    pub first_position: Option<usize>,
}

/// A section is present with two keyword hits, or one hit when it declares at
/// most two keywords.
pub fn detect_section(section: &SectionSpec, lowered: &str) -> SectionDetection {
    let keywords = section.effective_keywords();
    let positions: Vec<usize> = keywords.iter().filter_map(|k| lowered.find(k.as_str())).collect();
    let hits = positions.len();
    let detected = hits >= 2 || (keywords.len() <= 2 && hits >= 1);
    SectionDetection {
        name: section.name.clone(),
        hits,
        detected,
        first_position: positions.into_iter().min(),
    }
}

pub fn detect_sections(contract: &CompiledContract<'_>, actual: &str) -> Vec<SectionDetection> {
    let lowered = actual.to_lowercase();
    contract
        .contract
        .required_sections
        .iter()
        .map(|s| detect_section(s, &lowered))
        .collect()
}

pub fn missing_sections(contract: &CompiledContract<'_>, actual: &str) -> Vec<String> {
    detect_sections(contract, actual)
        .into_iter()
        .filter(|d| !d.detected)
        .map(|d| d.name)
        .collect()
}

pub fn missing_markers(contract: &CompiledContract<'_>, actual: &str) -> Vec<String> {
    contract
        .contract
        .required_markers
        .iter()
        .filter(|m| !actual.contains(m.as_str()))
        .cloned()
        .collect()
}

pub fn below_min_length(contract: &CompiledContract<'_>, actual: &str) -> bool {
    char_len(actual) < contract.contract.length_bounds.min
}

fn fraction(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        1.0
    } else {
        numerator as f64 / denominator as f64
    }
}

struct SectionPresence;

impl DimensionScorer for SectionPresence {
    fn score(&self, _: &str, actual: &str, ctx: &ScoringContext<'_>) -> f64 {
        let Some(contract) = ctx.contract else {
            return 0.0;
        };
        let detections = detect_sections(contract, actual);
        fraction(detections.iter().filter(|d| d.detected).count(), detections.len())
    }
}

struct SectionOrder;

impl DimensionScorer for SectionOrder {
    fn score(&self, _: &str, actual: &str, ctx: &ScoringContext<'_>) -> f64 {
        let Some(contract) = ctx.contract else {
            return 0.0;
        };
        let Some(order) = &contract.contract.section_order else {
            return 1.0;
        };
        let mut detected: Vec<(usize, String)> = detect_sections(contract, actual)
            .into_iter()
            .filter(|d| d.detected)
            .filter_map(|d| d.first_position.map(|p| (p, d.name)))
            .collect();
        if detected.is_empty() {
            return 0.0;
        }
        detected.sort();
        let actual_order: Vec<&str> = detected.iter().map(|(_, n)| n.as_str()).collect();
        let expected_order: Vec<&str> = order
            .iter()
            .map(String::as_str)
            .filter(|n| actual_order.contains(n))
            .collect();
        lcs_len(&expected_order, &actual_order) as f64 / actual_order.len() as f64
    }
}

struct MarkerPresence;

impl DimensionScorer for MarkerPresence {
    fn score(&self, _: &str, actual: &str, ctx: &ScoringContext<'_>) -> f64 {
        let Some(contract) = ctx.contract else {
            return 0.0;
        };
        let total = contract.contract.required_markers.len();
        fraction(total - missing_markers(contract, actual).len(), total)
    }
}

struct BoundedLength;

impl DimensionScorer for BoundedLength {
    fn score(&self, _: &str, actual: &str, ctx: &ScoringContext<'_>) -> f64 {
        let Some(contract) = ctx.contract else {
            return 0.0;
        };
        let bounds = contract.contract.length_bounds;
        let len = char_len(actual);
        if len < bounds.min {
            return len as f64 / bounds.min as f64;
        }
        if len <= bounds.max {
            return 1.0;
        }
        if bounds.max == 0 {
            return 0.0;
        }
        (1.0 - (len - bounds.max) as f64 / bounds.max as f64).max(0.0)
    }
}

struct PatternCompliance;

impl DimensionScorer for PatternCompliance {
    fn score(&self, _: &str, actual: &str, ctx: &ScoringContext<'_>) -> f64 {
        let Some(contract) = ctx.contract else {
            return 0.0;
        };
        let required = contract.required.iter().filter(|(_, re)| re.is_match(actual)).count();
        let forbidden = contract.forbidden.iter().filter(|(_, re)| !re.is_match(actual)).count();
        fraction(
            required + forbidden,
            contract.required.len() + contract.forbidden.len(),
        )
    }
}

struct StructuralSimilarity {
    similarity: Arc<dyn SequenceSimilarity>,
}

impl DimensionScorer for StructuralSimilarity {
    fn score(&self, _: &str, actual: &str, ctx: &ScoringContext<'_>) -> f64 {
        let Some(contract) = ctx.contract else {
            return 0.0;
        };
        let references = &contract.contract.reference_examples;
        if references.is_empty() {
            return 1.0;
        }
        let encoded = skeleton::encode(actual);
        references
            .iter()
            .map(|r| self.similarity.similarity(&encoded, &skeleton::encode(r)))
            .fold(0.0, f64::max)
    }
}
