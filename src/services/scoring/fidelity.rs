//! Transform fidelity dimensions.
//!
//! Every penalty is measured relative to the expected output, so an output
//! identical to its expectation always scores 1.0.

use regex::Regex;

use super::text::{
    char_len, count_occurrences, fence_count, normalize_whitespace, tail_chars, token_set,
};
use super::{DimensionScorer, DimensionSet, PassThreshold, ScoringContext, TRANSFORM_FIDELITY};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::score::dimensions;
use crate::domain::models::{QualityFlags, ScoringConfig};

const BETA_SQUARED: f64 = 4.0;

pub(super) fn dimension_set(config: &ScoringConfig) -> DomainResult<DimensionSet> {
    DimensionSet::builder(TRANSFORM_FIDELITY, PassThreshold::Fixed(config.pass_threshold))
        .dimension(dimensions::CONTENT_PRESERVATION, 0.30, ContentPreservation)
        .dimension(
            dimensions::ARTIFACT_CLEANLINESS,
            0.20,
            ArtifactCleanliness::new(config.forbidden_markers.clone()),
        )
        .dimension(
            dimensions::ECHO_REMOVAL,
            0.15,
            EchoRemoval::new(config.echo_min_chars),
        )
        .dimension(dimensions::STRUCTURAL_INTEGRITY, 0.15, StructuralIntegrity)
        .dimension(
            dimensions::LENGTH_COMPLIANCE,
            0.10,
            LengthCompliance::new(config.delivery_limit),
        )
        .dimension(
            dimensions::NOISE_REMOVAL,
            0.10,
            NoiseRemoval::compile(&config.noise_patterns)?,
        )
        .build()
}

/// F2 over normalized token sets; recall weighs four times precision.
pub struct ContentPreservation;

impl DimensionScorer for ContentPreservation {
    fn score(&self, expected: &str, actual: &str, _: &ScoringContext<'_>) -> f64 {
        let expected = token_set(expected);
        let actual = token_set(actual);
        match (expected.is_empty(), actual.is_empty()) {
            (true, true) => return 1.0,
            (true, false) | (false, true) => return 0.0,
            (false, false) => {}
        }
        let overlap = expected.intersection(&actual).count() as f64;
        if overlap == 0.0 {
            return 0.0;
        }
        let precision = overlap / actual.len() as f64;
        let recall = overlap / expected.len() as f64;
        (1.0 + BETA_SQUARED) * precision * recall / (BETA_SQUARED * precision + recall)
    }
}

/// Binary: a forbidden low-level marker leaked into the output.
pub struct ArtifactCleanliness {
    markers: Vec<String>,
}

impl ArtifactCleanliness {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }

    pub fn leaked(&self, expected: &str, actual: &str) -> bool {
        self.markers
            .iter()
            .any(|m| actual.contains(m.as_str()) && !expected.contains(m.as_str()))
    }
}

impl DimensionScorer for ArtifactCleanliness {
    fn score(&self, expected: &str, actual: &str, _: &ScoringContext<'_>) -> f64 {
        if self.leaked(expected, actual) {
            0.0
        } else {
            1.0
        }
    }
}

/// Binary: the tail of the triggering input was repeated back.
pub struct EchoRemoval {
    min_chars: usize,
}

impl EchoRemoval {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }

    pub fn echoed(&self, input: &str, expected: &str, actual: &str) -> bool {
        let input = normalize_whitespace(input);
        if self.min_chars == 0 || char_len(&input) < self.min_chars {
            return false;
        }
        let tail = tail_chars(&input, self.min_chars);
        normalize_whitespace(actual).contains(tail)
            && !normalize_whitespace(expected).contains(tail)
    }
}

impl DimensionScorer for EchoRemoval {
    fn score(&self, expected: &str, actual: &str, ctx: &ScoringContext<'_>) -> f64 {
        if self.echoed(ctx.input, expected, actual) {
            0.0
        } else {
            1.0
        }
    }
}

/// Code fences, tables and emphasis markers that survived the transform.
pub struct StructuralIntegrity;

#[derive(Debug, Default, Clone, Copy)]
struct TableShape {
    rows: usize,
    broken: usize,
}

impl TableShape {
    fn of(text: &str) -> Self {
        let mut shape = Self::default();
        for line in text.lines().map(str::trim) {
            if !line.starts_with('|') || line.len() < 2 {
                continue;
            }
            if line.ends_with('|') && line.matches('|').count() >= 2 {
                shape.rows += 1;
            } else {
                shape.broken += 1;
            }
        }
        shape
    }
}

fn emphasis_count(text: &str) -> usize {
    ["**", "__", "~~"]
        .iter()
        .map(|m| count_occurrences(text, m))
        .sum()
}

fn fraction_lost(expected: usize, actual: usize) -> f64 {
    if expected == 0 {
        0.0
    } else {
        expected.saturating_sub(actual) as f64 / expected as f64
    }
}

impl StructuralIntegrity {
    fn fence_penalty(expected: &str, actual: &str) -> f64 {
        let expected_balanced = fence_count(expected) % 2 == 0;
        let actual_balanced = fence_count(actual) % 2 == 0;
        if expected_balanced && !actual_balanced {
            1.0
        } else {
            0.0
        }
    }

    fn table_penalty(expected: &str, actual: &str) -> f64 {
        let expected = TableShape::of(expected);
        let actual = TableShape::of(actual);
        let lost = fraction_lost(expected.rows, actual.rows);
        let table_lines = actual.rows + actual.broken;
        let newly_broken = if table_lines == 0 {
            0.0
        } else {
            actual.broken.saturating_sub(expected.broken) as f64 / table_lines as f64
        };
        lost.max(newly_broken).min(1.0)
    }

    fn emphasis_penalty(expected: &str, actual: &str) -> f64 {
        fraction_lost(emphasis_count(expected), emphasis_count(actual))
    }
}

impl DimensionScorer for StructuralIntegrity {
    fn score(&self, expected: &str, actual: &str, _: &ScoringContext<'_>) -> f64 {
        let score = 1.0
            - 0.4 * Self::fence_penalty(expected, actual)
            - 0.4 * Self::table_penalty(expected, actual)
            - 0.2 * Self::emphasis_penalty(expected, actual);
        score.max(0.0)
    }
}

/// Full marks up to the delivery limit, linear decay to zero at twice the limit.
pub struct LengthCompliance {
    limit: usize,
}

impl LengthCompliance {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl DimensionScorer for LengthCompliance {
    fn score(&self, expected: &str, actual: &str, _: &ScoringContext<'_>) -> f64 {
        let limit = self.limit.max(char_len(expected));
        let len = char_len(actual);
        if len <= limit {
            return 1.0;
        }
        if limit == 0 {
            return 0.0;
        }
        (1.0 - (len - limit) as f64 / limit as f64).max(0.0)
    }
}

/// Filler phrases and leaked placeholders; each extra match costs 0.1.
pub struct NoiseRemoval {
    patterns: Vec<Regex>,
}

impl NoiseRemoval {
    pub fn compile(patterns: &[String]) -> DomainResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    DomainError::ValidationFailed(format!("bad noise pattern '{p}': {e}"))
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    fn matches(&self, text: &str) -> usize {
        self.patterns.iter().map(|re| re.find_iter(text).count()).sum()
    }
}

impl DimensionScorer for NoiseRemoval {
    fn score(&self, expected: &str, actual: &str, _: &ScoringContext<'_>) -> f64 {
        let extra = self.matches(actual).saturating_sub(self.matches(expected));
        (1.0 - 0.1 * extra as f64).max(0.0)
    }
}

/// Quality flags for a live output, for producers that cannot judge their own output.
pub fn detect_quality_flags(input: &str, output: &str, config: &ScoringConfig) -> QualityFlags {
    let artifacts = ArtifactCleanliness::new(config.forbidden_markers.clone());
    let echo = EchoRemoval::new(config.echo_min_chars);
    QualityFlags {
        empty: output.trim().is_empty(),
        artifact_leak: artifacts.leaked("", output),
        echo_leak: echo.echoed(input, "", output),
        truncated: fence_count(output) % 2 == 1 || char_len(output) > config.delivery_limit,
    }
}
