//! Score value types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A dimension scoring below this value is reported as failing.
pub const FAILING_DIMENSION_THRESHOLD: f64 = 0.8;

/// Weighted multi-dimension quality score for one (expected, actual) pair.
///
/// Always attached to a fixture run or a capture/contract pairing; never
/// persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Name of the dimension set that produced this score.
    pub dimension_set: String,
    pub dimensions: BTreeMap<String, f64>,
    pub weights: BTreeMap<String, f64>,
    pub overall: f64,
    pub threshold: f64,
    pub passed: bool,
    /// Dimensions below [`FAILING_DIMENSION_THRESHOLD`], in dimension-set order.
    pub failing_dimensions: Vec<String>,
}

impl ScoreResult {
    pub fn dimension(&self, name: &str) -> Option<f64> {
        self.dimensions.get(name).copied()
    }

    pub fn is_failing(&self, name: &str) -> bool {
        self.failing_dimensions.iter().any(|d| d == name)
    }
}

/// Dimension names of the two built-in dimension sets.
pub mod dimensions {
    pub const CONTENT_PRESERVATION: &str = "content_preservation";
    pub const ARTIFACT_CLEANLINESS: &str = "artifact_cleanliness";
    pub const ECHO_REMOVAL: &str = "echo_removal";
    pub const STRUCTURAL_INTEGRITY: &str = "structural_integrity";
    pub const LENGTH_COMPLIANCE: &str = "length_compliance";
    pub const NOISE_REMOVAL: &str = "noise_removal";

    pub const SECTION_PRESENCE: &str = "section_presence";
    pub const SECTION_ORDER: &str = "section_order";
    pub const MARKER_PRESENCE: &str = "marker_presence";
    pub const PATTERN_COMPLIANCE: &str = "pattern_compliance";
    pub const STRUCTURAL_SIMILARITY: &str = "structural_similarity";
}
