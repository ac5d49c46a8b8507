//! Fixture domain model.
//!
//! A fixture is a curated (input, expected output) pair replayed by the
//! regression runner. Fixtures are never deleted; demotion marks them inactive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Category whose fixtures legitimately expect an empty output.
pub const EMPTY_RESPONSE_CATEGORY: &str = "empty_response";

/// How hard a fixture is for the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }
}

/// Where a fixture came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Provenance {
    /// Written by hand.
    Curated,
    /// Promoted from a live capture.
    Capture { capture_id: Uuid },
    /// Bulk-imported from a fixture file.
    Import { source: String },
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Curated => "curated",
            Self::Capture { .. } => "capture",
            Self::Import { .. } => "import",
        }
    }
}

/// A curated input/expected-output pair with its pass/fail history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: Uuid,
    /// Human-friendly key, e.g. `conv-001`. Unique.
    pub key: String,
    pub input: String,
    pub expected_output: String,
    pub category: String,
    pub difficulty: Difficulty,
    pub provenance: Provenance,
    pub active: bool,
    /// Outcome of the most recent regression run; `None` until first run.
    pub last_pass: Option<bool>,
    pub fail_count: u32,
    pub last_regressed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Fixture {
    /// Create a new active fixture, enforcing the non-empty expectation invariant.
    pub fn new(
        key: impl Into<String>,
        input: impl Into<String>,
        expected_output: impl Into<String>,
        category: impl Into<String>,
        difficulty: Difficulty,
        provenance: Provenance,
    ) -> DomainResult<Self> {
        let now = Utc::now();
        let fixture = Self {
            id: Uuid::new_v4(),
            key: key.into(),
            input: input.into(),
            expected_output: expected_output.into(),
            category: category.into(),
            difficulty,
            provenance,
            active: true,
            last_pass: None,
            fail_count: 0,
            last_regressed_at: None,
            created_at: now,
            updated_at: now,
        };
        fixture.validate()?;
        Ok(fixture)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.key.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "fixture key cannot be empty".to_string(),
            ));
        }
        if self.category.trim().is_empty() {
            return Err(DomainError::ValidationFailed(format!(
                "fixture '{}' has an empty category",
                self.key
            )));
        }
        if self.expected_output.trim().is_empty() && self.category != EMPTY_RESPONSE_CATEGORY {
            return Err(DomainError::ValidationFailed(format!(
                "fixture '{}' has an empty expected output but category '{}' is not '{}'",
                self.key, self.category, EMPTY_RESPONSE_CATEGORY
            )));
        }
        Ok(())
    }

    /// Apply the outcome of one scored run to the history fields.
    pub fn apply_history(&mut self, update: &HistoryUpdate) {
        self.last_pass = Some(update.passed);
        if !update.passed {
            self.fail_count += 1;
        }
        if update.regressed {
            self.last_regressed_at = Some(update.evaluated_at);
        }
        self.updated_at = update.evaluated_at;
    }
}

/// History write-back for one fixture, produced by a regression run and
/// applied after all scoring has finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryUpdate {
    pub fixture_id: Uuid,
    pub passed: bool,
    pub regressed: bool,
    pub evaluated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_expected_rejected_outside_empty_response() {
        let result = Fixture::new(
            "f-1",
            "hi",
            "  ",
            "conversation",
            Difficulty::Easy,
            Provenance::Curated,
        );
        assert!(matches!(result, Err(DomainError::ValidationFailed(_))));
    }

    #[test]
    fn test_empty_expected_allowed_for_empty_response() {
        let fixture = Fixture::new(
            "f-2",
            "[reaction only]",
            "",
            EMPTY_RESPONSE_CATEGORY,
            Difficulty::Easy,
            Provenance::Curated,
        )
        .unwrap();
        assert!(fixture.active);
        assert_eq!(fixture.last_pass, None);
    }

    #[test]
    fn test_apply_history_tracks_regression() {
        let mut fixture = Fixture::new(
            "f-3",
            "in",
            "out",
            "conversation",
            Difficulty::Medium,
            Provenance::Curated,
        )
        .unwrap();
        let at = Utc::now();
        fixture.apply_history(&HistoryUpdate {
            fixture_id: fixture.id,
            passed: false,
            regressed: true,
            evaluated_at: at,
        });
        assert_eq!(fixture.last_pass, Some(false));
        assert_eq!(fixture.fail_count, 1);
        assert_eq!(fixture.last_regressed_at, Some(at));
    }

    #[test]
    fn test_difficulty_round_trip_str() {
        for d in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
            assert_eq!(Difficulty::from_str(d.as_str()), Some(d));
        }
        assert_eq!(Difficulty::from_str("extreme"), None);
    }
}
