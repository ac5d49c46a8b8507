//! Drift record domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::score::ScoreResult;

/// Action recommended for a drifted live output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    /// Output is compliant.
    None,
    CheckDataSource,
    ReinforceSection,
    CheckSharedDataSource,
    ReviewEmptyDataHandling,
    ReinforceFormatting,
    HumanReviewPossibleRedesign,
    /// Drifted, but no specific rule matched.
    Investigate,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::CheckDataSource => "check_data_source",
            Self::ReinforceSection => "reinforce_section",
            Self::CheckSharedDataSource => "check_shared_data_source",
            Self::ReviewEmptyDataHandling => "review_empty_data_handling",
            Self::ReinforceFormatting => "reinforce_formatting",
            Self::HumanReviewPossibleRedesign => "human_review_possible_redesign",
            Self::Investigate => "investigate",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "check_data_source" => Some(Self::CheckDataSource),
            "reinforce_section" => Some(Self::ReinforceSection),
            "check_shared_data_source" => Some(Self::CheckSharedDataSource),
            "review_empty_data_handling" => Some(Self::ReviewEmptyDataHandling),
            "reinforce_formatting" => Some(Self::ReinforceFormatting),
            "human_review_possible_redesign" => Some(Self::HumanReviewPossibleRedesign),
            "investigate" => Some(Self::Investigate),
            _ => None,
        }
    }

    /// Human-readable instruction.
    pub fn description(&self) -> &'static str {
        match self {
            Self::None => "no action needed",
            Self::CheckDataSource => "check data source",
            Self::ReinforceSection => "reinforce section in instructions",
            Self::CheckSharedDataSource => "check shared data source health",
            Self::ReviewEmptyDataHandling => "review empty-data handling",
            Self::ReinforceFormatting => "reinforce formatting instructions",
            Self::HumanReviewPossibleRedesign => {
                "flag for human review, possible intentional redesign"
            }
            Self::Investigate => "investigate compliance drop",
        }
    }
}

/// One evaluation of a live capture against a contract. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftRecord {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub capture_id: Uuid,
    pub score: ScoreResult,
    pub drifted: bool,
    pub explanation: Vec<String>,
    pub recommended_action: RecommendedAction,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_str_round_trip() {
        let all = [
            RecommendedAction::None,
            RecommendedAction::CheckDataSource,
            RecommendedAction::ReinforceSection,
            RecommendedAction::CheckSharedDataSource,
            RecommendedAction::ReviewEmptyDataHandling,
            RecommendedAction::ReinforceFormatting,
            RecommendedAction::HumanReviewPossibleRedesign,
            RecommendedAction::Investigate,
        ];
        for action in all {
            assert_eq!(RecommendedAction::from_str(action.as_str()), Some(action));
        }
    }
}
