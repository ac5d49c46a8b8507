//! Human feedback domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category for feedback that maps to no pipeline stage.
pub const GENERAL_CATEGORY: &str = "general";

/// Surface the feedback arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMethod {
    Reaction,
    Command,
    FreeText,
    Api,
}

impl InputMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reaction => "reaction",
            Self::Command => "command",
            Self::FreeText => "free_text",
            Self::Api => "api",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "reaction" => Some(Self::Reaction),
            "command" => Some(Self::Command),
            "free_text" | "text" => Some(Self::FreeText),
            "api" => Some(Self::Api),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackPriority {
    #[default]
    Normal,
    High,
}

impl FeedbackPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Lifecycle of a feedback item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    Pending,
    Processing,
    Resolved,
    WontFix,
    Duplicate,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Resolved => "resolved",
            Self::WontFix => "wont_fix",
            Self::Duplicate => "duplicate",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "resolved" => Some(Self::Resolved),
            "wont_fix" => Some(Self::WontFix),
            "duplicate" => Some(Self::Duplicate),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::WontFix | Self::Duplicate)
    }

    /// Forward-only transitions, plus `processing -> pending` on rollback.
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Pending)
                | (
                    Self::Pending | Self::Processing,
                    Self::Resolved | Self::WontFix | Self::Duplicate
                )
        )
    }
}

/// A human-supplied quality signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub input_method: InputMethod,
    /// Stage name, or [`GENERAL_CATEGORY`].
    pub category: String,
    pub linked_capture_id: Option<Uuid>,
    pub priority: FeedbackPriority,
    pub description: Option<String>,
    pub status: FeedbackStatus,
    pub consumed_by_cycle_id: Option<Uuid>,
    pub resolution_note: Option<String>,
}

/// Status counts across all feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeedbackCounts {
    pub pending: u64,
    pub processing: u64,
    pub resolved: u64,
    pub wont_fix: u64,
    pub duplicate: u64,
    pub high_priority_pending: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_forward_only() {
        use FeedbackStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Pending));
        assert!(Processing.can_transition_to(Resolved));
        assert!(Pending.can_transition_to(WontFix));
        assert!(!Resolved.can_transition_to(Pending));
        assert!(!Resolved.can_transition_to(Processing));
        assert!(!Duplicate.can_transition_to(Resolved));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_priority_orders_high_first() {
        assert!(FeedbackPriority::High > FeedbackPriority::Normal);
    }
}
