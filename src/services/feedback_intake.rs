//! Feedback intake.
//!
//! Records human quality signals synchronously and exposes the pending queue
//! the improvement cycle consumes. Free-text feedback without an explicit
//! category is routed to a pipeline stage through a fixed keyword table.

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    stage, FeedbackCounts, FeedbackItem, FeedbackPriority, FeedbackStatus, InputMethod,
    GENERAL_CATEGORY,
};
use crate::domain::ports::{CaptureRepository, FeedbackRepository};

/// Stage keyword table, in tie-break order.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        stage::ECHO_REMOVAL,
        &["echo", "echoed", "echoes", "repeated my", "repeats my", "parrot"],
    ),
    (
        stage::ARTIFACT_STRIPPING,
        &[
            "artifact", "artifacts", "im_end", "special token", "garbage", "raw tag", "tags",
        ],
    ),
    (
        stage::STRUCTURE_REPAIR,
        &[
            "table", "tables", "formatting", "format", "markdown", "code block", "bold", "layout",
        ],
    ),
    (
        stage::LENGTH_LIMITING,
        &[
            "too long", "cut off", "truncated", "length", "verbose", "wall of text", "too short",
        ],
    ),
    (
        stage::NOISE_FILTERING,
        &["filler", "noise", "as an ai", "hope this helps", "undefined", "boilerplate"],
    ),
    (
        stage::CONTENT_EXTRACTION,
        &["missing", "dropped", "lost", "incomplete", "left out", "omitted"],
    ),
    (
        stage::PROMPT_INSTRUCTIONS,
        &["tone", "instruction", "instructions", "ignored", "section", "rude"],
    ),
];

static CATEGORY_MATCHERS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    CATEGORY_KEYWORDS
        .iter()
        .map(|(stage, words)| {
            let alternation = words
                .iter()
                .map(|w| regex::escape(w))
                .collect::<Vec<_>>()
                .join("|");
            let re = Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
                .expect("valid category keyword regex");
            (*stage, re)
        })
        .collect()
});

/// Map free text to the stage with the most keyword hits, or `general`.
pub fn infer_category(text: &str) -> String {
    let mut best: Option<(&str, usize)> = None;
    for (stage, re) in CATEGORY_MATCHERS.iter() {
        let hits = re.find_iter(text).count();
        if hits > 0 && best.is_none_or(|(_, b)| hits > b) {
            best = Some((*stage, hits));
        }
    }
    best.map_or_else(|| GENERAL_CATEGORY.to_string(), |(s, _)| s.to_string())
}

fn is_known_category(category: &str) -> bool {
    category == GENERAL_CATEGORY || stage::ALL.contains(&category)
}

/// A new feedback item as submitted by a human.
#[derive(Debug, Clone, Default)]
pub struct NewFeedback {
    pub input_method: Option<InputMethod>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub linked_capture_id: Option<Uuid>,
    pub priority: FeedbackPriority,
}

pub struct FeedbackIntake {
    feedback: Arc<dyn FeedbackRepository>,
    captures: Arc<dyn CaptureRepository>,
}

impl FeedbackIntake {
    pub fn new(
        feedback: Arc<dyn FeedbackRepository>,
        captures: Arc<dyn CaptureRepository>,
    ) -> Self {
        Self { feedback, captures }
    }

    /// Persist a feedback item and return it. The item is durable once this returns.
    pub async fn record(&self, new: NewFeedback) -> DomainResult<FeedbackItem> {
        if let Some(capture_id) = new.linked_capture_id {
            if self.captures.get(capture_id).await?.is_none() {
                return Err(DomainError::CaptureNotFound(capture_id));
            }
        }

        let category = match new.category.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => {
                let c = c.to_lowercase();
                if !is_known_category(&c) {
                    return Err(DomainError::UnknownStage(c));
                }
                c
            }
            _ => new
                .description
                .as_deref()
                .map_or_else(|| GENERAL_CATEGORY.to_string(), infer_category),
        };

        let now = Utc::now();
        let item = FeedbackItem {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            input_method: new.input_method.unwrap_or(InputMethod::Api),
            category,
            linked_capture_id: new.linked_capture_id,
            priority: new.priority,
            description: new.description,
            status: FeedbackStatus::Pending,
            consumed_by_cycle_id: None,
            resolution_note: None,
        };
        self.feedback.insert(&item).await?;

        tracing::info!(
            feedback_id = %item.id,
            category = %item.category,
            priority = item.priority.as_str(),
            "Feedback recorded"
        );
        Ok(item)
    }

    /// Pending items, high priority first, then oldest first.
    pub async fn pending(&self) -> DomainResult<Vec<FeedbackItem>> {
        self.feedback.pending().await
    }

    pub async fn get(&self, id: Uuid) -> DomainResult<FeedbackItem> {
        self.feedback
            .get(id)
            .await?
            .ok_or(DomainError::FeedbackNotFound(id))
    }

    pub async fn counts(&self) -> DomainResult<FeedbackCounts> {
        self.feedback.counts().await
    }

    /// Move an item to `status`, enforcing the forward-only lifecycle.
    pub async fn transition(
        &self,
        id: Uuid,
        status: FeedbackStatus,
        cycle_id: Option<Uuid>,
        note: Option<&str>,
    ) -> DomainResult<FeedbackItem> {
        let mut item = self.get(id).await?;
        if !item.status.can_transition_to(status) {
            return Err(DomainError::InvalidStateTransition {
                from: item.status.as_str().to_string(),
                to: status.as_str().to_string(),
                reason: format!("feedback {id} cannot move backwards"),
            });
        }
        let consumed_by = match status {
            FeedbackStatus::Pending => None,
            _ => cycle_id.or(item.consumed_by_cycle_id),
        };
        self.feedback
            .update_status(id, status, consumed_by, note)
            .await?;
        item.status = status;
        item.consumed_by_cycle_id = consumed_by;
        if let Some(note) = note {
            item.resolution_note = Some(note.to_string());
        }
        item.updated_at = Utc::now();
        Ok(item)
    }

    pub async fn resolve(&self, id: Uuid, note: Option<&str>) -> DomainResult<FeedbackItem> {
        self.transition(id, FeedbackStatus::Resolved, None, note).await
    }

    pub async fn wont_fix(&self, id: Uuid, note: Option<&str>) -> DomainResult<FeedbackItem> {
        self.transition(id, FeedbackStatus::WontFix, None, note).await
    }

    pub async fn mark_duplicate(
        &self,
        id: Uuid,
        note: Option<&str>,
    ) -> DomainResult<FeedbackItem> {
        self.transition(id, FeedbackStatus::Duplicate, None, note).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteCaptureRepository, SqliteFeedbackRepository,
    };
    use crate::domain::models::{Capture, QualityFlags};

    async fn setup() -> (FeedbackIntake, Arc<SqliteCaptureRepository>) {
        let pool = create_migrated_test_pool().await.unwrap();
        let captures = Arc::new(SqliteCaptureRepository::new(pool.clone()));
        let intake = FeedbackIntake::new(
            Arc::new(SqliteFeedbackRepository::new(pool)),
            captures.clone(),
        );
        (intake, captures)
    }

    #[test]
    fn test_infer_category() {
        assert_eq!(infer_category("It echoed my whole question back"), stage::ECHO_REMOVAL);
        assert_eq!(infer_category("The table formatting is broken"), stage::STRUCTURE_REPAIR);
        assert_eq!(infer_category("Reply was cut off, way too long"), stage::LENGTH_LIMITING);
        assert_eq!(infer_category("meh"), GENERAL_CATEGORY);
    }

    #[tokio::test]
    async fn test_record_infers_category_and_is_pending() {
        let (intake, _) = setup().await;
        let item = intake
            .record(NewFeedback {
                input_method: Some(InputMethod::FreeText),
                description: Some("it keeps leaking im_end artifacts".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(item.category, stage::ARTIFACT_STRIPPING);
        assert_eq!(item.status, FeedbackStatus::Pending);
        assert_eq!(intake.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_linked_capture_must_exist() {
        let (intake, captures) = setup().await;
        let missing = intake
            .record(NewFeedback {
                linked_capture_id: Some(Uuid::new_v4()),
                ..Default::default()
            })
            .await;
        assert!(matches!(missing, Err(DomainError::CaptureNotFound(_))));

        let capture = Capture::new("q", "a", QualityFlags::default());
        captures.insert(&capture).await.unwrap();
        let item = intake
            .record(NewFeedback {
                linked_capture_id: Some(capture.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(item.linked_capture_id, Some(capture.id));
        assert_eq!(item.category, GENERAL_CATEGORY);
    }

    #[tokio::test]
    async fn test_unknown_category_rejected() {
        let (intake, _) = setup().await;
        let result = intake
            .record(NewFeedback {
                category: Some("vibes".to_string()),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(DomainError::UnknownStage(_))));
    }

    #[tokio::test]
    async fn test_pending_orders_by_priority_then_age() {
        let (intake, _) = setup().await;
        let first = intake.record(NewFeedback::default()).await.unwrap();
        let urgent = intake
            .record(NewFeedback {
                priority: FeedbackPriority::High,
                ..Default::default()
            })
            .await
            .unwrap();
        let second = intake.record(NewFeedback::default()).await.unwrap();

        let ids: Vec<Uuid> = intake.pending().await.unwrap().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![urgent.id, first.id, second.id]);
    }

    #[tokio::test]
    async fn test_resolved_cannot_reopen() {
        let (intake, _) = setup().await;
        let item = intake.record(NewFeedback::default()).await.unwrap();
        let resolved = intake.resolve(item.id, Some("fixed")).await.unwrap();
        assert_eq!(resolved.status, FeedbackStatus::Resolved);

        let reopened = intake
            .transition(item.id, FeedbackStatus::Pending, None, None)
            .await;
        assert!(matches!(reopened, Err(DomainError::InvalidStateTransition { .. })));
        assert!(intake.wont_fix(item.id, None).await.is_err());
        assert_eq!(intake.counts().await.unwrap().resolved, 1);
    }
}
