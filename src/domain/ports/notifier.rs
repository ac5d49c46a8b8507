//! Notification port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainResult;

/// Structured event emitted when something a human should know about happens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    CycleCommitted {
        cycle_id: Uuid,
        stage: String,
        score_delta: f64,
        regressions: u32,
        improvements: u32,
        checkpoint_required: bool,
    },
    CycleRolledBack {
        cycle_id: Uuid,
        stage: String,
        score_delta: Option<f64>,
        regressions: u32,
        improvements: u32,
        reason: String,
    },
    RegressionsDetected {
        run_id: Uuid,
        regressions: u32,
        fixture_keys: Vec<String>,
    },
    QualityDigest {
        headline: String,
        actions: Vec<String>,
    },
}

impl NotificationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CycleCommitted { .. } => "cycle_committed",
            Self::CycleRolledBack { .. } => "cycle_rolled_back",
            Self::RegressionsDetected { .. } => "regressions_detected",
            Self::QualityDigest { .. } => "quality_digest",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> DomainResult<()>;
}
