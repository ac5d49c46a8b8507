//! Capture domain model.
//!
//! A capture is one live (input, produced output) pair reported by a
//! production pipeline. Captures are immutable apart from their review state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Quality signals attached to a capture by its producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QualityFlags {
    pub empty: bool,
    pub artifact_leak: bool,
    pub echo_leak: bool,
    pub truncated: bool,
}

impl QualityFlags {
    pub fn any(&self) -> bool {
        self.empty || self.artifact_leak || self.echo_leak || self.truncated
    }
}

/// A logged live output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub input: String,
    pub produced_output: String,
    /// Produced by a scheduled job rather than a user message.
    pub is_scheduled: bool,
    pub contract_id: Option<Uuid>,
    pub quality_flags: QualityFlags,
    pub reviewed: bool,
    pub promoted: bool,
    pub linked_fixture_id: Option<Uuid>,
}

impl Capture {
    pub fn new(
        input: impl Into<String>,
        produced_output: impl Into<String>,
        quality_flags: QualityFlags,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            captured_at: Utc::now(),
            input: input.into(),
            produced_output: produced_output.into(),
            is_scheduled: false,
            contract_id: None,
            quality_flags,
            reviewed: false,
            promoted: false,
            linked_fixture_id: None,
        }
    }

    pub fn scheduled(mut self, contract_id: Option<Uuid>) -> Self {
        self.is_scheduled = true;
        self.contract_id = contract_id;
        self
    }

    pub fn with_contract(mut self, contract_id: Uuid) -> Self {
        self.contract_id = Some(contract_id);
        self
    }

    /// A scheduled output whose gathered input was blank.
    pub fn upstream_data_empty(&self) -> bool {
        self.is_scheduled && self.input.trim().is_empty()
    }
}

/// Per-flag counts over a capture window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaptureFlagCounts {
    pub total: u64,
    pub flagged: u64,
    pub empty: u64,
    pub artifact_leak: u64,
    pub echo_leak: u64,
    pub truncated: u64,
}

impl CaptureFlagCounts {
    /// Fraction of captures carrying at least one quality flag.
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.flagged as f64 / self.total as f64
        }
    }

    pub fn add(&mut self, flags: &QualityFlags) {
        self.total += 1;
        if flags.any() {
            self.flagged += 1;
        }
        self.empty += u64::from(flags.empty);
        self.artifact_leak += u64::from(flags.artifact_leak);
        self.echo_leak += u64::from(flags.echo_leak);
        self.truncated += u64::from(flags.truncated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_data_empty_only_for_scheduled() {
        let live = Capture::new("   ", "output", QualityFlags::default());
        assert!(!live.upstream_data_empty());

        let scheduled = Capture::new("  \n", "output", QualityFlags::default()).scheduled(None);
        assert!(scheduled.upstream_data_empty());
    }

    #[test]
    fn test_flag_counts_failure_rate() {
        let mut counts = CaptureFlagCounts::default();
        counts.add(&QualityFlags::default());
        counts.add(&QualityFlags {
            echo_leak: true,
            truncated: true,
            ..Default::default()
        });
        assert_eq!(counts.total, 2);
        assert_eq!(counts.flagged, 1);
        assert_eq!(counts.echo_leak, 1);
        assert!((counts.failure_rate() - 0.5).abs() < f64::EPSILON);
    }
}
