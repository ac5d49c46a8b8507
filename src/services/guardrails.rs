//! Guardrails for proposed pipeline changes.
//!
//! A proposal may touch exactly one stage, the cycle's target, with a bounded
//! diff that changes no signature lines, keeps the stage order and adds no
//! dependencies. Any violation forces a rollback before validation runs.

use regex::Regex;
use similar::{ChangeTag, TextDiff};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ChangeProposal, CycleConfig, GuardrailViolation, StageSnapshot};

/// Result of a guardrail check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardrailResult {
    /// Change is allowed; carries its size in changed lines.
    Allowed { diff_lines: usize },
    /// Change is blocked.
    Blocked(GuardrailViolation),
}

impl GuardrailResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }
}

/// Line-level summary of a stage edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineDiff {
    pub inserted: Vec<String>,
    pub deleted: Vec<String>,
}

impl LineDiff {
    pub fn compute(old: &str, new: &str) -> Self {
        let mut diff = Self::default();
        for change in TextDiff::from_lines(old, new).iter_all_changes() {
            let line = change.value().trim_end_matches(['\r', '\n']).to_string();
            match change.tag() {
                ChangeTag::Insert => diff.inserted.push(line),
                ChangeTag::Delete => diff.deleted.push(line),
                ChangeTag::Equal => {}
            }
        }
        diff
    }

    pub fn changed_lines(&self) -> usize {
        self.inserted.len() + self.deleted.len()
    }
}

#[derive(Debug, Clone)]
pub struct ChangeGuardrails {
    max_diff_lines: usize,
    signature: Regex,
    dependency: Regex,
}

impl ChangeGuardrails {
    pub fn new(config: &CycleConfig) -> DomainResult<Self> {
        let compile = |what: &str, pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                DomainError::ValidationFailed(format!("invalid {what} pattern '{pattern}': {e}"))
            })
        };
        Ok(Self {
            max_diff_lines: config.max_diff_lines,
            signature: compile("signature", &config.signature_pattern)?,
            dependency: compile("dependency", &config.dependency_pattern)?,
        })
    }

    /// Check `proposal` against the current state of the target stage.
    pub fn check(
        &self,
        target_stage: &str,
        proposal: &ChangeProposal,
        current: &StageSnapshot,
        stage_order: &[String],
    ) -> GuardrailResult {
        match self.violation(target_stage, proposal, current, stage_order) {
            Ok(diff_lines) => GuardrailResult::Allowed { diff_lines },
            Err(violation) => {
                tracing::warn!(
                    stage = target_stage,
                    violation = violation.kind(),
                    detail = %violation,
                    "Change proposal blocked by guardrail"
                );
                GuardrailResult::Blocked(violation)
            }
        }
    }

    fn violation(
        &self,
        target_stage: &str,
        proposal: &ChangeProposal,
        current: &StageSnapshot,
        stage_order: &[String],
    ) -> Result<usize, GuardrailViolation> {
        let touched = proposal.touched_stages();
        if touched.len() > 1 {
            return Err(GuardrailViolation::MultipleStagesTouched { stages: touched });
        }
        if let Some(stage) = touched.first() {
            if stage != target_stage {
                return Err(GuardrailViolation::WrongStage {
                    target: target_stage.to_string(),
                    touched: stage.clone(),
                });
            }
        }
        if let Some(order) = &proposal.stage_order {
            if order.as_slice() != stage_order {
                return Err(GuardrailViolation::StageReordered);
            }
        }
        if !proposal.new_dependencies.is_empty() {
            return Err(GuardrailViolation::NewDependency {
                names: proposal.new_dependencies.clone(),
            });
        }

        let Some(edit) = proposal.edits.last() else {
            return Err(GuardrailViolation::EmptyChange);
        };
        let diff = LineDiff::compute(&current.content, &edit.new_content);
        let lines = diff.changed_lines();
        if lines == 0 {
            return Err(GuardrailViolation::EmptyChange);
        }
        if lines > self.max_diff_lines {
            return Err(GuardrailViolation::DiffTooLarge {
                lines,
                limit: self.max_diff_lines,
            });
        }
        if diff
            .inserted
            .iter()
            .chain(&diff.deleted)
            .any(|l| self.signature.is_match(l))
        {
            return Err(GuardrailViolation::SignatureChanged {
                stage: target_stage.to_string(),
            });
        }
        let added: Vec<String> = diff
            .inserted
            .iter()
            .filter(|l| self.dependency.is_match(l))
            .map(|l| l.trim().to_string())
            .collect();
        if !added.is_empty() {
            return Err(GuardrailViolation::NewDependency { names: added });
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::StageEdit;

    const STAGE: &str = "echo_removal";

    fn guardrails() -> ChangeGuardrails {
        ChangeGuardrails::new(&CycleConfig::default()).unwrap()
    }

    fn snapshot(content: &str) -> StageSnapshot {
        StageSnapshot {
            stage: STAGE.to_string(),
            content: content.to_string(),
        }
    }

    fn edit(stage: &str, content: &str) -> StageEdit {
        StageEdit {
            stage: stage.to_string(),
            new_content: content.to_string(),
        }
    }

    fn order() -> Vec<String> {
        vec!["content_extraction".to_string(), STAGE.to_string()]
    }

    fn numbered(n: usize) -> String {
        (0..n).map(|i| format!("rule {i}\n")).collect()
    }

    #[test]
    fn test_small_change_allowed() {
        let proposal = ChangeProposal {
            edits: vec![edit(STAGE, "strip tail\nstrip echoes of the last line\n")],
            ..Default::default()
        };
        let result = guardrails().check(STAGE, &proposal, &snapshot("strip tail\n"), &order());
        assert_eq!(result, GuardrailResult::Allowed { diff_lines: 1 });
    }

    #[test]
    fn test_large_diff_blocked() {
        let proposal = ChangeProposal {
            edits: vec![edit(STAGE, &numbered(140))],
            ..Default::default()
        };
        let result = guardrails().check(STAGE, &proposal, &snapshot(""), &order());
        assert_eq!(
            result,
            GuardrailResult::Blocked(GuardrailViolation::DiffTooLarge {
                lines: 140,
                limit: 100
            })
        );
    }

    #[test]
    fn test_two_stages_blocked() {
        let proposal = ChangeProposal {
            edits: vec![edit(STAGE, "a\n"), edit("noise_filtering", "b\n")],
            ..Default::default()
        };
        let result = guardrails().check(STAGE, &proposal, &snapshot(""), &order());
        assert!(matches!(
            result,
            GuardrailResult::Blocked(GuardrailViolation::MultipleStagesTouched { .. })
        ));
    }

    #[test]
    fn test_wrong_stage_blocked() {
        let proposal = ChangeProposal {
            edits: vec![edit("noise_filtering", "b\n")],
            ..Default::default()
        };
        let result = guardrails().check(STAGE, &proposal, &snapshot(""), &order());
        assert!(matches!(
            result,
            GuardrailResult::Blocked(GuardrailViolation::WrongStage { .. })
        ));
    }

    #[test]
    fn test_signature_change_blocked() {
        let proposal = ChangeProposal {
            edits: vec![edit(STAGE, "fn strip(text: &str, limit: usize) -> String\n")],
            ..Default::default()
        };
        let result = guardrails().check(
            STAGE,
            &proposal,
            &snapshot("fn strip(text: &str) -> String\n"),
            &order(),
        );
        assert!(matches!(
            result,
            GuardrailResult::Blocked(GuardrailViolation::SignatureChanged { .. })
        ));
    }

    #[test]
    fn test_reorder_and_dependencies_blocked() {
        let reorder = ChangeProposal {
            edits: vec![edit(STAGE, "x\n")],
            stage_order: Some(order().into_iter().rev().collect()),
            ..Default::default()
        };
        assert_eq!(
            guardrails().check(STAGE, &reorder, &snapshot(""), &order()),
            GuardrailResult::Blocked(GuardrailViolation::StageReordered)
        );

        let import = ChangeProposal {
            edits: vec![edit(STAGE, "import re\nx\n")],
            ..Default::default()
        };
        assert!(matches!(
            guardrails().check(STAGE, &import, &snapshot("x\n"), &order()),
            GuardrailResult::Blocked(GuardrailViolation::NewDependency { .. })
        ));
    }

    #[test]
    fn test_empty_change_blocked() {
        let unchanged = ChangeProposal {
            edits: vec![edit(STAGE, "same\n")],
            ..Default::default()
        };
        assert_eq!(
            guardrails().check(STAGE, &unchanged, &snapshot("same\n"), &order()),
            GuardrailResult::Blocked(GuardrailViolation::EmptyChange)
        );
        assert!(guardrails()
            .check(STAGE, &ChangeProposal::default(), &snapshot(""), &order())
            .is_blocked());
    }
}
