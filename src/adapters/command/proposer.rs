use async_trait::async_trait;
use serde::Serialize;

use super::{run_with_stdin, CommandSpec};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ChangeProposal, CyclePlan, StageSnapshot};
use crate::domain::ports::ChangeProposer;

/// JSON document written to the proposer's stdin.
#[derive(Debug, Serialize)]
pub struct ProposerRequest<'a> {
    pub plan: &'a CyclePlan,
    pub current: &'a StageSnapshot,
}

/// Change proposer backed by an external command.
///
/// The command receives a [`ProposerRequest`] and must print a
/// [`ChangeProposal`] as JSON.
#[derive(Debug, Clone)]
pub struct CommandProposer {
    spec: CommandSpec,
}

impl CommandProposer {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl ChangeProposer for CommandProposer {
    async fn propose(
        &self,
        plan: &CyclePlan,
        current: &StageSnapshot,
    ) -> DomainResult<ChangeProposal> {
        let request = serde_json::to_string(&ProposerRequest { plan, current })?;
        let stdout = run_with_stdin(&self.spec, &request)
            .await
            .map_err(|e| DomainError::ProposalFailed(e.to_string()))?;

        serde_json::from_str(stdout.trim()).map_err(|e| {
            DomainError::ProposalFailed(format!("proposer output is not a change proposal: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn plan() -> CyclePlan {
        CyclePlan {
            cycle_id: Uuid::new_v4(),
            target_stage: "echo_removal".into(),
            problem_statement: "echo leaks".into(),
            proposed_approach: "strip the repeated tail".into(),
            affected_fixture_ids: vec![],
            estimated_diff_lines: 5,
        }
    }

    fn snapshot() -> StageSnapshot {
        StageSnapshot {
            stage: "echo_removal".into(),
            content: "old".into(),
        }
    }

    fn proposer(script: &str) -> CommandProposer {
        CommandProposer::new(CommandSpec::new(
            "sh",
            vec!["-c".into(), script.into()],
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn test_parses_proposal_json() {
        let proposer = proposer(
            r#"cat > /dev/null; echo '{"edits":[{"stage":"echo_removal","new_content":"new"}]}'"#,
        );
        let proposal = proposer.propose(&plan(), &snapshot()).await.unwrap();
        assert_eq!(proposal.touched_stages(), vec!["echo_removal".to_string()]);
        assert!(proposal.stage_order.is_none());
    }

    #[tokio::test]
    async fn test_request_carries_plan_and_snapshot() {
        let proposer = proposer(
            r#"input=$(cat)
               case "$input" in
                 *'"target_stage":"echo_removal"'*'"content":"old"'*)
                   echo '{"edits":[],"rationale":"seen"}' ;;
                 *) exit 1 ;;
               esac"#,
        );
        let proposal = proposer.propose(&plan(), &snapshot()).await.unwrap();
        assert_eq!(proposal.rationale.as_deref(), Some("seen"));
    }

    #[tokio::test]
    async fn test_garbage_output_is_proposal_failure() {
        let proposer = proposer("cat > /dev/null; echo not-json");
        assert!(matches!(
            proposer.propose(&plan(), &snapshot()).await,
            Err(DomainError::ProposalFailed(_))
        ));
    }
}
