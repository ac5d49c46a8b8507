//! Improvement cycle commands.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cli::context::AppContext;
use crate::cli::id_resolver::resolve_cycle_id;
use crate::cli::output::progress::create_spinner;
use crate::cli::output::{output, table, CommandOutput};
use crate::domain::errors::DomainError;
use crate::domain::models::{Config, CycleOutcome, HumanCheckpoint, ImprovementCycle};
use crate::domain::ports::CycleRepository;
use crate::services::{CheckpointStatus, CycleRunResult, SkipReason};

#[derive(Args, Debug)]
pub struct CycleArgs {
    #[command(subcommand)]
    pub command: CycleCommands,
}

#[derive(Subcommand, Debug)]
pub enum CycleCommands {
    /// Run one review, plan, implement, validate cycle
    Run,
    /// Commits since the last human checkpoint
    Status,
    /// Acknowledge a human checkpoint so cycles may continue
    Ack {
        /// Who reviewed the committed cycles
        #[arg(long)]
        by: String,
        #[arg(long, short)]
        note: Option<String>,
    },
    /// Recent finished cycles
    History {
        #[arg(long, short, default_value = "20")]
        limit: usize,
    },
    /// Show one cycle's audit record
    Show { id: String },
}

fn render_cycle(c: &ImprovementCycle) -> String {
    let mut lines = vec![
        format!("Cycle {} ({})", c.id, c.outcome.as_str()),
        format!("Stage: {}", c.target_stage),
        format!("Problem: {}", c.problem_statement),
        format!("Approach: {}", c.plan.proposed_approach),
        format!("Diff: {} line(s)", c.diff_size),
    ];
    match c.score_after {
        Some(after) => lines.push(format!(
            "Score: {:.4} -> {:.4} ({:+.4})",
            c.score_before,
            after,
            after - c.score_before
        )),
        None => lines.push(format!("Score: {:.4} (not validated)", c.score_before)),
    }
    lines.push(format!(
        "Regressions: {}  Improvements: {}",
        c.regressions_count, c.improvements_count
    ));
    if let Some(reason) = &c.rollback_reason {
        lines.push(format!("Rollback: {}", reason.summary()));
    }
    if !c.consumed_feedback_ids.is_empty() {
        lines.push(format!("Feedback consumed: {}", c.consumed_feedback_ids.len()));
    }
    if c.checkpoint_required {
        lines.push("Human checkpoint now required before the next cycle.".to_string());
    }
    lines.join("\n")
}

#[derive(Debug, serde::Serialize)]
pub struct RunOutput {
    pub result: CycleRunResult,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        match &self.result {
            CycleRunResult::Skipped {
                reason: SkipReason::NoSignal,
            } => "Nothing to improve: no failing fixture, feedback or drift points at a stage."
                .to_string(),
            CycleRunResult::Finished { cycle } => render_cycle(cycle),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct StatusOutput {
    #[serde(flatten)]
    pub status: CheckpointStatus,
    pub required: bool,
}

impl CommandOutput for StatusOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "{}/{} commit(s) since the last checkpoint",
            self.status.committed_since, self.status.interval
        )];
        match &self.status.last_checkpoint {
            Some(cp) => lines.push(format!(
                "Last checkpoint: {} by {}",
                cp.acknowledged_at.format("%Y-%m-%d %H:%M"),
                cp.acknowledged_by
            )),
            None => lines.push("No checkpoint acknowledged yet".to_string()),
        }
        if self.required {
            lines.push("Checkpoint required: run 'gatekeep cycle ack --by <name>'".to_string());
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct AckOutput {
    pub checkpoint: HumanCheckpoint,
}

impl CommandOutput for AckOutput {
    fn to_human(&self) -> String {
        format!(
            "Checkpoint acknowledged by {}; cycles may continue",
            self.checkpoint.acknowledged_by
        )
    }
}

#[derive(Debug, serde::Serialize)]
pub struct HistoryOutput {
    pub cycles: Vec<ImprovementCycle>,
    pub committed: usize,
    pub rolled_back: usize,
}

impl CommandOutput for HistoryOutput {
    fn to_human(&self) -> String {
        if self.cycles.is_empty() {
            return "No cycles recorded.".to_string();
        }
        format!(
            "{} committed, {} rolled back\n{}",
            self.committed,
            self.rolled_back,
            table::cycles(&self.cycles)
        )
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ShowOutput {
    pub cycle: ImprovementCycle,
}

impl CommandOutput for ShowOutput {
    fn to_human(&self) -> String {
        render_cycle(&self.cycle)
    }
}

pub async fn execute(args: CycleArgs, config: Config, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open(config).await?;

    match args.command {
        CycleCommands::Run => {
            let service = ctx.cycle_service()?;
            let spinner = create_spinner("Running improvement cycle...", json_mode);
            let result = service.run_cycle().await;
            spinner.finish_and_clear();
            output(&RunOutput { result: result? }, json_mode);
        }
        CycleCommands::Status => {
            let status = ctx.checkpoints().status().await?;
            output(
                &StatusOutput {
                    required: status.required(),
                    status,
                },
                json_mode,
            );
        }
        CycleCommands::Ack { by, note } => {
            let checkpoint = ctx.checkpoints().acknowledge(&by, note).await?;
            output(&AckOutput { checkpoint }, json_mode);
        }
        CycleCommands::History { limit } => {
            let cycles = ctx.checkpoints().history(limit).await?;
            let committed = cycles
                .iter()
                .filter(|c| c.outcome == CycleOutcome::Committed)
                .count();
            output(
                &HistoryOutput {
                    rolled_back: cycles.len() - committed,
                    committed,
                    cycles,
                },
                json_mode,
            );
        }
        CycleCommands::Show { id } => {
            let id = resolve_cycle_id(&ctx.pool, &id).await?;
            let cycle = ctx
                .cycles
                .get(id)
                .await?
                .ok_or(DomainError::CycleNotFound(id))?;
            output(&ShowOutput { cycle }, json_mode);
        }
    }
    Ok(())
}
