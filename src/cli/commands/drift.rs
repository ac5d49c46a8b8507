//! Drift commands.

use anyhow::Result;
use chrono::Duration;
use clap::{Args, Subcommand};

use crate::cli::context::AppContext;
use crate::cli::output::{output, short_id, truncate, CommandOutput};
use crate::domain::models::{Config, DriftRecord};
use crate::domain::ports::DriftRepository;
use crate::services::SweepSummary;

#[derive(Args, Debug)]
pub struct DriftArgs {
    #[command(subcommand)]
    pub command: DriftCommands,
}

#[derive(Subcommand, Debug)]
pub enum DriftCommands {
    /// Evaluate unevaluated captures that declare a contract
    Sweep {
        /// Look-back window; defaults to drift.window_hours
        #[arg(long)]
        hours: Option<i64>,
    },
    /// Recent drift records for one contract
    List {
        /// Contract name or id
        contract: String,
        #[arg(long, short, default_value = "20")]
        limit: usize,
        /// Only records that drifted
        #[arg(long)]
        drifted: bool,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct SweepOutput {
    #[serde(flatten)]
    pub summary: SweepSummary,
}

impl CommandOutput for SweepOutput {
    fn to_human(&self) -> String {
        let s = &self.summary;
        let mut lines = vec![format!(
            "Considered {} capture(s): {} evaluated, {} drifted, {} already evaluated, {} skipped",
            s.considered, s.evaluated, s.drifted, s.already_evaluated, s.skipped
        )];
        for (action, count) in &s.by_action {
            lines.push(format!("  {action}: {count}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct DriftListOutput {
    pub contract: String,
    pub records: Vec<DriftRecord>,
}

impl CommandOutput for DriftListOutput {
    fn to_human(&self) -> String {
        if self.records.is_empty() {
            return format!("No drift records for '{}'.", self.contract);
        }
        let mut lines = vec![format!("Drift records for '{}':", self.contract)];
        for r in &self.records {
            lines.push(format!(
                "{} {} capture {} score {:.3} {}{}",
                short_id(&r.id),
                r.created_at.format("%Y-%m-%d %H:%M"),
                short_id(&r.capture_id),
                r.score.overall,
                if r.drifted { "DRIFTED " } else { "" },
                r.recommended_action.as_str()
            ));
            for reason in &r.explanation {
                lines.push(format!("    - {}", truncate(reason, 90)));
            }
        }
        lines.join("\n")
    }
}

pub async fn execute(args: DriftArgs, config: Config, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open(config).await?;

    match args.command {
        DriftCommands::Sweep { hours } => {
            let detector = ctx.drift_detector()?;
            let summary = match hours {
                Some(hours) => detector.sweep(Duration::hours(hours)).await?,
                None => detector.sweep_default().await?,
            };
            output(&SweepOutput { summary }, json_mode);
        }
        DriftCommands::List {
            contract,
            limit,
            drifted,
        } => {
            let contract = ctx.contract_registry().resolve(&contract).await?;
            let mut records = ctx.drift.list_for_contract(contract.id, limit).await?;
            if drifted {
                records.retain(|r| r.drifted);
            }
            output(
                &DriftListOutput {
                    contract: contract.name,
                    records,
                },
                json_mode,
            );
        }
    }
    Ok(())
}
