//! Regression commands: replay the corpus and inspect past runs.

use anyhow::Result;
use chrono::{Duration, Utc};
use clap::{Args, Subcommand};

use crate::cli::context::AppContext;
use crate::cli::output::progress::create_spinner;
use crate::cli::output::{output, short_id, table, CommandOutput};
use crate::domain::models::{Config, FixtureOutcome, RegressionReport, RegressionRun};
use crate::domain::ports::RegressionRunRepository;

#[derive(Args, Debug)]
pub struct RegressionArgs {
    #[command(subcommand)]
    pub command: RegressionCommands,
}

#[derive(Subcommand, Debug)]
pub enum RegressionCommands {
    /// Run every active fixture through the configured transform
    Run {
        /// Exit non-zero when any fixture regressed
        #[arg(long)]
        fail_on_regression: bool,
    },
    /// Show the most recent run
    Latest,
    /// Runs over recent days
    History {
        #[arg(long, default_value = "7")]
        days: i64,
    },
}

fn render_report(report: &RegressionReport) -> String {
    let mut lines = vec![
        format!(
            "Pass rate {:.1}% ({}/{}), mean score {:.3}",
            report.pass_rate * 100.0,
            report.passed,
            report.total,
            report.overall_score
        ),
        format!(
            "Regressions: {}  Improvements: {}  Transform failures: {}",
            report.regressions, report.improvements, report.transform_failures
        ),
    ];
    if !report.per_category.is_empty() {
        lines.push(String::new());
        lines.push(table::categories(&report.per_category));
    }
    if !report.top_failing.is_empty() {
        lines.push("\nLowest-scoring failures:".to_string());
        lines.push(table::failing(&report.top_failing));
    }
    lines.join("\n")
}

#[derive(Debug, serde::Serialize)]
pub struct RunOutput {
    pub report: RegressionReport,
    pub outcomes: Vec<FixtureOutcome>,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Regression run {}", self.report.run_id),
            render_report(&self.report),
        ];
        let regressed: Vec<&str> = self
            .outcomes
            .iter()
            .filter(|o| o.regressed)
            .map(|o| o.fixture_key.as_str())
            .collect();
        if !regressed.is_empty() {
            lines.push(format!("\nREGRESSED: {}", regressed.join(", ")));
        }
        for o in self.outcomes.iter().filter(|o| o.transform_error.is_some()) {
            lines.push(format!(
                "  {} transform error: {}",
                o.fixture_key,
                o.transform_error.as_deref().unwrap_or_default()
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct LatestOutput {
    pub run: Option<RegressionRun>,
}

impl CommandOutput for LatestOutput {
    fn to_human(&self) -> String {
        match &self.run {
            Some(run) => format!(
                "Run {} finished {}\n{}",
                run.id,
                run.finished_at.format("%Y-%m-%d %H:%M:%S"),
                render_report(&run.report)
            ),
            None => "No regression run recorded yet.".to_string(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct HistoryOutput {
    pub days: i64,
    pub runs: Vec<RegressionRun>,
}

impl CommandOutput for HistoryOutput {
    fn to_human(&self) -> String {
        if self.runs.is_empty() {
            return format!("No regression runs in the last {} day(s).", self.days);
        }
        let mut lines = vec![format!(
            "{:<10} {:<17} {:>8} {:>6} {:>5} {:>5}",
            "ID", "FINISHED", "PASS", "SCORE", "REG", "IMP"
        )];
        lines.push("-".repeat(56));
        for run in &self.runs {
            let r = &run.report;
            lines.push(format!(
                "{:<10} {:<17} {:>7.1}% {:>6.3} {:>5} {:>5}",
                short_id(&run.id),
                run.finished_at.format("%Y-%m-%d %H:%M"),
                r.pass_rate * 100.0,
                r.overall_score,
                r.regressions,
                r.improvements
            ));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: RegressionArgs, config: Config, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open(config).await?;

    match args.command {
        RegressionCommands::Run { fail_on_regression } => {
            let runner = ctx.regression_runner()?;
            let transform = ctx.transform()?;
            let lease = ctx.writer_lease();

            let spinner = create_spinner("Replaying fixtures...", json_mode);
            let result = runner.run_now(&transform, &lease).await;
            spinner.finish_and_clear();
            let evaluation = result?;

            let regressions = evaluation.report.regressions;
            output(
                &RunOutput {
                    report: evaluation.report,
                    outcomes: evaluation.outcomes,
                },
                json_mode,
            );
            if fail_on_regression && regressions > 0 {
                anyhow::bail!("{regressions} fixture(s) regressed");
            }
        }
        RegressionCommands::Latest => {
            let run = ctx.runs.latest().await?;
            output(&LatestOutput { run }, json_mode);
        }
        RegressionCommands::History { days } => {
            let mut runs = ctx.runs.list_since(Utc::now() - Duration::days(days)).await?;
            runs.reverse();
            output(&HistoryOutput { days, runs }, json_mode);
        }
    }
    Ok(())
}
