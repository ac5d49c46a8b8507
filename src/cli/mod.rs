//! Command-line interface.

pub mod commands;
pub mod context;
pub mod id_resolver;
pub mod output;

use clap::{Parser, Subcommand};

use commands::{
    capture::CaptureArgs, contract::ContractArgs, cycle::CycleArgs, drift::DriftArgs,
    feedback::FeedbackArgs, fixture::FixtureArgs, init::InitArgs, regression::RegressionArgs,
    report::ReportArgs,
};

#[derive(Parser, Debug)]
#[command(name = "gatekeep")]
#[command(about = "Regression-gated improvement loop for text transformation pipelines")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the .gatekeep directory, configuration, database and stage files
    Init(InitArgs),
    /// Manage the fixture corpus
    Fixture(FixtureArgs),
    /// Ingest and inspect live output captures
    Capture(CaptureArgs),
    /// Replay the corpus through the transform
    Regression(RegressionArgs),
    /// Manage output contracts
    Contract(ContractArgs),
    /// Evaluate captures against their contracts
    Drift(DriftArgs),
    /// Record and triage human feedback
    Feedback(FeedbackArgs),
    /// Run improvement cycles and acknowledge checkpoints
    Cycle(CycleArgs),
    /// Build the quality report
    Report(ReportArgs),
}

/// Print a failed command's error and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "caused_by": chain,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1)
}
