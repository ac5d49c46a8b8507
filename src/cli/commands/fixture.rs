//! Fixture corpus commands.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

use super::text_arg;
use crate::cli::context::AppContext;
use crate::cli::id_resolver::resolve_capture_id;
use crate::cli::output::{output, table, CommandOutput};
use crate::domain::models::{Config, Difficulty, Fixture};
use crate::services::{FixtureSpec, ImportSummary, Promotion};

#[derive(Args, Debug)]
pub struct FixtureArgs {
    #[command(subcommand)]
    pub command: FixtureCommands,
}

#[derive(Subcommand, Debug)]
pub enum FixtureCommands {
    /// Add a curated fixture
    Add {
        /// Unique key, e.g. conv-001
        key: String,
        #[arg(long, short)]
        category: String,
        /// Raw input text
        #[arg(long)]
        input: Option<String>,
        #[arg(long, conflicts_with = "input")]
        input_file: Option<PathBuf>,
        /// Expected transform output
        #[arg(long)]
        expected: Option<String>,
        #[arg(long, conflicts_with = "expected")]
        expected_file: Option<PathBuf>,
        /// easy, medium or hard
        #[arg(long, short, default_value = "medium")]
        difficulty: String,
    },
    /// List fixtures
    List {
        /// Include demoted fixtures
        #[arg(long, short)]
        all: bool,
    },
    /// Show one fixture
    Show { key: String },
    /// Turn a capture into a fixture
    Promote {
        /// Capture id or unique prefix
        capture: String,
        #[arg(long, short)]
        key: String,
        #[arg(long, short)]
        category: String,
        #[arg(long, short, default_value = "medium")]
        difficulty: String,
        /// Corrected expected output; defaults to what the capture produced
        #[arg(long)]
        expected: Option<String>,
        #[arg(long, conflicts_with = "expected")]
        expected_file: Option<PathBuf>,
    },
    /// Exclude a fixture from regression runs
    Demote { key: String },
    /// Include a demoted fixture again
    Reactivate { key: String },
    /// Import fixtures from a JSON or YAML file
    Import { path: PathBuf },
}

#[derive(Debug, serde::Serialize)]
pub struct FixtureListOutput {
    pub fixtures: Vec<Fixture>,
    pub total: usize,
}

impl CommandOutput for FixtureListOutput {
    fn to_human(&self) -> String {
        if self.fixtures.is_empty() {
            return "No fixtures found.".to_string();
        }
        format!(
            "Found {} fixture(s):\n{}",
            self.total,
            table::fixtures(&self.fixtures)
        )
    }
}

#[derive(Debug, serde::Serialize)]
pub struct FixtureDetailOutput {
    pub fixture: Fixture,
}

impl CommandOutput for FixtureDetailOutput {
    fn to_human(&self) -> String {
        let f = &self.fixture;
        let last = match f.last_pass {
            Some(true) => "pass",
            Some(false) => "fail",
            None => "never run",
        };
        let mut lines = vec![
            format!("Fixture: {}", f.key),
            format!("ID: {}", f.id),
            format!("Category: {}", f.category),
            format!("Difficulty: {}", f.difficulty.as_str()),
            format!("Provenance: {}", f.provenance.as_str()),
            format!("Active: {}", f.active),
            format!("Last result: {last} ({} failure(s))", f.fail_count),
        ];
        if let Some(at) = f.last_regressed_at {
            lines.push(format!("Last regressed: {}", at.format("%Y-%m-%d %H:%M:%S")));
        }
        lines.push(format!("\nInput:\n{}", f.input));
        lines.push(format!("\nExpected:\n{}", f.expected_output));
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct FixtureActionOutput {
    pub success: bool,
    pub message: String,
    pub fixture: Fixture,
}

impl CommandOutput for FixtureActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ImportOutput {
    pub source: String,
    #[serde(flatten)]
    pub summary: ImportSummary,
}

impl CommandOutput for ImportOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Imported {} fixture(s) from {}",
            self.summary.imported, self.source
        )];
        if !self.summary.skipped.is_empty() {
            lines.push(format!(
                "Skipped existing keys: {}",
                self.summary.skipped.join(", ")
            ));
        }
        for invalid in &self.summary.invalid {
            lines.push(format!("  invalid: {invalid}"));
        }
        lines.join("\n")
    }
}

fn parse_difficulty(value: &str) -> Result<Difficulty> {
    Difficulty::from_str(value).ok_or_else(|| anyhow!("Invalid difficulty: {value}"))
}

pub async fn execute(args: FixtureArgs, config: Config, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open(config).await?;
    let service = ctx.fixture_service();

    match args.command {
        FixtureCommands::Add {
            key,
            category,
            input,
            input_file,
            expected,
            expected_file,
            difficulty,
        } => {
            let spec = FixtureSpec {
                key,
                input: text_arg(input, input_file, "input").await?,
                expected_output: text_arg(expected, expected_file, "expected output").await?,
                category,
                difficulty: parse_difficulty(&difficulty)?,
            };
            let fixture = service.add(spec).await?;
            output(
                &FixtureActionOutput {
                    success: true,
                    message: format!("Fixture '{}' added", fixture.key),
                    fixture,
                },
                json_mode,
            );
        }
        FixtureCommands::List { all } => {
            let fixtures = service.list(!all).await?;
            let total = fixtures.len();
            output(&FixtureListOutput { fixtures, total }, json_mode);
        }
        FixtureCommands::Show { key } => {
            let fixture = service.get_by_key(&key).await?;
            output(&FixtureDetailOutput { fixture }, json_mode);
        }
        FixtureCommands::Promote {
            capture,
            key,
            category,
            difficulty,
            expected,
            expected_file,
        } => {
            let capture_id = resolve_capture_id(&ctx.pool, &capture).await?;
            let expected_output = match (expected, expected_file) {
                (None, None) => None,
                (inline, file) => Some(text_arg(inline, file, "expected output").await?),
            };
            let promotion = Promotion {
                key,
                category,
                difficulty: parse_difficulty(&difficulty)?,
                expected_output,
            };
            let fixture = service.promote_capture(capture_id, promotion).await?;
            output(
                &FixtureActionOutput {
                    success: true,
                    message: format!("Capture {capture_id} promoted to fixture '{}'", fixture.key),
                    fixture,
                },
                json_mode,
            );
        }
        FixtureCommands::Demote { key } => {
            let fixture = service.demote(&key).await?;
            output(
                &FixtureActionOutput {
                    success: true,
                    message: format!("Fixture '{key}' demoted"),
                    fixture,
                },
                json_mode,
            );
        }
        FixtureCommands::Reactivate { key } => {
            let fixture = service.reactivate(&key).await?;
            output(
                &FixtureActionOutput {
                    success: true,
                    message: format!("Fixture '{key}' reactivated"),
                    fixture,
                },
                json_mode,
            );
        }
        FixtureCommands::Import { path } => {
            let summary = service.import_file(&path).await?;
            output(
                &ImportOutput {
                    source: path.display().to_string(),
                    summary,
                },
                json_mode,
            );
        }
    }
    Ok(())
}
