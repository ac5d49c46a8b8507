//! Capture commands: record live outputs, inspect them, apply retention.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Args, Subcommand};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use uuid::Uuid;

use super::text_arg;
use crate::cli::context::AppContext;
use crate::cli::id_resolver::resolve_capture_id;
use crate::cli::output::{output, table, CommandOutput};
use crate::domain::errors::DomainError;
use crate::domain::models::{Capture, CaptureFlagCounts, Config, QualityFlags};
use crate::domain::ports::CaptureRepository;
use crate::services::{CaptureIngest, CaptureSubmission, ContractRegistry};

#[derive(Args, Debug)]
pub struct CaptureArgs {
    #[command(subcommand)]
    pub command: CaptureCommands,
}

#[derive(Subcommand, Debug)]
pub enum CaptureCommands {
    /// Record one live output and wait for it to be stored
    Submit {
        #[arg(long)]
        input: Option<String>,
        #[arg(long, conflicts_with = "input")]
        input_file: Option<PathBuf>,
        #[arg(long)]
        output: Option<String>,
        #[arg(long, conflicts_with = "output")]
        output_file: Option<PathBuf>,
        /// Contract name or id the output should conform to
        #[arg(long)]
        contract: Option<String>,
        /// Produced by a scheduled job rather than a user message
        #[arg(long)]
        scheduled: bool,
    },
    /// Stream captures as JSON lines from a file, or stdin when omitted
    Ingest { path: Option<PathBuf> },
    /// List recent captures
    List {
        #[arg(long, short, default_value = "20")]
        limit: usize,
    },
    /// Show one capture
    Show {
        /// Capture id or unique prefix
        id: String,
    },
    /// Mark a capture as reviewed by a human
    Review { id: String },
    /// Quality flag counts over a recent window
    Flags {
        #[arg(long, default_value = "24")]
        hours: i64,
    },
    /// Delete unpromoted captures past their retention window
    Prune,
}

/// One line of an ingest stream.
#[derive(Debug, Deserialize)]
struct CaptureLine {
    input: String,
    output: String,
    #[serde(default)]
    contract: Option<String>,
    #[serde(default)]
    scheduled: bool,
    #[serde(default)]
    flags: Option<QualityFlags>,
}

#[derive(Debug, serde::Serialize)]
pub struct CaptureOutput {
    pub success: bool,
    pub message: String,
    pub capture: Capture,
}

impl CommandOutput for CaptureOutput {
    fn to_human(&self) -> String {
        let c = &self.capture;
        let mut lines = vec![
            self.message.clone(),
            format!("ID: {}", c.id),
            format!("Captured: {}", c.captured_at.format("%Y-%m-%d %H:%M:%S")),
            format!("Scheduled: {}", c.is_scheduled),
            format!("Reviewed: {}  Promoted: {}", c.reviewed, c.promoted),
        ];
        if let Some(contract) = c.contract_id {
            lines.push(format!("Contract: {contract}"));
        }
        if let Some(fixture) = c.linked_fixture_id {
            lines.push(format!("Fixture: {fixture}"));
        }
        let f = &c.quality_flags;
        if f.any() {
            lines.push(format!(
                "Flags: empty={} artifact_leak={} echo_leak={} truncated={}",
                f.empty, f.artifact_leak, f.echo_leak, f.truncated
            ));
        }
        lines.push(format!("\nInput:\n{}", c.input));
        lines.push(format!("\nOutput:\n{}", c.produced_output));
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct CaptureListOutput {
    pub captures: Vec<Capture>,
    pub total: usize,
}

impl CommandOutput for CaptureListOutput {
    fn to_human(&self) -> String {
        if self.captures.is_empty() {
            return "No captures found.".to_string();
        }
        format!("{} capture(s):\n{}", self.total, table::captures(&self.captures))
    }
}

#[derive(Debug, Default, serde::Serialize)]
pub struct IngestOutput {
    pub submitted: usize,
    pub rejected: Vec<String>,
    pub retried: usize,
    pub retry_stored: usize,
    pub dropped: u64,
}

impl CommandOutput for IngestOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Submitted {} capture(s); {} dropped",
            self.submitted, self.dropped
        )];
        if self.retried > 0 {
            lines.push(format!(
                "{} write(s) retried, {} stored on retry",
                self.retried, self.retry_stored
            ));
        }
        for reason in &self.rejected {
            lines.push(format!("  rejected {reason}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct FlagsOutput {
    pub hours: i64,
    pub counts: CaptureFlagCounts,
    pub failure_rate: f64,
}

impl CommandOutput for FlagsOutput {
    fn to_human(&self) -> String {
        let c = &self.counts;
        [
            format!("Captures in the last {}h: {}", self.hours, c.total),
            format!("Flagged: {} ({:.1}%)", c.flagged, self.failure_rate * 100.0),
            format!("  empty:         {}", c.empty),
            format!("  artifact_leak: {}", c.artifact_leak),
            format!("  echo_leak:     {}", c.echo_leak),
            format!("  truncated:     {}", c.truncated),
        ]
        .join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct PruneOutput {
    pub deleted: u64,
}

impl CommandOutput for PruneOutput {
    fn to_human(&self) -> String {
        format!("Pruned {} capture(s)", self.deleted)
    }
}

async fn resolve_contract(
    registry: &ContractRegistry,
    cache: &mut HashMap<String, Uuid>,
    reference: &str,
) -> Result<Uuid> {
    if let Some(id) = cache.get(reference) {
        return Ok(*id);
    }
    let id = registry.resolve(reference).await?.id;
    cache.insert(reference.to_string(), id);
    Ok(id)
}

/// Submit every line without waiting, then flush so nothing is left queued.
async fn ingest_lines<R: AsyncBufRead + Unpin>(
    reader: R,
    ingest: &CaptureIngest,
    registry: &ContractRegistry,
) -> Result<IngestOutput> {
    let drainer = ingest.spawn_drainer();
    let mut contracts = HashMap::new();
    let mut summary = IngestOutput::default();
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: CaptureLine = match serde_json::from_str(&line) {
            Ok(parsed) => parsed,
            Err(e) => {
                summary.rejected.push(format!("line {line_no}: {e}"));
                continue;
            }
        };
        let contract_id = match &parsed.contract {
            Some(reference) => match resolve_contract(registry, &mut contracts, reference).await {
                Ok(id) => Some(id),
                Err(e) => {
                    summary.rejected.push(format!("line {line_no}: {e}"));
                    continue;
                }
            },
            None => None,
        };
        ingest.submit(CaptureSubmission {
            input: parsed.input,
            output: parsed.output,
            flags: parsed.flags,
            contract_id,
            is_scheduled: parsed.scheduled,
        });
        summary.submitted += 1;
    }

    let flushed = ingest.flush().await;
    drainer.shutdown().await;
    summary.retried = flushed.attempted;
    summary.retry_stored = flushed.stored;
    summary.dropped = ingest.dropped_count();
    Ok(summary)
}

pub async fn execute(args: CaptureArgs, config: Config, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open(config).await?;

    match args.command {
        CaptureCommands::Submit {
            input,
            input_file,
            output: produced,
            output_file,
            contract,
            scheduled,
        } => {
            let contract_id = match contract {
                Some(reference) => Some(ctx.contract_registry().resolve(&reference).await?.id),
                None => None,
            };
            let submission = CaptureSubmission {
                input: text_arg(input, input_file, "input").await?,
                output: text_arg(produced, output_file, "output").await?,
                flags: None,
                contract_id,
                is_scheduled: scheduled,
            };
            let capture = ctx.capture_ingest().submit_and_wait(submission).await?;
            output(
                &CaptureOutput {
                    success: true,
                    message: "Capture stored".to_string(),
                    capture,
                },
                json_mode,
            );
        }
        CaptureCommands::Ingest { path } => {
            let ingest = ctx.capture_ingest();
            let registry = ctx.contract_registry();
            let summary = match path {
                Some(path) => {
                    let file = tokio::fs::File::open(&path)
                        .await
                        .with_context(|| format!("Failed to open {}", path.display()))?;
                    ingest_lines(BufReader::new(file), &ingest, &registry).await?
                }
                None => ingest_lines(BufReader::new(tokio::io::stdin()), &ingest, &registry).await?,
            };
            output(&summary, json_mode);
        }
        CaptureCommands::List { limit } => {
            let captures = ctx.captures.list_recent(limit).await?;
            let total = captures.len();
            output(&CaptureListOutput { captures, total }, json_mode);
        }
        CaptureCommands::Show { id } => {
            let id = resolve_capture_id(&ctx.pool, &id).await?;
            let capture = ctx
                .captures
                .get(id)
                .await?
                .ok_or(DomainError::CaptureNotFound(id))?;
            output(
                &CaptureOutput {
                    success: true,
                    message: "Capture".to_string(),
                    capture,
                },
                json_mode,
            );
        }
        CaptureCommands::Review { id } => {
            let id = resolve_capture_id(&ctx.pool, &id).await?;
            ctx.captures.mark_reviewed(id).await?;
            let capture = ctx
                .captures
                .get(id)
                .await?
                .ok_or(DomainError::CaptureNotFound(id))?;
            output(
                &CaptureOutput {
                    success: true,
                    message: format!("Capture {id} marked reviewed"),
                    capture,
                },
                json_mode,
            );
        }
        CaptureCommands::Flags { hours } => {
            let now = Utc::now();
            let counts = ctx
                .captures
                .flag_counts_between(now - Duration::hours(hours), now)
                .await?;
            output(
                &FlagsOutput {
                    hours,
                    failure_rate: counts.failure_rate(),
                    counts,
                },
                json_mode,
            );
        }
        CaptureCommands::Prune => {
            let deleted = ctx.capture_ingest().prune(Utc::now()).await?;
            output(&PruneOutput { deleted }, json_mode);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::OutputContract;

    #[tokio::test]
    async fn test_ingest_stores_lines_and_rejects_bad_ones() {
        let pool = create_migrated_test_pool().await.unwrap();
        let ctx = AppContext::from_pool(Config::default(), pool);
        let registry = ctx.contract_registry();
        registry.create(OutputContract::new("digest")).await.unwrap();

        let stream = concat!(
            "{\"input\": \"hi\", \"output\": \"hello\"}\n",
            "\n",
            "not json\n",
            "{\"input\": \"\", \"output\": \"no news\", \"contract\": \"digest\", ",
            "\"scheduled\": true}\n",
            "{\"input\": \"x\", \"output\": \"y\", \"contract\": \"missing\"}\n",
        );
        let summary = ingest_lines(stream.as_bytes(), &ctx.capture_ingest(), &registry)
            .await
            .unwrap();

        assert_eq!(summary.submitted, 2);
        assert_eq!(summary.rejected.len(), 2);
        assert_eq!(summary.dropped, 0);

        let stored = ctx.captures.list_recent(10).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().any(|c| c.upstream_data_empty()));
    }
}
