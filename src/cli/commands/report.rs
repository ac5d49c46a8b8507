//! Quality report command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::cli::context::AppContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::domain::ports::NotificationEvent;
use crate::services::quality_report::render_markdown;
use crate::services::QualityReport;

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Also write the markdown report to this file
    #[arg(long, short)]
    pub out: Option<PathBuf>,

    /// Send the headline and actions to the configured notifier
    #[arg(long)]
    pub notify: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct ReportOutput {
    #[serde(flatten)]
    pub report: QualityReport,
}

impl CommandOutput for ReportOutput {
    fn to_human(&self) -> String {
        render_markdown(&self.report)
    }
}

pub async fn execute(args: ReportArgs, config: Config, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open(config).await?;
    let report = ctx.report_builder().build().await;

    if let Some(path) = &args.out {
        tokio::fs::write(path, render_markdown(&report))
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if args.notify {
        let event = NotificationEvent::QualityDigest {
            headline: report.headline(),
            actions: report.actions.iter().map(|a| a.message.clone()).collect(),
        };
        ctx.notifier()?
            .notify(&event)
            .await
            .context("Failed to send quality digest")?;
    }

    output(&ReportOutput { report }, json_mode);
    Ok(())
}
