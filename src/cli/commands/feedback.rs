//! Feedback commands.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};

use crate::cli::context::AppContext;
use crate::cli::id_resolver::{resolve_capture_id, resolve_feedback_id};
use crate::cli::output::{output, table, CommandOutput};
use crate::domain::models::{
    Config, FeedbackCounts, FeedbackItem, FeedbackPriority, FeedbackStatus, InputMethod,
};
use crate::domain::ports::FeedbackRepository;
use crate::services::NewFeedback;

#[derive(Args, Debug)]
pub struct FeedbackArgs {
    #[command(subcommand)]
    pub command: FeedbackCommands,
}

#[derive(Subcommand, Debug)]
pub enum FeedbackCommands {
    /// Record feedback; the category is inferred from the text when omitted
    Add {
        description: Option<String>,
        /// Stage name or "general"
        #[arg(long, short)]
        category: Option<String>,
        /// normal or high
        #[arg(long, short, default_value = "normal")]
        priority: String,
        /// reaction, command, free_text or api
        #[arg(long, short, default_value = "command")]
        method: String,
        /// Capture id or prefix the feedback is about
        #[arg(long)]
        capture: Option<String>,
    },
    /// List feedback, pending by default
    List {
        /// pending, processing, resolved, wont_fix or duplicate
        #[arg(long, short, default_value = "pending")]
        status: String,
    },
    /// Show one item
    Show { id: String },
    /// Status counts
    Counts,
    /// Mark an item resolved
    Resolve {
        id: String,
        #[arg(long, short)]
        note: Option<String>,
    },
    /// Mark an item as something that will not be fixed
    WontFix {
        id: String,
        #[arg(long, short)]
        note: Option<String>,
    },
    /// Mark an item as a duplicate
    Duplicate {
        id: String,
        #[arg(long, short)]
        note: Option<String>,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct FeedbackOutput {
    pub message: String,
    pub item: FeedbackItem,
}

impl CommandOutput for FeedbackOutput {
    fn to_human(&self) -> String {
        let i = &self.item;
        let mut lines = vec![
            self.message.clone(),
            format!("ID: {}", i.id),
            format!("Category: {}", i.category),
            format!("Priority: {}", i.priority.as_str()),
            format!("Status: {}", i.status.as_str()),
            format!("Via: {}", i.input_method.as_str()),
        ];
        if let Some(capture) = i.linked_capture_id {
            lines.push(format!("Capture: {capture}"));
        }
        if let Some(cycle) = i.consumed_by_cycle_id {
            lines.push(format!("Cycle: {cycle}"));
        }
        if let Some(description) = &i.description {
            lines.push(format!("\n{description}"));
        }
        if let Some(note) = &i.resolution_note {
            lines.push(format!("\nNote: {note}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct FeedbackListOutput {
    pub status: String,
    pub items: Vec<FeedbackItem>,
}

impl CommandOutput for FeedbackListOutput {
    fn to_human(&self) -> String {
        if self.items.is_empty() {
            return format!("No {} feedback.", self.status);
        }
        format!(
            "{} {} item(s):\n{}",
            self.items.len(),
            self.status,
            table::feedback(&self.items)
        )
    }
}

#[derive(Debug, serde::Serialize)]
pub struct CountsOutput {
    #[serde(flatten)]
    pub counts: FeedbackCounts,
}

impl CommandOutput for CountsOutput {
    fn to_human(&self) -> String {
        let c = &self.counts;
        [
            format!("pending:    {} ({} high)", c.pending, c.high_priority_pending),
            format!("processing: {}", c.processing),
            format!("resolved:   {}", c.resolved),
            format!("wont_fix:   {}", c.wont_fix),
            format!("duplicate:  {}", c.duplicate),
        ]
        .join("\n")
    }
}

pub async fn execute(args: FeedbackArgs, config: Config, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open(config).await?;
    let intake = ctx.feedback_intake();

    match args.command {
        FeedbackCommands::Add {
            description,
            category,
            priority,
            method,
            capture,
        } => {
            let priority = FeedbackPriority::from_str(&priority)
                .ok_or_else(|| anyhow!("Invalid priority: {priority}"))?;
            let input_method = InputMethod::from_str(&method)
                .ok_or_else(|| anyhow!("Invalid input method: {method}"))?;
            let linked_capture_id = match capture {
                Some(prefix) => Some(resolve_capture_id(&ctx.pool, &prefix).await?),
                None => None,
            };
            let item = intake
                .record(NewFeedback {
                    input_method: Some(input_method),
                    category,
                    description,
                    linked_capture_id,
                    priority,
                })
                .await?;
            output(
                &FeedbackOutput {
                    message: format!("Feedback recorded under '{}'", item.category),
                    item,
                },
                json_mode,
            );
        }
        FeedbackCommands::List { status } => {
            let parsed = FeedbackStatus::from_str(&status)
                .ok_or_else(|| anyhow!("Invalid status: {status}"))?;
            let items = if parsed == FeedbackStatus::Pending {
                intake.pending().await?
            } else {
                ctx.feedback.list_by_status(parsed).await?
            };
            output(&FeedbackListOutput { status, items }, json_mode);
        }
        FeedbackCommands::Show { id } => {
            let item = intake.get(resolve_feedback_id(&ctx.pool, &id).await?).await?;
            output(
                &FeedbackOutput {
                    message: "Feedback".to_string(),
                    item,
                },
                json_mode,
            );
        }
        FeedbackCommands::Counts => {
            let counts = intake.counts().await?;
            output(&CountsOutput { counts }, json_mode);
        }
        FeedbackCommands::Resolve { id, note } => {
            let id = resolve_feedback_id(&ctx.pool, &id).await?;
            let item = intake.resolve(id, note.as_deref()).await?;
            output(
                &FeedbackOutput {
                    message: "Feedback resolved".to_string(),
                    item,
                },
                json_mode,
            );
        }
        FeedbackCommands::WontFix { id, note } => {
            let id = resolve_feedback_id(&ctx.pool, &id).await?;
            let item = intake.wont_fix(id, note.as_deref()).await?;
            output(
                &FeedbackOutput {
                    message: "Feedback closed as won't fix".to_string(),
                    item,
                },
                json_mode,
            );
        }
        FeedbackCommands::Duplicate { id, note } => {
            let id = resolve_feedback_id(&ctx.pool, &id).await?;
            let item = intake.mark_duplicate(id, note.as_deref()).await?;
            output(
                &FeedbackOutput {
                    message: "Feedback marked duplicate".to_string(),
                    item,
                },
                json_mode,
            );
        }
    }
    Ok(())
}
