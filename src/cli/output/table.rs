//! Table rendering with comfy-table.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::collections::BTreeMap;

use super::{short_id, truncate};
use crate::domain::models::{
    CategoryStats, Capture, CycleOutcome, FailingFixture, FeedbackItem, FeedbackPriority, Fixture,
    ImprovementCycle, OutputContract,
};

fn base_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );
    table
}

fn pass_cell(pass: Option<bool>) -> Cell {
    match pass {
        Some(true) => Cell::new("pass").fg(Color::Green),
        Some(false) => Cell::new("fail").fg(Color::Red),
        None => Cell::new("-"),
    }
}

pub fn fixtures(fixtures: &[Fixture]) -> String {
    let mut table = base_table(&["Key", "Category", "Difficulty", "Active", "Last", "Fails"]);
    for f in fixtures {
        table.add_row(vec![
            Cell::new(&f.key),
            Cell::new(&f.category),
            Cell::new(f.difficulty.as_str()),
            Cell::new(if f.active { "yes" } else { "no" }),
            pass_cell(f.last_pass),
            Cell::new(f.fail_count),
        ]);
    }
    table.to_string()
}

pub fn captures(captures: &[Capture]) -> String {
    let mut table = base_table(&["ID", "Captured", "Output", "Flags", "Promoted"]);
    for c in captures {
        let flags = &c.quality_flags;
        let names: Vec<&str> = [
            (flags.empty, "empty"),
            (flags.artifact_leak, "artifact"),
            (flags.echo_leak, "echo"),
            (flags.truncated, "truncated"),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| *name)
        .collect();
        let flag_cell = if names.is_empty() {
            Cell::new("-")
        } else {
            Cell::new(names.join(",")).fg(Color::Yellow)
        };
        table.add_row(vec![
            Cell::new(short_id(&c.id)),
            Cell::new(c.captured_at.format("%Y-%m-%d %H:%M").to_string()),
            Cell::new(truncate(&c.produced_output, 40)),
            flag_cell,
            Cell::new(if c.promoted { "yes" } else { "" }),
        ]);
    }
    table.to_string()
}

pub fn feedback(items: &[FeedbackItem]) -> String {
    let mut table = base_table(&["ID", "Priority", "Category", "Status", "Description"]);
    for item in items {
        let priority = match item.priority {
            FeedbackPriority::High => Cell::new("high").fg(Color::Red),
            FeedbackPriority::Normal => Cell::new("normal"),
        };
        table.add_row(vec![
            Cell::new(short_id(&item.id)),
            priority,
            Cell::new(&item.category),
            Cell::new(item.status.as_str()),
            Cell::new(truncate(item.description.as_deref().unwrap_or(""), 48)),
        ]);
    }
    table.to_string()
}

pub fn cycles(cycles: &[ImprovementCycle]) -> String {
    let mut table = base_table(&["ID", "Finished", "Stage", "Outcome", "Delta", "Reg", "Diff"]);
    for c in cycles {
        let outcome = match c.outcome {
            CycleOutcome::Committed => Cell::new("committed").fg(Color::Green),
            CycleOutcome::RolledBack => Cell::new(
                c.rollback_reason
                    .as_ref()
                    .map_or_else(|| "rolled_back".to_string(), |r| r.summary()),
            )
            .fg(Color::Yellow),
        };
        table.add_row(vec![
            Cell::new(short_id(&c.id)),
            Cell::new(c.finished_at.format("%Y-%m-%d %H:%M").to_string()),
            Cell::new(&c.target_stage),
            outcome,
            Cell::new(
                c.score_delta()
                    .map_or_else(|| "-".to_string(), |d| format!("{d:+.4}")),
            ),
            Cell::new(c.regressions_count),
            Cell::new(c.diff_size),
        ]);
    }
    table.to_string()
}

pub fn contracts(contracts: &[OutputContract]) -> String {
    let mut table = base_table(&["ID", "Name", "Version", "Sections", "Threshold"]);
    for c in contracts {
        table.add_row(vec![
            Cell::new(short_id(&c.id)),
            Cell::new(&c.name),
            Cell::new(c.version),
            Cell::new(c.required_sections.len()),
            Cell::new(format!("{:.2}", c.drift_threshold)),
        ]);
    }
    table.to_string()
}

pub fn categories(per_category: &BTreeMap<String, CategoryStats>) -> String {
    let mut table = base_table(&["Category", "Passed", "Total", "Pass rate"]);
    for (name, stats) in per_category {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(stats.passed),
            Cell::new(stats.total),
            Cell::new(format!("{:.1}%", stats.pass_rate * 100.0)),
        ]);
    }
    table.to_string()
}

pub fn failing(failing: &[FailingFixture]) -> String {
    let mut table = base_table(&["Fixture", "Category", "Score", "Failing dimensions"]);
    for f in failing {
        table.add_row(vec![
            Cell::new(&f.fixture_key),
            Cell::new(&f.category),
            Cell::new(format!("{:.3}", f.overall)).fg(Color::Red),
            Cell::new(f.failing_dimensions.join(", ")),
        ]);
    }
    table.to_string()
}
