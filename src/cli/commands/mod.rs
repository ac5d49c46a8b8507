//! Subcommand implementations. Each exposes `execute(args, config, json_mode)`.

pub mod capture;
pub mod contract;
pub mod cycle;
pub mod drift;
pub mod feedback;
pub mod fixture;
pub mod init;
pub mod regression;
pub mod report;

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

/// Inline text, or the content of a file when `--*-file` was given instead.
pub(crate) async fn text_arg(
    inline: Option<String>,
    file: Option<PathBuf>,
    what: &str,
) -> Result<String> {
    match (inline, file) {
        (Some(text), None) => Ok(text),
        (None, Some(path)) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {what} from {}", path.display())),
        (Some(_), Some(_)) => bail!("Give the {what} inline or as a file, not both"),
        (None, None) => bail!("Missing {what}"),
    }
}
