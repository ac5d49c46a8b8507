//! Cleanup of rolled log files past their retention period.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use tracing::{info, warn};

use super::config::LOG_FILE_PREFIX;

/// Delete rolled log files older than `retention_days`. Returns the number
/// of files deleted.
pub async fn cleanup_old_logs(log_dir: impl AsRef<Path>, retention_days: u32) -> Result<usize> {
    let log_dir = log_dir.as_ref();

    if !tokio::fs::try_exists(log_dir).await.unwrap_or(false) {
        warn!(path = %log_dir.display(), "log directory does not exist");
        return Ok(0);
    }

    let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
    let mut deleted_count = 0;

    let mut entries = tokio::fs::read_dir(log_dir)
        .await
        .context("failed to read log directory")?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .context("failed to read directory entry")?
    {
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if !is_log {
            continue;
        }

        let modified: DateTime<Utc> = tokio::fs::metadata(&path)
            .await
            .context("failed to get file metadata")?
            .modified()
            .context("failed to get file modification time")?
            .into();

        if modified < cutoff {
            tokio::fs::remove_file(&path)
                .await
                .context("failed to delete old log file")?;
            deleted_count += 1;
        }
    }

    if deleted_count > 0 {
        info!(count = deleted_count, "cleaned up old log files");
    }

    Ok(deleted_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_cleanup_only_touches_log_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("gatekeep.log.2026-01-01"), "old").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let deleted = cleanup_old_logs(dir.path(), 0).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_recent_logs_are_kept() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("gatekeep.log.2026-10-19"), "today").unwrap();
        assert_eq!(cleanup_old_logs(dir.path(), 30).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert_eq!(cleanup_old_logs(&missing, 30).await.unwrap(), 0);
    }
}
