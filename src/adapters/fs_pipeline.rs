//! Staged pipeline kept as plain files on disk.
//!
//! Layout of the stages directory:
//!
//! ```text
//! stages              # manifest: one stage name per line, in pipeline order
//! <stage>             # current content of each stage
//! .history/<stage>.<timestamp>   # copy written on every persist
//! ```
//!
//! The transform command is expected to read the stage files itself, so an
//! applied edit takes effect on the next `transform` call.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::domain::errors::{DomainError, DomainResult, TransformError};
use crate::domain::models::StageSnapshot;
use crate::domain::ports::{StagedPipeline, Transform};

pub const MANIFEST_FILE: &str = "stages";
pub const HISTORY_DIR: &str = ".history";

pub struct FsStagedPipeline<T: Transform> {
    dir: PathBuf,
    transform: T,
}

impl<T: Transform> FsStagedPipeline<T> {
    pub fn new(dir: impl Into<PathBuf>, transform: T) -> Self {
        Self {
            dir: dir.into(),
            transform,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn stage_path(&self, stage: &str) -> DomainResult<PathBuf> {
        if self.stages().await?.iter().any(|s| s == stage) {
            Ok(self.dir.join(stage))
        } else {
            Err(DomainError::UnknownStage(stage.to_string()))
        }
    }
}

/// Write a manifest and empty stage files for any stage not yet present.
pub async fn init_stage_dir(dir: &Path, stages: &[&str]) -> DomainResult<()> {
    tokio::fs::create_dir_all(dir).await.map_err(io_error)?;
    let manifest = dir.join(MANIFEST_FILE);
    if !tokio::fs::try_exists(&manifest).await.map_err(io_error)? {
        let mut body = stages.join("\n");
        body.push('\n');
        tokio::fs::write(&manifest, body).await.map_err(io_error)?;
    }
    for stage in stages {
        let path = dir.join(stage);
        if !tokio::fs::try_exists(&path).await.map_err(io_error)? {
            tokio::fs::write(&path, "").await.map_err(io_error)?;
        }
    }
    Ok(())
}

fn io_error(e: std::io::Error) -> DomainError {
    DomainError::PipelineError(e.to_string())
}

#[async_trait]
impl<T: Transform> Transform for FsStagedPipeline<T> {
    async fn transform(&self, input: &str) -> Result<String, TransformError> {
        self.transform.transform(input).await
    }
}

#[async_trait]
impl<T: Transform> StagedPipeline for FsStagedPipeline<T> {
    async fn stages(&self) -> DomainResult<Vec<String>> {
        let manifest = tokio::fs::read_to_string(self.dir.join(MANIFEST_FILE))
            .await
            .map_err(|e| {
                DomainError::PipelineError(format!(
                    "cannot read stage manifest in {}: {e}",
                    self.dir.display()
                ))
            })?;
        Ok(manifest
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(String::from)
            .collect())
    }

    async fn snapshot(&self, stage: &str) -> DomainResult<StageSnapshot> {
        let path = self.stage_path(stage).await?;
        let content = tokio::fs::read_to_string(&path).await.map_err(io_error)?;
        Ok(StageSnapshot {
            stage: stage.to_string(),
            content,
        })
    }

    async fn apply(&self, stage: &str, content: &str) -> DomainResult<()> {
        let path = self.stage_path(stage).await?;
        tokio::fs::write(&path, content).await.map_err(io_error)?;
        tracing::debug!(stage, bytes = content.len(), "Stage content applied");
        Ok(())
    }

    async fn restore(&self, snapshot: &StageSnapshot) -> DomainResult<()> {
        let path = self.stage_path(&snapshot.stage).await?;
        tokio::fs::write(&path, &snapshot.content)
            .await
            .map_err(io_error)?;
        tracing::info!(stage = %snapshot.stage, "Stage restored from snapshot");
        Ok(())
    }

    async fn persist(&self, stage: &str) -> DomainResult<()> {
        let path = self.stage_path(stage).await?;
        let history = self.dir.join(HISTORY_DIR);
        tokio::fs::create_dir_all(&history).await.map_err(io_error)?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%6fZ");
        let copy = history.join(format!("{stage}.{stamp}"));
        tokio::fs::copy(&path, &copy).await.map_err(io_error)?;
        tracing::info!(stage, history = %copy.display(), "Stage persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::command::{CommandSpec, CommandTransform};
    use std::time::Duration;

    fn pipeline(dir: &Path) -> FsStagedPipeline<CommandTransform> {
        // Prefix every input with the content of the `greeting` stage.
        let script = format!("cat {}/greeting; cat", dir.display());
        FsStagedPipeline::new(
            dir,
            CommandTransform::new(CommandSpec::new(
                "sh",
                vec!["-c".into(), script],
                Duration::from_secs(5),
            )),
        )
    }

    #[tokio::test]
    async fn test_apply_changes_transform_and_restore_reverts() {
        let dir = tempfile::tempdir().unwrap();
        init_stage_dir(dir.path(), &["greeting", "closing"]).await.unwrap();
        let pipeline = pipeline(dir.path());
        assert_eq!(pipeline.stages().await.unwrap(), vec!["greeting", "closing"]);

        pipeline.apply("greeting", "Hi ").await.unwrap();
        let before = pipeline.snapshot("greeting").await.unwrap();
        assert_eq!(pipeline.transform("there.").await.unwrap(), "Hi there.");

        pipeline.apply("greeting", "Hello ").await.unwrap();
        assert_eq!(pipeline.transform("there.").await.unwrap(), "Hello there.");

        pipeline.restore(&before).await.unwrap();
        assert_eq!(pipeline.snapshot("greeting").await.unwrap().content, "Hi ");
    }

    #[tokio::test]
    async fn test_unknown_stage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        init_stage_dir(dir.path(), &["greeting"]).await.unwrap();
        let pipeline = pipeline(dir.path());
        assert!(matches!(
            pipeline.apply("../escape", "x").await,
            Err(DomainError::UnknownStage(_))
        ));
    }

    #[tokio::test]
    async fn test_persist_writes_history_copy() {
        let dir = tempfile::tempdir().unwrap();
        init_stage_dir(dir.path(), &["greeting"]).await.unwrap();
        let pipeline = pipeline(dir.path());
        pipeline.apply("greeting", "Hey ").await.unwrap();
        pipeline.persist("greeting").await.unwrap();

        let mut entries = std::fs::read_dir(dir.path().join(HISTORY_DIR)).unwrap();
        let entry = entries.next().unwrap().unwrap();
        assert!(entry.file_name().to_string_lossy().starts_with("greeting."));
        assert_eq!(std::fs::read_to_string(entry.path()).unwrap(), "Hey ");
    }

    #[tokio::test]
    async fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        assert!(matches!(
            pipeline.stages().await,
            Err(DomainError::PipelineError(_))
        ));
    }
}
