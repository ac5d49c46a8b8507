//! Implementation of the `gatekeep init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use crate::adapters::fs_pipeline::init_stage_dir;
use crate::adapters::sqlite::{database_url, initialize_database, PoolConfig};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{stage, Config};
use crate::infrastructure::config::CONFIG_DIR;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config.yaml with the defaults
    #[arg(long, short)]
    pub force: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub config_dir: PathBuf,
    pub config_written: bool,
    pub database: String,
    pub stages_dir: String,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if self.config_written {
            lines.push(format!(
                "\nWrote {}",
                self.config_dir.join("config.yaml").display()
            ));
        }
        lines.push(format!("Database: {}", self.database));
        lines.push(format!("Pipeline stages: {}", self.stages_dir));
        lines.join("\n")
    }
}

pub async fn execute(args: InitArgs, config: &Config, json_mode: bool) -> Result<()> {
    let config_dir = PathBuf::from(CONFIG_DIR);
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;

    let config_written = write_default_config(&config_dir, args.force).await?;

    if let Some(parent) = Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let pool = initialize_database(
        &database_url(&config.database.path),
        Some(PoolConfig::from(&config.database)),
    )
    .await
    .context("Failed to initialize database")?;
    pool.close().await;

    init_stage_dir(Path::new(&config.pipeline.stages_dir), &stage::ALL)
        .await
        .context("Failed to create pipeline stage files")?;

    output(
        &InitOutput {
            success: true,
            message: "gatekeep initialized".to_string(),
            config_dir,
            config_written,
            database: config.database.path.clone(),
            stages_dir: config.pipeline.stages_dir.clone(),
        },
        json_mode,
    );
    Ok(())
}

async fn write_default_config(config_dir: &Path, force: bool) -> Result<bool> {
    let path = config_dir.join("config.yaml");
    if path.exists() && !force {
        return Ok(false);
    }
    let body = serde_yaml::to_string(&Config::default()).context("Failed to render config")?;
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}
