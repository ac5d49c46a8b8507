use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use regex::Regex;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project-local configuration directory.
pub const CONFIG_DIR: &str = ".gatekeep";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid pass_threshold: {0}. Must be within [0, 1]")]
    InvalidPassThreshold(f64),

    #[error("Invalid {field}: must be at least 1")]
    ZeroValue { field: &'static str },

    #[error("Invalid pattern in {field}: {reason}")]
    InvalidPattern { field: &'static str, reason: String },

    #[error(
        "Invalid retention: clean captures ({clean}d) must not outlive flagged ones ({flagged}d)"
    )]
    InvalidRetention { clean: i64, flagged: i64 },

    #[error(
        "Invalid cycle.lease_ttl_secs: {ttl}s must exceed the {budget}s wall-clock budget"
    )]
    LeaseTooShort { ttl: u64, budget: u64 },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .gatekeep/config.yaml (project config, created by init)
    /// 3. .gatekeep/local.yaml (project local overrides, optional)
    /// 4. Environment variables (GATEKEEP_* prefix, `__` separates nesting)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(CONFIG_DIR)
    }

    /// Same precedence as [`ConfigLoader::load`], rooted at another directory.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("GATEKEEP_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let threshold = config.scoring.pass_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidPassThreshold(threshold));
        }
        for (field, value) in [
            ("scoring.delivery_limit", config.scoring.delivery_limit),
            ("scoring.echo_min_chars", config.scoring.echo_min_chars),
            ("regression.concurrency", config.regression.concurrency),
            ("cycle.max_diff_lines", config.cycle.max_diff_lines),
            ("drift.concurrency", config.drift.concurrency),
            ("capture.retry_capacity", config.capture.retry_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroValue { field });
            }
        }
        if config.cycle.checkpoint_interval == 0 {
            return Err(ConfigError::ZeroValue {
                field: "cycle.checkpoint_interval",
            });
        }
        if config.cycle.wall_clock_budget_secs == 0 {
            return Err(ConfigError::ZeroValue {
                field: "cycle.wall_clock_budget_secs",
            });
        }
        if config.cycle.lease_ttl_secs <= config.cycle.wall_clock_budget_secs {
            return Err(ConfigError::LeaseTooShort {
                ttl: config.cycle.lease_ttl_secs,
                budget: config.cycle.wall_clock_budget_secs,
            });
        }
        if config.capture.max_retries == 0 {
            return Err(ConfigError::ZeroValue {
                field: "capture.max_retries",
            });
        }
        if config.logging.retention_days == 0 {
            return Err(ConfigError::ZeroValue {
                field: "logging.retention_days",
            });
        }

        for pattern in &config.scoring.noise_patterns {
            compile("scoring.noise_patterns", pattern)?;
        }
        compile("cycle.signature_pattern", &config.cycle.signature_pattern)?;
        compile("cycle.dependency_pattern", &config.cycle.dependency_pattern)?;

        let (clean, flagged) = (
            config.capture.clean_retention_days,
            config.capture.flagged_retention_days,
        );
        if clean <= 0 || clean > flagged {
            return Err(ConfigError::InvalidRetention { clean, flagged });
        }

        if let Some(url) = &config.notify.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::ValidationFailed(format!(
                    "notify.webhook_url must be an http(s) URL, got '{url}'"
                )));
            }
        }

        Ok(())
    }
}

fn compile(field: &'static str, pattern: &str) -> Result<(), ConfigError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidPattern {
            field,
            reason: e.to_string(),
        })
}
