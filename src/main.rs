//! gatekeep CLI entry point.

use clap::Parser;

use gatekeep::cli::{commands, handle_error, Cli, Commands};
use gatekeep::infrastructure::config::ConfigLoader;
use gatekeep::infrastructure::logging::{cleanup_old_logs, LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ConfigLoader::load() {
        Ok(config) => config,
        Err(err) => handle_error(err.context("Invalid configuration"), cli.json),
    };

    let log_config = LogConfig::from(&config.logging);
    let _logger = match LoggerImpl::init(&log_config) {
        Ok(logger) => logger,
        Err(err) => handle_error(err.context("Failed to initialize logging"), cli.json),
    };
    if let Some(log_dir) = &log_config.log_dir {
        if let Err(err) = cleanup_old_logs(log_dir, log_config.retention_days).await {
            tracing::warn!(error = %err, "Log retention cleanup failed");
        }
    }

    let json = cli.json;
    let result = match cli.command {
        Commands::Init(args) => commands::init::execute(args, &config, json).await,
        Commands::Fixture(args) => commands::fixture::execute(args, config, json).await,
        Commands::Capture(args) => commands::capture::execute(args, config, json).await,
        Commands::Regression(args) => commands::regression::execute(args, config, json).await,
        Commands::Contract(args) => commands::contract::execute(args, config, json).await,
        Commands::Drift(args) => commands::drift::execute(args, config, json).await,
        Commands::Feedback(args) => commands::feedback::execute(args, config, json).await,
        Commands::Cycle(args) => commands::cycle::execute(args, config, json).await,
        Commands::Report(args) => commands::report::execute(args, config, json).await,
    };

    if let Err(err) = result {
        handle_error(err, json);
    }
}
