//! Wiring from configuration to repositories and services.

use anyhow::{bail, Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::command::{CommandProposer, CommandSpec, CommandTransform};
use crate::adapters::fs_pipeline::FsStagedPipeline;
use crate::adapters::notify;
use crate::adapters::sqlite::{
    database_url, initialize_database, PoolConfig, SqliteCaptureRepository,
    SqliteContractRepository, SqliteCycleRepository, SqliteDriftRepository,
    SqliteFeedbackRepository, SqliteFixtureRepository, SqliteLeaseRepository,
    SqliteRegressionRunRepository,
};
use crate::domain::models::Config;
use crate::domain::ports::Notifier;
use crate::services::{
    CaptureIngest, CheckpointLedger, ContractRegistry, DimensionSet, DriftDetector,
    FeedbackIntake, FixtureService, ImprovementCycleService, QualityReportBuilder,
    RegressionRunner, WriterLease,
};

/// Open store plus the configuration it was opened with.
pub struct AppContext {
    pub config: Config,
    pub pool: SqlitePool,
    pub fixtures: Arc<SqliteFixtureRepository>,
    pub captures: Arc<SqliteCaptureRepository>,
    pub contracts: Arc<SqliteContractRepository>,
    pub drift: Arc<SqliteDriftRepository>,
    pub feedback: Arc<SqliteFeedbackRepository>,
    pub cycles: Arc<SqliteCycleRepository>,
    pub runs: Arc<SqliteRegressionRunRepository>,
    pub leases: Arc<SqliteLeaseRepository>,
}

impl AppContext {
    pub async fn open(config: Config) -> Result<Self> {
        let url = database_url(&config.database.path);
        let pool = initialize_database(&url, Some(PoolConfig::from(&config.database)))
            .await
            .context("Failed to open database. Run 'gatekeep init' first.")?;
        Ok(Self::from_pool(config, pool))
    }

    pub fn from_pool(config: Config, pool: SqlitePool) -> Self {
        Self {
            fixtures: Arc::new(SqliteFixtureRepository::new(pool.clone())),
            captures: Arc::new(SqliteCaptureRepository::new(pool.clone())),
            contracts: Arc::new(SqliteContractRepository::new(pool.clone())),
            drift: Arc::new(SqliteDriftRepository::new(pool.clone())),
            feedback: Arc::new(SqliteFeedbackRepository::new(pool.clone())),
            cycles: Arc::new(SqliteCycleRepository::new(pool.clone())),
            runs: Arc::new(SqliteRegressionRunRepository::new(pool.clone())),
            leases: Arc::new(SqliteLeaseRepository::new(pool.clone())),
            config,
            pool,
        }
    }

    pub fn notifier(&self) -> Result<Arc<dyn Notifier>> {
        notify::from_config(&self.config.notify).context("Failed to build notifier")
    }

    pub fn writer_lease(&self) -> WriterLease {
        WriterLease::new(
            self.leases.clone(),
            Duration::from_secs(self.config.cycle.lease_ttl_secs),
        )
    }

    pub fn fixture_service(&self) -> FixtureService {
        FixtureService::new(self.fixtures.clone(), self.captures.clone())
    }

    pub fn capture_ingest(&self) -> CaptureIngest {
        CaptureIngest::new(
            self.captures.clone(),
            self.config.scoring.clone(),
            self.config.capture.clone(),
        )
    }

    pub fn contract_registry(&self) -> ContractRegistry {
        ContractRegistry::new(self.contracts.clone())
    }

    pub fn feedback_intake(&self) -> FeedbackIntake {
        FeedbackIntake::new(self.feedback.clone(), self.captures.clone())
    }

    pub fn regression_runner(&self) -> Result<RegressionRunner> {
        let fidelity = DimensionSet::transform_fidelity(&self.config.scoring)
            .context("Invalid scoring configuration")?;
        Ok(RegressionRunner::new(
            Arc::new(fidelity),
            self.config.regression.clone(),
            self.fixtures.clone(),
            self.runs.clone(),
        )
        .with_notifier(self.notifier()?))
    }

    pub fn drift_detector(&self) -> Result<DriftDetector> {
        let compliance =
            DimensionSet::contract_compliance().context("Failed to build compliance scorer")?;
        Ok(DriftDetector::new(
            Arc::new(compliance),
            self.config.drift.clone(),
            self.captures.clone(),
            self.contracts.clone(),
            self.drift.clone(),
        ))
    }

    pub fn report_builder(&self) -> QualityReportBuilder {
        QualityReportBuilder::new(
            self.runs.clone(),
            self.captures.clone(),
            self.cycles.clone(),
            self.contracts.clone(),
            self.drift.clone(),
            self.feedback.clone(),
            self.config.cycle.checkpoint_interval,
        )
    }

    /// The configured transform command.
    pub fn transform(&self) -> Result<CommandTransform> {
        let pipeline = &self.config.pipeline;
        let Some(program) = &pipeline.transform_command else {
            bail!(
                "No transform configured. Set pipeline.transform_command in .gatekeep/config.yaml"
            );
        };
        Ok(CommandTransform::new(CommandSpec::new(
            program.clone(),
            pipeline.transform_args.clone(),
            Duration::from_secs(self.config.regression.transform_timeout_secs),
        )))
    }

    pub fn pipeline(&self) -> Result<FsStagedPipeline<CommandTransform>> {
        Ok(FsStagedPipeline::new(
            &self.config.pipeline.stages_dir,
            self.transform()?,
        ))
    }

    pub fn proposer(&self) -> Result<CommandProposer> {
        let pipeline = &self.config.pipeline;
        let Some(program) = &pipeline.proposer_command else {
            bail!(
                "No proposer configured. Set pipeline.proposer_command in .gatekeep/config.yaml"
            );
        };
        Ok(CommandProposer::new(CommandSpec::new(
            program.clone(),
            pipeline.proposer_args.clone(),
            Duration::from_secs(pipeline.proposer_timeout_secs),
        )))
    }

    /// Checkpoint state and cycle history; needs no transform or proposer.
    pub fn checkpoints(&self) -> CheckpointLedger {
        CheckpointLedger::new(self.cycles.clone(), self.config.cycle.checkpoint_interval)
    }

    pub fn cycle_service(&self) -> Result<ImprovementCycleService> {
        let proposer = self.proposer()?;
        let service = ImprovementCycleService::new(
            self.config.cycle.clone(),
            Arc::new(self.regression_runner()?),
            Arc::new(self.pipeline()?),
            Arc::new(proposer),
            self.feedback.clone(),
            self.drift.clone(),
            self.cycles.clone(),
            self.writer_lease(),
        )
        .context("Invalid cycle configuration")?;
        Ok(service.with_notifier(self.notifier()?))
    }
}
