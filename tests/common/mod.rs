//! Common test utilities for integration tests
//!
//! Provides an in-memory staged pipeline, a scripted change proposer and a
//! harness that wires them to a migrated in-memory database.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gatekeep::adapters::sqlite::create_migrated_test_pool;
use gatekeep::cli::context::AppContext;
use gatekeep::domain::errors::{DomainError, DomainResult, TransformError};
use gatekeep::domain::models::{
    stage, ChangeProposal, Config, CyclePlan, Difficulty, Fixture, Provenance, StageEdit,
    StageSnapshot,
};
use gatekeep::domain::ports::{ChangeProposer, FixtureRepository, StagedPipeline, Transform};
use gatekeep::services::{ImprovementCycleService, RegressionRunner, WriterLease};

/// Stage content containing this line makes echo inputs come back empty.
pub const BREAK_MARKER: &str = "BREAK";

/// Pipeline held in memory.
///
/// Inputs of the form `q<N>` answer `Answer <N>.` once the stages together
/// hold at least N non-empty lines, and nothing before that. Every other
/// input is echoed back unless some stage contains [`BREAK_MARKER`].
pub struct MemoryPipeline {
    stages: Mutex<BTreeMap<String, String>>,
    order: Vec<String>,
    persisted: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
    snapshot_fails: AtomicBool,
    persist_fails: AtomicBool,
}

impl Default for MemoryPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPipeline {
    pub fn new() -> Self {
        let order: Vec<String> = stage::ALL.iter().map(|s| (*s).to_string()).collect();
        let stages = order.iter().map(|s| (s.clone(), String::new())).collect();
        Self {
            stages: Mutex::new(stages),
            order,
            persisted: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
            snapshot_fails: AtomicBool::new(false),
            persist_fails: AtomicBool::new(false),
        }
    }

    /// Every transform call sleeps this long first.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fail_snapshots(&self) {
        self.snapshot_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_persists(&self) {
        self.persist_fails.store(true, Ordering::SeqCst);
    }

    pub fn content(&self, stage: &str) -> String {
        self.stages.lock().unwrap().get(stage).cloned().unwrap_or_default()
    }

    pub fn persisted(&self) -> Vec<String> {
        self.persisted.lock().unwrap().clone()
    }

    fn rule_lines(&self) -> usize {
        self.stages
            .lock()
            .unwrap()
            .values()
            .flat_map(|c| c.lines())
            .filter(|l| !l.trim().is_empty())
            .count()
    }

    fn broken(&self) -> bool {
        self.stages
            .lock()
            .unwrap()
            .values()
            .any(|c| c.lines().any(|l| l.trim() == BREAK_MARKER))
    }
}

#[async_trait]
impl Transform for MemoryPipeline {
    async fn transform(&self, input: &str) -> Result<String, TransformError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(n) = input.strip_prefix('q').and_then(|n| n.parse::<usize>().ok()) {
            return Ok(if self.rule_lines() >= n {
                format!("Answer {n}.")
            } else {
                String::new()
            });
        }
        if self.broken() {
            return Ok(String::new());
        }
        Ok(input.to_string())
    }
}

#[async_trait]
impl StagedPipeline for MemoryPipeline {
    async fn stages(&self) -> DomainResult<Vec<String>> {
        Ok(self.order.clone())
    }

    async fn snapshot(&self, stage: &str) -> DomainResult<StageSnapshot> {
        if self.snapshot_fails.load(Ordering::SeqCst) {
            return Err(DomainError::UnknownStage(stage.to_string()));
        }
        let stages = self.stages.lock().unwrap();
        let content = stages
            .get(stage)
            .cloned()
            .ok_or_else(|| DomainError::UnknownStage(stage.to_string()))?;
        Ok(StageSnapshot {
            stage: stage.to_string(),
            content,
        })
    }

    async fn apply(&self, stage: &str, content: &str) -> DomainResult<()> {
        let mut stages = self.stages.lock().unwrap();
        match stages.get_mut(stage) {
            Some(slot) => {
                *slot = content.to_string();
                Ok(())
            }
            None => Err(DomainError::UnknownStage(stage.to_string())),
        }
    }

    async fn restore(&self, snapshot: &StageSnapshot) -> DomainResult<()> {
        self.apply(&snapshot.stage, &snapshot.content).await
    }

    async fn persist(&self, stage: &str) -> DomainResult<()> {
        if self.persist_fails.load(Ordering::SeqCst) {
            return Err(DomainError::PipelineError(format!("disk full writing {stage}")));
        }
        self.persisted.lock().unwrap().push(stage.to_string());
        Ok(())
    }
}

type ProposeFn = dyn Fn(&CyclePlan, &StageSnapshot) -> ChangeProposal + Send + Sync;

/// Proposer that answers with whatever the test's closure builds.
pub struct ScriptedProposer {
    script: Box<ProposeFn>,
    calls: Mutex<usize>,
}

impl ScriptedProposer {
    pub fn new(
        script: impl Fn(&CyclePlan, &StageSnapshot) -> ChangeProposal + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(0),
        }
    }

    /// Append one rule line to whatever stage the plan targets.
    pub fn appending_rule() -> Self {
        Self::new(|plan, current| {
            single_edit(&plan.target_stage, format!("{}rule\n", current.content))
        })
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ChangeProposer for ScriptedProposer {
    async fn propose(
        &self,
        plan: &CyclePlan,
        current: &StageSnapshot,
    ) -> DomainResult<ChangeProposal> {
        *self.calls.lock().unwrap() += 1;
        Ok((self.script)(plan, current))
    }
}

pub fn single_edit(stage: &str, new_content: String) -> ChangeProposal {
    ChangeProposal {
        edits: vec![StageEdit {
            stage: stage.to_string(),
            new_content,
        }],
        ..Default::default()
    }
}

/// Store, pipeline and proposer for one test.
pub struct Harness {
    pub ctx: AppContext,
    pub pipeline: Arc<MemoryPipeline>,
    pub proposer: Arc<ScriptedProposer>,
}

impl Harness {
    pub async fn new(proposer: ScriptedProposer) -> Self {
        Self::with_config(Config::default(), proposer).await
    }

    pub async fn with_config(config: Config, proposer: ScriptedProposer) -> Self {
        let pool = create_migrated_test_pool().await.unwrap();
        Self {
            ctx: AppContext::from_pool(config, pool),
            pipeline: Arc::new(MemoryPipeline::new()),
            proposer: Arc::new(proposer),
        }
    }

    pub fn runner(&self) -> Arc<RegressionRunner> {
        Arc::new(self.ctx.regression_runner().unwrap())
    }

    pub fn lease(&self) -> WriterLease {
        WriterLease::with_owner(self.ctx.leases.clone(), "test", Duration::from_secs(60))
    }

    pub fn cycle_service(&self) -> ImprovementCycleService {
        self.cycle_service_with_lease(self.lease())
    }

    pub fn cycle_service_with_lease(&self, lease: WriterLease) -> ImprovementCycleService {
        ImprovementCycleService::new(
            self.ctx.config.cycle.clone(),
            self.runner(),
            self.pipeline.clone(),
            self.proposer.clone(),
            self.ctx.feedback.clone(),
            self.ctx.drift.clone(),
            self.ctx.cycles.clone(),
            lease,
        )
        .unwrap()
    }

    pub async fn add_fixture(&self, key: &str, input: &str, expected: &str) -> Fixture {
        let fixture = Fixture::new(
            key,
            input,
            expected,
            "conversation",
            Difficulty::Easy,
            Provenance::Curated,
        )
        .unwrap();
        self.ctx.fixtures.create(&fixture).await.unwrap();
        fixture
    }
}
