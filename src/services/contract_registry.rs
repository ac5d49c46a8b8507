//! Output contract registry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ContractEvolution, LengthBounds, OutputContract, SectionSpec, DEFAULT_DRIFT_THRESHOLD,
};
use crate::domain::ports::ContractRepository;

fn default_drift_threshold() -> f64 {
    DEFAULT_DRIFT_THRESHOLD
}

/// Contract fields as authored in a definition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDefinition {
    pub name: String,
    #[serde(default)]
    pub required_sections: Vec<SectionSpec>,
    #[serde(default)]
    pub section_order: Option<Vec<String>>,
    #[serde(default)]
    pub required_markers: Vec<String>,
    #[serde(default)]
    pub length_bounds: LengthBounds,
    #[serde(default)]
    pub required_patterns: Vec<String>,
    #[serde(default)]
    pub forbidden_patterns: Vec<String>,
    #[serde(default)]
    pub reference_examples: Vec<String>,
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: f64,
}

impl ContractDefinition {
    pub fn into_contract(self) -> OutputContract {
        let mut contract = OutputContract::new(self.name);
        contract.required_sections = self.required_sections;
        contract.section_order = self.section_order;
        contract.required_markers = self.required_markers;
        contract.length_bounds = self.length_bounds;
        contract.required_patterns = self.required_patterns;
        contract.forbidden_patterns = self.forbidden_patterns;
        contract.reference_examples = self.reference_examples;
        contract.drift_threshold = self.drift_threshold;
        contract
    }

    pub fn parse(raw: &str, yaml: bool) -> DomainResult<Self> {
        if yaml {
            serde_yaml::from_str(raw).map_err(|e| DomainError::SerializationError(e.to_string()))
        } else {
            Ok(serde_json::from_str(raw)?)
        }
    }
}

/// Result of an evolve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evolved {
    pub contract: OutputContract,
    pub drift_records_reset: u64,
}

pub struct ContractRegistry {
    repo: Arc<dyn ContractRepository>,
}

impl ContractRegistry {
    pub fn new(repo: Arc<dyn ContractRepository>) -> Self {
        Self { repo }
    }

    /// Register a contract. Names are unique; the contract must compile.
    pub async fn create(&self, contract: OutputContract) -> DomainResult<OutputContract> {
        contract.compile()?;
        if self.repo.get_by_name(&contract.name).await?.is_some() {
            return Err(DomainError::InvalidContract {
                contract: contract.name.clone(),
                reason: "a contract with this name already exists".to_string(),
            });
        }
        self.repo.create(&contract).await?;
        tracing::info!(
            contract_id = %contract.id,
            name = %contract.name,
            "Output contract registered"
        );
        Ok(contract)
    }

    pub async fn get(&self, id: Uuid) -> DomainResult<OutputContract> {
        self.repo
            .get(id)
            .await?
            .ok_or(DomainError::ContractNotFound(id))
    }

    pub async fn get_by_name(&self, name: &str) -> DomainResult<OutputContract> {
        self.repo
            .get_by_name(name)
            .await?
            .ok_or_else(|| DomainError::ContractNameNotFound(name.to_string()))
    }

    /// Look up by id when `reference` parses as a UUID, by name otherwise.
    pub async fn resolve(&self, reference: &str) -> DomainResult<OutputContract> {
        match Uuid::parse_str(reference) {
            Ok(id) => self.get(id).await,
            Err(_) => self.get_by_name(reference).await,
        }
    }

    pub async fn list(&self) -> DomainResult<Vec<OutputContract>> {
        self.repo.list().await
    }

    pub async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let contract = self.get(id).await?;
        self.repo.delete(id).await?;
        tracing::info!(contract_id = %id, name = %contract.name, "Output contract deleted");
        Ok(())
    }

    /// Apply an evolution and reset the contract's drift history in one step.
    ///
    /// The evolved contract must still compile; otherwise nothing is stored.
    pub async fn evolve(&self, id: Uuid, evolution: ContractEvolution) -> DomainResult<Evolved> {
        let mut contract = self.get(id).await?;
        contract.evolve(evolution);
        contract.compile()?;
        let drift_records_reset = self.repo.evolve(&contract).await?;
        tracing::info!(
            contract_id = %id,
            version = contract.version,
            drift_records_reset,
            "Output contract evolved"
        );
        Ok(Evolved {
            contract,
            drift_records_reset,
        })
    }
}
