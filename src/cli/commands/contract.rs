//! Output contract commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

use crate::cli::context::AppContext;
use crate::cli::output::{output, table, CommandOutput};
use crate::domain::models::{Config, ContractEvolution, OutputContract};
use crate::services::{ContractDefinition, Evolved};

#[derive(Args, Debug)]
pub struct ContractArgs {
    #[command(subcommand)]
    pub command: ContractCommands,
}

#[derive(Subcommand, Debug)]
pub enum ContractCommands {
    /// Register a contract from a JSON or YAML definition
    Create { path: PathBuf },
    /// List contracts
    List,
    /// Show one contract
    Show {
        /// Contract name or id
        contract: String,
    },
    /// Delete a contract and its drift history
    Delete { contract: String },
    /// Apply an evolution file; resets the contract's drift history
    Evolve { contract: String, path: PathBuf },
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    )
}

async fn read_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

#[derive(Debug, serde::Serialize)]
pub struct ContractOutput {
    pub message: String,
    pub contract: OutputContract,
}

impl CommandOutput for ContractOutput {
    fn to_human(&self) -> String {
        let c = &self.contract;
        let mut lines = vec![
            self.message.clone(),
            format!("ID: {}", c.id),
            format!("Version: {}", c.version),
            format!("Drift threshold: {:.2}", c.drift_threshold),
            format!(
                "Length: {}..={} chars",
                c.length_bounds.min, c.length_bounds.max
            ),
        ];
        if !c.required_sections.is_empty() {
            let names: Vec<&str> = c.required_sections.iter().map(|s| s.name.as_str()).collect();
            lines.push(format!("Sections: {}", names.join(", ")));
        }
        if let Some(order) = &c.section_order {
            lines.push(format!("Section order: {}", order.join(" > ")));
        }
        if !c.required_markers.is_empty() {
            lines.push(format!("Markers: {}", c.required_markers.join(" ")));
        }
        if !c.required_patterns.is_empty() {
            lines.push(format!("Required patterns: {}", c.required_patterns.join(", ")));
        }
        if !c.forbidden_patterns.is_empty() {
            lines.push(format!("Forbidden patterns: {}", c.forbidden_patterns.join(", ")));
        }
        lines.push(format!("Reference examples: {}", c.reference_examples.len()));
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ContractListOutput {
    pub contracts: Vec<OutputContract>,
}

impl CommandOutput for ContractListOutput {
    fn to_human(&self) -> String {
        if self.contracts.is_empty() {
            return "No contracts registered.".to_string();
        }
        table::contracts(&self.contracts)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct EvolveOutput {
    #[serde(flatten)]
    pub evolved: Evolved,
}

impl CommandOutput for EvolveOutput {
    fn to_human(&self) -> String {
        format!(
            "Contract '{}' evolved to version {}; {} drift record(s) reset",
            self.evolved.contract.name,
            self.evolved.contract.version,
            self.evolved.drift_records_reset
        )
    }
}

#[derive(Debug, serde::Serialize)]
pub struct DeleteOutput {
    pub success: bool,
    pub message: String,
}

impl CommandOutput for DeleteOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn execute(args: ContractArgs, config: Config, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open(config).await?;
    let registry = ctx.contract_registry();

    match args.command {
        ContractCommands::Create { path } => {
            let raw = read_file(&path).await?;
            let definition = ContractDefinition::parse(&raw, is_yaml(&path))?;
            let contract = registry.create(definition.into_contract()).await?;
            output(
                &ContractOutput {
                    message: format!("Contract '{}' registered", contract.name),
                    contract,
                },
                json_mode,
            );
        }
        ContractCommands::List => {
            let contracts = registry.list().await?;
            output(&ContractListOutput { contracts }, json_mode);
        }
        ContractCommands::Show { contract } => {
            let contract = registry.resolve(&contract).await?;
            output(
                &ContractOutput {
                    message: format!("Contract: {}", contract.name),
                    contract,
                },
                json_mode,
            );
        }
        ContractCommands::Delete { contract } => {
            let contract = registry.resolve(&contract).await?;
            registry.delete(contract.id).await?;
            output(
                &DeleteOutput {
                    success: true,
                    message: format!("Contract '{}' deleted", contract.name),
                },
                json_mode,
            );
        }
        ContractCommands::Evolve { contract, path } => {
            let contract = registry.resolve(&contract).await?;
            let raw = read_file(&path).await?;
            let evolution: ContractEvolution = if is_yaml(&path) {
                serde_yaml::from_str(&raw).context("Invalid evolution file")?
            } else {
                serde_json::from_str(&raw).context("Invalid evolution file")?
            };
            let evolved = registry.evolve(contract.id, evolution).await?;
            output(&EvolveOutput { evolved }, json_mode);
        }
    }
    Ok(())
}
