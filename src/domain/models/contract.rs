//! Output contract domain model.
//!
//! An output contract declares the format a recurring live output must follow:
//! which sections it contains and in what order, verbatim markers, length
//! bounds, regex rules, and reference examples of a good output.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Default compliance threshold below which a live output counts as drifted.
pub const DEFAULT_DRIFT_THRESHOLD: f64 = 0.85;

fn default_drift_threshold() -> f64 {
    DEFAULT_DRIFT_THRESHOLD
}

/// A section the output must contain, detected by signal keywords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub name: String,
    /// Signal keywords; when empty the words of `name` are used.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl SectionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keywords: Vec::new(),
        }
    }

    pub fn with_keywords(name: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            name: name.into(),
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        }
    }

    /// Lowercased keywords used for detection.
    pub fn effective_keywords(&self) -> Vec<String> {
        if self.keywords.is_empty() {
            self.name
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
                .map(str::to_lowercase)
                .collect()
        } else {
            self.keywords.iter().map(|k| k.to_lowercase()).collect()
        }
    }
}

/// Inclusive character-count bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthBounds {
    pub min: usize,
    pub max: usize,
}

impl Default for LengthBounds {
    fn default() -> Self {
        Self { min: 0, max: 2000 }
    }
}

/// Declared format for a recurring output type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputContract {
    pub id: Uuid,
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
    /// Incremented by every evolve.
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutputContract {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            required_sections: Vec::new(),
            section_order: None,
            required_markers: Vec::new(),
            length_bounds: LengthBounds::default(),
            required_patterns: Vec::new(),
            forbidden_patterns: Vec::new(),
            reference_examples: Vec::new(),
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> DomainError {
        DomainError::InvalidContract {
            contract: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Check the contract is well-formed and compile its patterns.
    pub fn compile(&self) -> DomainResult<CompiledContract<'_>> {
        if self.name.trim().is_empty() {
            return Err(self.invalid("name cannot be empty"));
        }
        if !(self.drift_threshold > 0.0 && self.drift_threshold <= 1.0) {
            return Err(self.invalid(format!(
                "drift_threshold {} must be in (0, 1]",
                self.drift_threshold
            )));
        }
        if self.length_bounds.min > self.length_bounds.max {
            return Err(self.invalid(format!(
                "length bounds min {} exceeds max {}",
                self.length_bounds.min, self.length_bounds.max
            )));
        }
        for section in &self.required_sections {
            if section.effective_keywords().is_empty() {
                return Err(self.invalid(format!(
                    "section '{}' has no usable keywords",
                    section.name
                )));
            }
        }
        if let Some(order) = &self.section_order {
            for name in order {
                if !self.required_sections.iter().any(|s| &s.name == name) {
                    return Err(self.invalid(format!(
                        "section_order references undeclared section '{name}'"
                    )));
                }
            }
        }

        let compile_all = |patterns: &[String]| -> DomainResult<Vec<(String, Regex)>> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p)
                        .map(|re| (p.clone(), re))
                        .map_err(|e| self.invalid(format!("bad pattern '{p}': {e}")))
                })
                .collect()
        };

        Ok(CompiledContract {
            contract: self,
            required: compile_all(&self.required_patterns)?,
            forbidden: compile_all(&self.forbidden_patterns)?,
        })
    }

    /// Apply an evolution, bumping the version. The caller is responsible for
    /// resetting drift history in the same transaction.
    pub fn evolve(&mut self, evolution: ContractEvolution) {
        if let Some(examples) = evolution.reference_examples {
            self.reference_examples = examples;
        }
        if let Some(bounds) = evolution.length_bounds {
            self.length_bounds = bounds;
        }
        if let Some(sections) = evolution.required_sections {
            self.required_sections = sections;
        }
        if let Some(order) = evolution.section_order {
            self.section_order = order;
        }
        if let Some(markers) = evolution.required_markers {
            self.required_markers = markers;
        }
        if let Some(patterns) = evolution.required_patterns {
            self.required_patterns = patterns;
        }
        if let Some(patterns) = evolution.forbidden_patterns {
            self.forbidden_patterns = patterns;
        }
        if let Some(threshold) = evolution.drift_threshold {
            self.drift_threshold = threshold;
        }
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

/// Replacement fields for an evolve. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractEvolution {
    #[serde(default)]
    pub reference_examples: Option<Vec<String>>,
    #[serde(default)]
    pub length_bounds: Option<LengthBounds>,
    #[serde(default)]
    pub required_sections: Option<Vec<SectionSpec>>,
    #[serde(default)]
    pub section_order: Option<Option<Vec<String>>>,
    #[serde(default)]
    pub required_markers: Option<Vec<String>>,
    #[serde(default)]
    pub required_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub forbidden_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub drift_threshold: Option<f64>,
}

/// A validated contract with its regexes compiled.
#[derive(Debug)]
pub struct CompiledContract<'a> {
    pub contract: &'a OutputContract,
    pub required: Vec<(String, Regex)>,
    pub forbidden: Vec<(String, Regex)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_default_to_name_words() {
        let section = SectionSpec::new("Market Overview");
        assert_eq!(section.effective_keywords(), vec!["market", "overview"]);

        let section = SectionSpec::with_keywords("Weather", &["Forecast", "Temp"]);
        assert_eq!(section.effective_keywords(), vec!["forecast", "temp"]);
    }

    #[test]
    fn test_compile_rejects_bad_regex() {
        let mut contract = OutputContract::new("daily digest");
        contract.required_patterns = vec!["(unclosed".to_string()];
        assert!(matches!(
            contract.compile(),
            Err(DomainError::InvalidContract { .. })
        ));
    }

    #[test]
    fn test_compile_rejects_inverted_bounds() {
        let mut contract = OutputContract::new("daily digest");
        contract.length_bounds = LengthBounds { min: 500, max: 100 };
        assert!(contract.compile().is_err());
    }

    #[test]
    fn test_compile_rejects_order_with_unknown_section() {
        let mut contract = OutputContract::new("daily digest");
        contract.required_sections = vec![SectionSpec::new("summary")];
        contract.section_order = Some(vec!["summary".into(), "outlook".into()]);
        assert!(contract.compile().is_err());
    }

    #[test]
    fn test_evolve_bumps_version_and_replaces_examples() {
        let mut contract = OutputContract::new("daily digest");
        contract.reference_examples = vec!["old".to_string()];
        contract.evolve(ContractEvolution {
            reference_examples: Some(vec!["new".to_string()]),
            ..Default::default()
        });
        assert_eq!(contract.version, 2);
        assert_eq!(contract.reference_examples, vec!["new".to_string()]);
        assert!(contract.required_sections.is_empty());
    }
}
