//! Fixture corpus management: curated additions, promotion of live captures,
//! demotion, and bulk import.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Difficulty, Fixture, Provenance};
use crate::domain::ports::{CaptureRepository, FixtureRepository};

/// A fixture as written by hand or in an import file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureSpec {
    pub key: String,
    pub input: String,
    #[serde(alias = "expected")]
    pub expected_output: String,
    pub category: String,
    #[serde(default)]
    pub difficulty: Difficulty,
}

/// Import files hold either a bare list or a `fixtures:` document.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FixtureFile {
    List(Vec<FixtureSpec>),
    Document { fixtures: Vec<FixtureSpec> },
}

impl FixtureFile {
    fn into_specs(self) -> Vec<FixtureSpec> {
        match self {
            Self::List(specs) | Self::Document { fixtures: specs } => specs,
        }
    }
}

/// Options for turning a capture into a fixture.
#[derive(Debug, Clone, Default)]
pub struct Promotion {
    pub key: String,
    pub category: String,
    pub difficulty: Difficulty,
    /// Corrected expectation; the produced output is used when unset.
    pub expected_output: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    /// Keys already present in the corpus.
    pub skipped: Vec<String>,
    /// `key: reason` for entries that failed validation.
    pub invalid: Vec<String>,
}

pub struct FixtureService {
    fixtures: Arc<dyn FixtureRepository>,
    captures: Arc<dyn CaptureRepository>,
}

impl FixtureService {
    pub fn new(fixtures: Arc<dyn FixtureRepository>, captures: Arc<dyn CaptureRepository>) -> Self {
        Self { fixtures, captures }
    }

    async fn ensure_key_free(&self, key: &str) -> DomainResult<()> {
        if self.fixtures.get_by_key(key).await?.is_some() {
            return Err(DomainError::ValidationFailed(format!(
                "fixture key '{key}' already exists"
            )));
        }
        Ok(())
    }

    pub async fn add(&self, spec: FixtureSpec) -> DomainResult<Fixture> {
        self.ensure_key_free(&spec.key).await?;
        let fixture = Fixture::new(
            spec.key,
            spec.input,
            spec.expected_output,
            spec.category,
            spec.difficulty,
            Provenance::Curated,
        )?;
        self.fixtures.create(&fixture).await?;
        tracing::info!(fixture_id = %fixture.id, key = %fixture.key, "Fixture added");
        Ok(fixture)
    }

    /// Promote a live capture into the corpus and link the two.
    pub async fn promote_capture(
        &self,
        capture_id: Uuid,
        promotion: Promotion,
    ) -> DomainResult<Fixture> {
        let capture = self
            .captures
            .get(capture_id)
            .await?
            .ok_or(DomainError::CaptureNotFound(capture_id))?;
        if capture.promoted {
            return Err(DomainError::ValidationFailed(format!(
                "capture {capture_id} was already promoted"
            )));
        }
        self.ensure_key_free(&promotion.key).await?;

        let expected = promotion
            .expected_output
            .unwrap_or_else(|| capture.produced_output.clone());
        let fixture = Fixture::new(
            promotion.key,
            capture.input,
            expected,
            promotion.category,
            promotion.difficulty,
            Provenance::Capture { capture_id },
        )?;
        self.fixtures.create(&fixture).await?;
        self.captures.link_fixture(capture_id, fixture.id).await?;

        tracing::info!(
            fixture_id = %fixture.id,
            key = %fixture.key,
            capture_id = %capture_id,
            "Capture promoted to fixture"
        );
        Ok(fixture)
    }

    pub async fn get_by_key(&self, key: &str) -> DomainResult<Fixture> {
        self.fixtures
            .get_by_key(key)
            .await?
            .ok_or_else(|| DomainError::FixtureKeyNotFound(key.to_string()))
    }

    pub async fn list(&self, active_only: bool) -> DomainResult<Vec<Fixture>> {
        self.fixtures.list(active_only).await
    }

    /// Take a fixture out of regression runs. Its history is kept.
    pub async fn demote(&self, key: &str) -> DomainResult<Fixture> {
        self.set_active(key, false).await
    }

    pub async fn reactivate(&self, key: &str) -> DomainResult<Fixture> {
        self.set_active(key, true).await
    }

    async fn set_active(&self, key: &str, active: bool) -> DomainResult<Fixture> {
        let mut fixture = self.get_by_key(key).await?;
        if fixture.active != active {
            self.fixtures.set_active(fixture.id, active).await?;
            fixture.active = active;
            tracing::info!(key, active, "Fixture activation changed");
        }
        Ok(fixture)
    }

    /// Import fixtures from a JSON or YAML file. Existing keys are skipped.
    pub async fn import_file(&self, path: &Path) -> DomainResult<ImportSummary> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            DomainError::ValidationFailed(format!("cannot read {}: {e}", path.display()))
        })?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );
        let specs = parse_fixture_file(&raw, is_yaml)?;
        self.import(specs, &path.display().to_string()).await
    }

    pub async fn import(
        &self,
        specs: Vec<FixtureSpec>,
        source: &str,
    ) -> DomainResult<ImportSummary> {
        let mut summary = ImportSummary::default();
        for spec in specs {
            if self.fixtures.get_by_key(&spec.key).await?.is_some() {
                summary.skipped.push(spec.key);
                continue;
            }
            let key = spec.key.clone();
            let fixture = match Fixture::new(
                spec.key,
                spec.input,
                spec.expected_output,
                spec.category,
                spec.difficulty,
                Provenance::Import {
                    source: source.to_string(),
                },
            ) {
                Ok(fixture) => fixture,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping invalid fixture");
                    summary.invalid.push(format!("{key}: {e}"));
                    continue;
                }
            };
            self.fixtures.create(&fixture).await?;
            summary.imported += 1;
        }
        tracing::info!(
            source,
            imported = summary.imported,
            skipped = summary.skipped.len(),
            invalid = summary.invalid.len(),
            "Fixture import finished"
        );
        Ok(summary)
    }
}

pub fn parse_fixture_file(raw: &str, yaml: bool) -> DomainResult<Vec<FixtureSpec>> {
    let file: FixtureFile = if yaml {
        serde_yaml::from_str(raw).map_err(|e| DomainError::SerializationError(e.to_string()))?
    } else {
        serde_json::from_str(raw)?
    };
    Ok(file.into_specs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteCaptureRepository, SqliteFixtureRepository,
    };
    use crate::domain::models::{Capture, QualityFlags};

    async fn setup() -> (FixtureService, Arc<SqliteCaptureRepository>) {
        let pool = create_migrated_test_pool().await.unwrap();
        let captures = Arc::new(SqliteCaptureRepository::new(pool.clone()));
        let fixtures = Arc::new(SqliteFixtureRepository::new(pool));
        (FixtureService::new(fixtures, captures.clone()), captures)
    }

    fn spec(key: &str) -> FixtureSpec {
        FixtureSpec {
            key: key.into(),
            input: "hi".into(),
            expected_output: "Hi there.".into(),
            category: "conversation".into(),
            difficulty: Difficulty::Easy,
        }
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let (service, _) = setup().await;
        service.add(spec("conv-001")).await.unwrap();
        let err = service.add(spec("conv-001")).await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_promote_capture_links_both_ways() {
        let (service, captures) = setup().await;
        let capture = Capture::new("summarize this", "A short summary.", QualityFlags::default());
        captures.insert(&capture).await.unwrap();

        let fixture = service
            .promote_capture(
                capture.id,
                Promotion {
                    key: "sum-001".into(),
                    category: "summary".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(fixture.expected_output, "A short summary.");
        assert_eq!(fixture.provenance, Provenance::Capture { capture_id: capture.id });

        let stored = captures.get(capture.id).await.unwrap().unwrap();
        assert!(stored.promoted);
        assert!(stored.reviewed);
        assert_eq!(stored.linked_fixture_id, Some(fixture.id));

        let again = service
            .promote_capture(
                capture.id,
                Promotion {
                    key: "sum-002".into(),
                    category: "summary".into(),
                    ..Default::default()
                },
            )
            .await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_promote_missing_capture() {
        let (service, _) = setup().await;
        let id = Uuid::new_v4();
        let err = service
            .promote_capture(id, Promotion::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::CaptureNotFound(found) if found == id));
    }

    #[tokio::test]
    async fn test_demote_keeps_fixture_out_of_active_list() {
        let (service, _) = setup().await;
        service.add(spec("conv-001")).await.unwrap();
        service.add(spec("conv-002")).await.unwrap();

        let demoted = service.demote("conv-002").await.unwrap();
        assert!(!demoted.active);
        let active = service.list(true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].key, "conv-001");
        assert_eq!(service.list(false).await.unwrap().len(), 2);

        assert!(matches!(
            service.demote("nope").await,
            Err(DomainError::FixtureKeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_import_yaml_skips_existing_and_invalid() {
        let (service, _) = setup().await;
        service.add(spec("conv-001")).await.unwrap();

        let yaml = r#"
fixtures:
  - key: conv-001
    input: hi
    expected: Hi there.
    category: conversation
  - key: conv-002
    input: thanks
    expected: You're welcome.
    category: conversation
    difficulty: easy
  - key: bad-001
    input: hello
    expected: ""
    category: conversation
"#;
        let specs = parse_fixture_file(yaml, true).unwrap();
        let summary = service.import(specs, "fixtures.yaml").await.unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.skipped, vec!["conv-001".to_string()]);
        assert_eq!(summary.invalid.len(), 1);
        assert!(summary.invalid[0].starts_with("bad-001"));
    }

    #[test]
    fn test_parse_json_list() {
        let json = r#"[{"key":"k","input":"i","expected_output":"o","category":"c"}]"#;
        let specs = parse_fixture_file(json, false).unwrap();
        assert_eq!(specs[0].difficulty, Difficulty::Medium);
    }
}
