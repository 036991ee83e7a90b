//! Multi-document YAML bundles of registry entities.
//!
//! Every document names its entity with `kind:` and its parent with the
//! scope keys (`project`, `compositeApp`, `version`, `dig`,
//! `compositeProfile`, `placementIntent`). App and AppProfile documents
//! point at their tarball with `file:`, relative to the bundle.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::OrchError;
use crate::registry::{
    App, AppIntent, AppProfile, ClusterRecord, CompositeApp, CompositeAppRef, CompositeProfile, Controller,
    DeploymentIntentGroup, DigIntents, DigRef, GenericPlacementIntent, LogicalCloud, Project, Registry,
};

/// Parent keys and file references shared by every document kind.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Scope {
    #[serde(default)]
    project: String,
    #[serde(default)]
    composite_app: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    dig: String,
    #[serde(default)]
    composite_profile: String,
    #[serde(default)]
    placement_intent: String,
    #[serde(default)]
    file: String,
}

impl Scope {
    fn project(&self) -> Result<&str> {
        if self.project.is_empty() {
            bail!("missing `project`");
        }
        Ok(&self.project)
    }

    fn composite_app(&self) -> Result<CompositeAppRef> {
        if self.composite_app.is_empty() || self.version.is_empty() {
            bail!("missing `compositeApp` or `version`");
        }
        Ok(CompositeAppRef::new(self.project()?, &self.composite_app, &self.version))
    }

    fn dig(&self) -> Result<DigRef> {
        if self.dig.is_empty() {
            bail!("missing `dig`");
        }
        Ok(self.composite_app()?.dig(&self.dig))
    }

    fn named<'a>(&'a self, field: &str, value: &'a str) -> Result<&'a str> {
        if value.is_empty() {
            bail!("missing `{field}`");
        }
        Ok(value)
    }
}

/// One parsed bundle document.
#[derive(Debug)]
pub struct BundleDoc {
    pub kind: String,
    scope: Scope,
    body: serde_yaml::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    /// The entity was already there and was left untouched.
    Exists,
}

/// Result of applying one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub kind: String,
    pub name: String,
    pub outcome: Outcome,
}

impl fmt::Display for Applied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

/// Split `content` into documents, skipping empty ones.
pub fn parse_bundle(content: &str) -> Result<Vec<BundleDoc>> {
    let mut docs = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let body = serde_yaml::Value::deserialize(document)
            .with_context(|| format!("document {}: invalid YAML", index + 1))?;
        if body.is_null() {
            continue;
        }
        let kind = body
            .get("kind")
            .and_then(|k| k.as_str())
            .with_context(|| format!("document {}: missing `kind`", index + 1))?
            .to_string();
        let scope: Scope = serde_yaml::from_value(body.clone())
            .with_context(|| format!("document {} ({kind}): invalid scope keys", index + 1))?;
        docs.push(BundleDoc { kind, scope, body });
    }
    Ok(docs)
}

/// Applies bundle documents to a registry in file order.
pub struct BundleApplier<'a> {
    registry: &'a Registry,
    base_dir: PathBuf,
}

impl<'a> BundleApplier<'a> {
    /// `base_dir` anchors the `file:` references.
    pub fn new(registry: &'a Registry, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            base_dir: base_dir.into(),
        }
    }

    /// Read and apply the bundle at `path`, resolving files next to it.
    pub async fn apply_file(registry: &Registry, path: &Path) -> Result<Vec<Applied>> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read bundle: {}", path.display()))?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        BundleApplier::new(registry, base).apply_all(&parse_bundle(&content)?).await
    }

    pub async fn apply_all(&self, docs: &[BundleDoc]) -> Result<Vec<Applied>> {
        let mut applied = Vec::with_capacity(docs.len());
        for (index, doc) in docs.iter().enumerate() {
            let result = self
                .apply(doc)
                .await
                .with_context(|| format!("document {} ({})", index + 1, doc.kind))?;
            tracing::info!(kind = %result.kind, name = %result.name, outcome = ?result.outcome, "Applied");
            applied.push(result);
        }
        Ok(applied)
    }

    async fn apply(&self, doc: &BundleDoc) -> Result<Applied> {
        let s = &doc.scope;
        let r = self.registry;
        let (name, created) = match doc.kind.as_str() {
            "Project" => {
                let p: Project = body(doc)?;
                (p.metadata.name.clone(), r.projects.create_project(&p).await.map(|_| ()))
            }
            "CompositeApp" => {
                let ca: CompositeApp = body(doc)?;
                let project = s.project()?;
                (ca.metadata.name.clone(), r.composite_apps.create_composite_app(project, &ca).await.map(|_| ()))
            }
            "App" => {
                let app: App = body(doc)?;
                let chart = self.read_file(s).await?;
                let ca = s.composite_app()?;
                (app.metadata.name.clone(), r.apps.create_app(&ca, &app, &chart).await.map(|_| ()))
            }
            "CompositeProfile" => {
                let cp: CompositeProfile = body(doc)?;
                let ca = s.composite_app()?;
                (
                    cp.metadata.name.clone(),
                    r.composite_profiles.create_composite_profile(&ca, &cp).await.map(|_| ()),
                )
            }
            "AppProfile" => {
                let ap: AppProfile = body(doc)?;
                let content = self.read_file(s).await?;
                let ca = s.composite_app()?;
                let profile = s.named("compositeProfile", &s.composite_profile)?;
                (
                    ap.metadata.name.clone(),
                    r.app_profiles.create_app_profile(&ca, profile, &ap, &content).await.map(|_| ()),
                )
            }
            "DeploymentIntentGroup" => {
                let dig: DeploymentIntentGroup = body(doc)?;
                let ca = s.composite_app()?;
                (dig.metadata.name.clone(), r.digs.create_dig(&ca, &dig).await.map(|_| ()))
            }
            "GenericPlacementIntent" => {
                let gpi: GenericPlacementIntent = body(doc)?;
                let dig = s.dig()?;
                (
                    gpi.metadata.name.clone(),
                    r.placement_intents.create_generic_placement_intent(&dig, &gpi).await.map(|_| ()),
                )
            }
            "AppIntent" => {
                let ai: AppIntent = body(doc)?;
                let dig = s.dig()?;
                let intent = s.named("placementIntent", &s.placement_intent)?;
                (ai.metadata.name.clone(), r.app_intents.create_app_intent(&dig, intent, &ai).await.map(|_| ()))
            }
            "DigIntents" => {
                let intents: DigIntents = body(doc)?;
                let dig = s.dig()?;
                r.digs.set_intents(&dig, &intents).await?;
                return Ok(Applied {
                    kind: doc.kind.clone(),
                    name: dig.dig,
                    outcome: Outcome::Created,
                });
            }
            "Controller" => {
                let c: Controller = body(doc)?;
                (c.name().to_string(), r.controllers.create_controller(&c).await.map(|_| ()))
            }
            "Cluster" => {
                let c: ClusterRecord = body(doc)?;
                r.clusters.put_cluster(&c).await?;
                return Ok(Applied {
                    kind: doc.kind.clone(),
                    name: format!("{}/{}", c.provider, c.name),
                    outcome: Outcome::Created,
                });
            }
            "LogicalCloud" => {
                let lc: LogicalCloud = body(doc)?;
                r.logical_clouds.put_logical_cloud(s.project()?, &lc).await?;
                return Ok(Applied {
                    kind: doc.kind.clone(),
                    name: lc.metadata.name.clone(),
                    outcome: Outcome::Created,
                });
            }
            other => bail!("unknown kind {other:?}"),
        };

        let outcome = match created {
            Ok(()) => Outcome::Created,
            Err(OrchError::Conflict(_)) => Outcome::Exists,
            Err(e) => return Err(e.into()),
        };
        Ok(Applied {
            kind: doc.kind.clone(),
            name,
            outcome,
        })
    }

    async fn read_file(&self, scope: &Scope) -> Result<Vec<u8>> {
        let rel = scope.named("file", &scope.file)?;
        let path = self.base_dir.join(rel);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }
}

fn body<T: DeserializeOwned>(doc: &BundleDoc) -> Result<T> {
    serde_yaml::from_value(doc.body.clone()).with_context(|| format!("invalid {} body", doc.kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_empty_documents() {
        let docs = parse_bundle(
            "---\nkind: Project\nmetadata:\n  name: p1\n---\n---\nkind: CompositeApp\nproject: p1\nmetadata:\n  name: ca\nspec:\n  version: v1\n",
        )
        .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].kind, "CompositeApp");
        assert_eq!(docs[1].scope.project, "p1");
    }

    #[test]
    fn test_missing_kind_is_an_error() {
        let err = parse_bundle("metadata:\n  name: p1\n").unwrap_err();
        assert!(err.to_string().contains("missing `kind`"));
    }

    #[test]
    fn test_scope_requires_parents() {
        let scope = Scope {
            project: "p1".into(),
            ..Default::default()
        };
        assert!(scope.composite_app().is_err());
        assert!(scope.dig().is_err());
        assert_eq!(scope.project().unwrap(), "p1");
    }
}
