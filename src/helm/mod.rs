//! Helm chart rendering: chart + profile tarballs in, ordered resource
//! templates out.

pub mod archive;
pub mod engine;
pub mod kind_sort;
pub mod manifest;
pub mod profile;
pub mod values;

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use thiserror::Error;

pub use engine::{HelmCli, TemplateEngine, TemplateRequest};
pub use manifest::{Gvk, ResourceTemplate};

pub const DEFAULT_PROFILE_MANIFEST: &str = "manifest.yaml";
const MERGED_VALUES_FILE: &str = "orkestra-values.yaml";
const MAX_RELEASE_NAME_LEN: usize = 53;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("chart invalid: {0}")]
    ChartInvalid(String),

    #[error("profile invalid: {0}")]
    ProfileInvalid(String),

    #[error("template rendering failed: {0}")]
    RenderFailed(String),

    #[error("scratch disk operation failed: {0}")]
    DiskFailed(#[from] std::io::Error),
}

/// Inputs for one render call.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub app_archive: &'a [u8],
    pub profile_archive: &'a [u8],
    /// `--set` style overrides, applied last.
    pub overrides: &'a [String],
    pub app_name: &'a str,
    pub namespace: &'a str,
    pub release_name: &'a str,
}

/// Renders an app chart with its profile applied.
///
/// Each call works in its own scratch directories, which are removed when
/// the call returns, whatever the outcome.
pub struct HelmRenderer {
    engine: Arc<dyn TemplateEngine>,
    profile_manifest: String,
}

impl HelmRenderer {
    pub fn new(engine: Arc<dyn TemplateEngine>) -> Self {
        Self {
            engine,
            profile_manifest: DEFAULT_PROFILE_MANIFEST.to_string(),
        }
    }

    pub fn with_profile_manifest(mut self, file_name: impl Into<String>) -> Self {
        self.profile_manifest = file_name.into();
        self
    }

    pub async fn render(&self, req: &RenderRequest<'_>) -> Result<Vec<ResourceTemplate>, RenderError> {
        validate_release_name(req.release_name)?;
        let namespace = if req.namespace.is_empty() {
            "default"
        } else {
            req.namespace
        };

        let chart_scratch = tempfile::Builder::new().prefix("orkestra-chart-").tempdir()?;
        let profile_scratch = tempfile::Builder::new().prefix("orkestra-profile-").tempdir()?;

        archive::unpack(req.app_archive, chart_scratch.path())
            .await
            .map_err(|e| RenderError::ChartInvalid(format!("app archive for {}: {e}", req.app_name)))?;
        archive::unpack(req.profile_archive, profile_scratch.path())
            .await
            .map_err(|e| RenderError::ProfileInvalid(format!("profile archive for {}: {e}", req.app_name)))?;

        let chart_dir = locate_chart(chart_scratch.path(), req.app_name)?;
        check_installable(&chart_dir)?;

        let (profile, profile_base) =
            profile::load_manifest(profile_scratch.path(), &self.profile_manifest)?;
        profile::overlay(&profile, &profile_base, chart_scratch.path())?;

        let profile_values = profile::values_path(&profile, &profile_base)?;
        let merged = values::merge_values(
            &chart_dir.join("values.yaml"),
            profile_values.as_deref(),
            req.overrides,
        )?;
        let values_file = profile_scratch.path().join(MERGED_VALUES_FILE);
        let encoded = serde_yaml::to_string(&merged)
            .map_err(|e| RenderError::RenderFailed(format!("encoding merged values: {e}")))?;
        tokio::fs::write(&values_file, encoded).await?;

        let rendered = self
            .engine
            .template(&TemplateRequest {
                release: req.release_name,
                chart_dir: &chart_dir,
                values_file: &values_file,
                namespace,
            })
            .await?;

        let docs = manifest::split_manifest(&rendered);
        let mut templates = manifest::parse_documents(&docs)?;
        kind_sort::sort_by_install_order(&mut templates);

        tracing::debug!(
            app = req.app_name,
            release = req.release_name,
            resources = templates.len(),
            "Rendered chart"
        );
        Ok(templates)
    }
}

fn release_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("static regex"))
}

/// Release names must be DNS-1123 labels short enough for Helm.
pub fn validate_release_name(name: &str) -> Result<(), RenderError> {
    if name.len() > MAX_RELEASE_NAME_LEN || !release_name_pattern().is_match(name) {
        return Err(RenderError::RenderFailed(format!(
            "release name {name:?} is not a valid DNS-1123 label"
        )));
    }
    Ok(())
}

/// `<root>/<app>` when it holds a chart, else the only chart directory
/// directly under `root`, else `root` itself.
fn locate_chart(root: &Path, app_name: &str) -> Result<PathBuf, RenderError> {
    let named = root.join(app_name);
    if named.join("Chart.yaml").is_file() {
        return Ok(named);
    }

    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() && path.join("Chart.yaml").is_file() {
            candidates.push(path);
        }
    }
    if candidates.len() == 1 {
        return Ok(candidates.remove(0));
    }
    if root.join("Chart.yaml").is_file() {
        return Ok(root.to_path_buf());
    }
    Err(RenderError::ChartInvalid(format!(
        "no Chart.yaml found for app {app_name}"
    )))
}

#[derive(serde::Deserialize)]
struct ChartMeta {
    #[serde(rename = "type", default)]
    chart_type: String,
}

fn check_installable(chart_dir: &Path) -> Result<(), RenderError> {
    let raw = std::fs::read_to_string(chart_dir.join("Chart.yaml"))?;
    let meta: ChartMeta = serde_yaml::from_str(&raw)
        .map_err(|e| RenderError::ChartInvalid(format!("Chart.yaml: {e}")))?;
    match meta.chart_type.as_str() {
        "" | "application" => Ok(()),
        other => Err(RenderError::ChartInvalid(format!(
            "chart type {other:?} is not installable"
        ))),
    }
}
