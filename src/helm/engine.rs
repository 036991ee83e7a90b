use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::RenderError;

/// Arguments for one template run.
#[derive(Debug, Clone, Copy)]
pub struct TemplateRequest<'a> {
    pub release: &'a str,
    pub chart_dir: &'a Path,
    /// Fully merged values file.
    pub values_file: &'a Path,
    pub namespace: &'a str,
}

/// Turns a chart directory plus values into a combined manifest.
#[async_trait]
pub trait TemplateEngine: Send + Sync {
    async fn template(&self, req: &TemplateRequest<'_>) -> Result<String, RenderError>;
}

/// Renders through the `helm` binary (`helm template`, client-side only,
/// CRDs included).
pub struct HelmCli {
    binary: PathBuf,
}

impl HelmCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(req: &TemplateRequest<'_>) -> Vec<String> {
        vec![
            "template".to_string(),
            req.release.to_string(),
            req.chart_dir.display().to_string(),
            "--namespace".to_string(),
            req.namespace.to_string(),
            "--include-crds".to_string(),
            "--values".to_string(),
            req.values_file.display().to_string(),
        ]
    }
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::new("helm")
    }
}

#[async_trait]
impl TemplateEngine for HelmCli {
    async fn template(&self, req: &TemplateRequest<'_>) -> Result<String, RenderError> {
        let args = Self::args(req);
        tracing::info!(binary = %self.binary.display(), args = ?args, "Running helm");

        let output = Command::new(&self.binary)
            .args(&args)
            .env("HELM_NAMESPACE", req.namespace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                RenderError::RenderFailed(format!("failed to run {}: {e}", self.binary.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            for line in stderr.lines() {
                tracing::debug!(stream = "stderr", "{}", line);
            }
            return Err(RenderError::RenderFailed(format!(
                "helm template exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
