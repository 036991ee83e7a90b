use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use super::types::OrchestratorConfig;

pub const ENV_SERVICE_PORT: &str = "ORKESTRA_SERVICE_PORT";
pub const ENV_DB_PATH: &str = "ORKESTRA_DB_PATH";
pub const ENV_CONTEXT_DB_PATH: &str = "ORKESTRA_CONTEXT_DB_PATH";
pub const ENV_HELM_BINARY: &str = "ORKESTRA_HELM_BINARY";

const DEFAULT_ENDPOINT_HOST: &str = "localhost";
const DEFAULT_ENDPOINT_PORT: u16 = 9048;

/// Load the config file at `path`, then apply `ORKESTRA_*` overrides from
/// the environment. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    let config = if path.is_file() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        OrchestratorConfig::default()
    };

    let config = apply_overrides(config, |key| std::env::var(key).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Parse YAML (or JSON) content. Empty content is the default config.
pub fn parse_config(content: &str) -> Result<OrchestratorConfig> {
    if content.trim().is_empty() {
        return Ok(OrchestratorConfig::default());
    }
    let config: OrchestratorConfig =
        serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;
    Ok(config)
}

/// Apply environment overrides read through `lookup`.
pub fn apply_overrides<F>(mut config: OrchestratorConfig, lookup: F) -> Result<OrchestratorConfig>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup(ENV_SERVICE_PORT) {
        config.service_port = port
            .trim()
            .parse()
            .with_context(|| format!("{ENV_SERVICE_PORT}={port:?} is not a port number"))?;
    }
    if let Some(path) = lookup(ENV_DB_PATH) {
        config.database.path = path;
    }
    if let Some(path) = lookup(ENV_CONTEXT_DB_PATH) {
        config.context_store.path = path;
    }
    if let Some(binary) = lookup(ENV_HELM_BINARY) {
        config.helm.binary = binary;
    }
    Ok(config)
}

/// Reject settings the orchestrator cannot start with.
pub fn validate_config(config: &OrchestratorConfig) -> Result<()> {
    if config.service_port == 0 {
        bail!("service-port must be non-zero");
    }
    if config.rpc.deadline_secs == 0 {
        bail!("rpc.deadline-secs must be non-zero");
    }
    if config.max_blob_bytes == 0 {
        bail!("max-blob-bytes must be non-zero");
    }
    if config.sync_controller.trim().is_empty() {
        bail!("sync-controller must name a controller");
    }
    if let Some(tls) = &config.tls {
        if tls.server_cert.is_some() != tls.server_key.is_some() {
            bail!("tls needs both server-cert and server-key, or neither");
        }
    }
    Ok(())
}

// ─── Service endpoints ──────────────────────────────────────────────────────

/// Host and port of a sub-controller, derived from the environment when the
/// registry has no row for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub host: String,
    pub port: u16,
}

impl ServiceEndpoint {
    /// Reads `<NAME>_SERVICE_HOST` and `<NAME>_SERVICE_PORT`.
    pub fn from_env(name: &str) -> Self {
        Self::from_lookup(name, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(name: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = name.to_uppercase().replace('-', "_");
        let host = lookup(&format!("{prefix}_SERVICE_HOST"))
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT_HOST.to_string());
        let port = lookup(&format!("{prefix}_SERVICE_PORT"))
            .and_then(|p| p.trim().parse().ok())
            .filter(|p| *p != 0)
            .unwrap_or(DEFAULT_ENDPOINT_PORT);
        Self { host, port }
    }

    pub fn uri(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_empty_content_is_default() {
        let config = parse_config("").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.service_port, 9015);
        assert_eq!(config.rpc.deadline_secs, 600);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = parse_config(
            "service-port: 9100\nrpc:\n  ready-notify-backoff-secs: 1\nhelm:\n  binary: /opt/helm\n",
        )
        .unwrap();
        assert_eq!(config.service_port, 9100);
        assert_eq!(config.rpc.ready_notify_backoff_secs, 1);
        assert_eq!(config.rpc.deadline_secs, 600);
        assert_eq!(config.helm.binary, "/opt/helm");
        assert_eq!(config.helm.profile_manifest, "manifest.yaml");
        assert_eq!(config.database.path, "orkestra.db");
    }

    #[test]
    fn test_env_overrides() {
        let config = apply_overrides(
            OrchestratorConfig::default(),
            env(&[(ENV_SERVICE_PORT, "9200"), (ENV_DB_PATH, "/tmp/x.db")]),
        )
        .unwrap();
        assert_eq!(config.service_port, 9200);
        assert_eq!(config.database.path, "/tmp/x.db");
        assert_eq!(config.context_store.path, "orkestra-context.db");

        assert!(apply_overrides(OrchestratorConfig::default(), env(&[(ENV_SERVICE_PORT, "web")])).is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = OrchestratorConfig::default();
        assert!(validate_config(&config).is_ok());

        config.rpc.deadline_secs = 0;
        assert!(validate_config(&config).is_err());

        let mut config = OrchestratorConfig::default();
        config.tls = Some(crate::config::types::TlsConfig {
            server_cert: Some("cert.pem".into()),
            ..Default::default()
        });
        assert!(validate_config(&config).is_err());
        assert!(!config.tls_enabled());
    }

    #[test]
    fn test_service_endpoint_from_env() {
        let ep = ServiceEndpoint::from_lookup(
            "rsync",
            env(&[("RSYNC_SERVICE_HOST", "rsync.svc"), ("RSYNC_SERVICE_PORT", "9031")]),
        );
        assert_eq!(ep.uri(), "http://rsync.svc:9031");

        let ep = ServiceEndpoint::from_lookup("hpa-placement", env(&[("HPA_PLACEMENT_SERVICE_PORT", "x")]));
        assert_eq!(ep, ServiceEndpoint { host: "localhost".into(), port: 9048 });
    }
}
