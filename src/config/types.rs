use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::registry::DEFAULT_MAX_BLOB_BYTES;

// ─── Top-Level Config ───────────────────────────────────────────────────────

/// Orchestrator configuration. Every field has a default, so an empty or
/// missing file yields a usable config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrchestratorConfig {
    #[serde(default = "default_service_port")]
    pub service_port: u16,
    #[serde(default = "default_database")]
    pub database: StoreConfig,
    #[serde(default = "default_context_store")]
    pub context_store: StoreConfig,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub helm: HelmConfig,
    #[serde(default = "default_max_blob_bytes")]
    pub max_blob_bytes: u64,
    /// Registry name of the controller that reconciles contexts.
    #[serde(default = "default_sync_controller")]
    pub sync_controller: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            service_port: default_service_port(),
            database: default_database(),
            context_store: default_context_store(),
            tls: None,
            rpc: RpcConfig::default(),
            helm: HelmConfig::default(),
            max_blob_bytes: default_max_blob_bytes(),
            sync_controller: default_sync_controller(),
        }
    }
}

impl OrchestratorConfig {
    /// TLS is on only when both the certificate and the key are configured.
    pub fn tls_enabled(&self) -> bool {
        self.tls
            .as_ref()
            .is_some_and(|t| t.server_cert.is_some() && t.server_key.is_some())
    }
}

// ─── Stores ─────────────────────────────────────────────────────────────────

/// A SQLite-backed store location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TlsConfig {
    #[serde(default)]
    pub ca_file: Option<String>,
    #[serde(default)]
    pub server_cert: Option<String>,
    #[serde(default)]
    pub server_key: Option<String>,
}

// ─── Sub-controller RPC ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RpcConfig {
    /// Per-call deadline for every sub-controller RPC.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Delay before a dropped readiness stream is re-opened.
    #[serde(default = "default_backoff_secs")]
    pub ready_notify_backoff_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            ready_notify_backoff_secs: default_backoff_secs(),
        }
    }
}

impl RpcConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn ready_notify_backoff(&self) -> Duration {
        Duration::from_secs(self.ready_notify_backoff_secs)
    }
}

// ─── Helm ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HelmConfig {
    #[serde(default = "default_helm_binary")]
    pub binary: String,
    /// File name of the manifest inside every profile archive.
    #[serde(default = "default_profile_manifest")]
    pub profile_manifest: String,
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            binary: default_helm_binary(),
            profile_manifest: default_profile_manifest(),
        }
    }
}

fn default_service_port() -> u16 {
    9015
}

fn default_database() -> StoreConfig {
    StoreConfig {
        path: "orkestra.db".to_string(),
    }
}

fn default_context_store() -> StoreConfig {
    StoreConfig {
        path: "orkestra-context.db".to_string(),
    }
}

fn default_max_blob_bytes() -> u64 {
    DEFAULT_MAX_BLOB_BYTES
}

fn default_sync_controller() -> String {
    "rsync".to_string()
}

fn default_deadline_secs() -> u64 {
    600
}

fn default_backoff_secs() -> u64 {
    5
}

fn default_helm_binary() -> String {
    "helm".to_string()
}

fn default_profile_manifest() -> String {
    crate::helm::DEFAULT_PROFILE_MANIFEST.to_string()
}
