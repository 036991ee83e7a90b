use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::placement::{ClusterRef, IntentStruc};

/// Common metadata block carried by every entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "userData1", default, skip_serializing_if = "String::is_empty")]
    pub user_data1: String,
    #[serde(rename = "userData2", default, skip_serializing_if = "String::is_empty")]
    pub user_data2: String,
}

impl Metadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Digest of an accepted tarball, recorded next to the metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    pub sha256: String,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeApp {
    pub metadata: Metadata,
    pub spec: CompositeAppSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeAppSpec {
    #[serde(alias = "compositeAppVersion")]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub metadata: Metadata,
    /// Filled in by the registry when the chart is stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<BlobInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeProfile {
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppProfile {
    pub metadata: Metadata,
    pub spec: AppProfileSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<BlobInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppProfileSpec {
    #[serde(alias = "app-name")]
    pub app: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericPlacementIntent {
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppIntent {
    pub metadata: Metadata,
    pub spec: AppIntentSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppIntentSpec {
    #[serde(alias = "app-name")]
    pub app: String,
    pub intent: IntentStruc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentIntentGroup {
    pub metadata: Metadata,
    pub spec: DigSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigSpec {
    /// Composite profile applied to every app.
    pub profile: String,
    /// Release version; also the Helm release name of every app.
    pub version: String,
    #[serde(rename = "logicalCloud", alias = "logical-cloud")]
    pub logical_cloud: String,
    #[serde(rename = "overrideValues", alias = "override-values", default, skip_serializing_if = "Vec::is_empty")]
    pub override_values: Vec<OverrideValues>,
}

/// Per-app `key=value` overrides applied last during rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideValues {
    #[serde(alias = "app-name")]
    pub app: String,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl DeploymentIntentGroup {
    /// Overrides for one app as `--set` expressions.
    pub fn overrides_for(&self, app: &str) -> Vec<String> {
        self.spec
            .override_values
            .iter()
            .filter(|o| o.app == app)
            .flat_map(|o| o.values.iter().map(|(k, v)| format!("{k}={v}")))
            .collect()
    }
}

/// Reserved intent-map key naming the DIG's generic placement intent.
pub const GENERIC_PLACEMENT_INTENT_KEY: &str = "genericPlacementIntent";

/// Controller name → controller intent name, attached to a DIG.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigIntents {
    pub intent: BTreeMap<String, String>,
}

impl DigIntents {
    pub fn generic_placement_intent(&self) -> Option<&str> {
        self.intent.get(GENERIC_PLACEMENT_INTENT_KEY).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerType {
    Placement,
    Action,
}

impl fmt::Display for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerType::Placement => f.write_str("placement"),
            ControllerType::Action => f.write_str("action"),
        }
    }
}

pub const MIN_CONTROLLER_PRIORITY: u32 = 1;
pub const MAX_CONTROLLER_PRIORITY: u32 = 1_000_000;

/// A registered sub-controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controller {
    pub metadata: Metadata,
    pub spec: ControllerSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSpec {
    pub host: String,
    /// Kept wider than u16 so out-of-range input reaches validation.
    pub port: u32,
    #[serde(rename = "type")]
    pub controller_type: ControllerType,
    pub priority: u32,
}

impl Controller {
    pub fn new(name: &str, host: &str, port: u32, controller_type: ControllerType, priority: u32) -> Self {
        Self {
            metadata: Metadata::named(name),
            spec: ControllerSpec {
                host: host.to_string(),
                port,
                controller_type,
                priority,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.spec.host, self.spec.port)
    }
}

/// A cluster known to the cluster registry, with its labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub provider: String,
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

pub const LOGICAL_CLOUD_READY: &str = "Instantiated";

/// Namespace and permission level applications are deployed into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalCloud {
    pub metadata: Metadata,
    pub spec: LogicalCloudSpec,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalCloudSpec {
    #[serde(default)]
    pub namespace: String,
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub clusters: Vec<ClusterRef>,
}

fn default_level() -> String {
    "1".to_string()
}

impl LogicalCloud {
    pub fn is_ready(&self) -> bool {
        self.status == LOGICAL_CLOUD_READY
    }

    pub fn contains(&self, cluster: &ClusterRef) -> bool {
        self.spec.clusters.iter().any(|c| c == cluster)
    }
}
