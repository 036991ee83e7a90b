use std::fmt;

use serde::{Deserialize, Serialize};

/// Metadata written at the composite-app node of every context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeAppMeta {
    pub project: String,
    pub composite_app: String,
    pub version: String,
    pub release: String,
    pub deployment_intent_group: String,
    pub namespace: String,
    pub level: String,
    #[serde(default)]
    pub logical_cloud: String,
}

/// Lifecycle status of a whole context, written by the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextStatus {
    Created,
    Instantiating,
    Instantiated,
    InstantiateFailed,
    Terminating,
    Terminated,
    TerminateFailed,
    Updating,
    Updated,
    UpdateFailed,
}

impl fmt::Display for ContextStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Per-resource sync status; resources nobody has reported on are `Pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceStatus {
    #[default]
    Pending,
    Applied,
    Failed,
    Retrying,
    Deleted,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Wrapper used for every `status/` level value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StatusRecord<T> {
    pub status: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionKind {
    Order,
    Dependency,
}

impl InstructionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionKind::Order => "order",
            InstructionKind::Dependency => "dependency",
        }
    }
}

/// Group tag stored on every cluster node. `group` is empty for mandatory
/// clusters; `seq` preserves registration order inside the app.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct ClusterMeta {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub seq: u64,
}

/// Latest cluster-side snapshot published by the sync engine: resource
/// context name (`name+Kind`) → observed status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub resources: std::collections::BTreeMap<String, String>,
}
