use std::fmt;

use serde::{Deserialize, Serialize};

use crate::store::StoreKey;

/// Key field names. Each entity key extends its parent's.
pub mod fields {
    pub const PROJECT: &str = "project";
    pub const COMPOSITE_APP: &str = "compositeApp";
    pub const VERSION: &str = "compositeAppVersion";
    pub const APP: &str = "app";
    pub const COMPOSITE_PROFILE: &str = "compositeProfile";
    pub const APP_PROFILE: &str = "appProfile";
    pub const DIG: &str = "deploymentIntentGroup";
    pub const GENERIC_PLACEMENT_INTENT: &str = "genericPlacementIntent";
    pub const APP_INTENT: &str = "appIntent";
    pub const CONTROLLER: &str = "controller";
    pub const PROVIDER: &str = "provider";
    pub const CLUSTER: &str = "cluster";
    pub const LOGICAL_CLOUD: &str = "logicalCloud";
}

/// `(project, compositeApp, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeAppRef {
    pub project: String,
    pub composite_app: String,
    pub version: String,
}

impl CompositeAppRef {
    pub fn new(project: impl Into<String>, composite_app: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            composite_app: composite_app.into(),
            version: version.into(),
        }
    }

    pub fn key(&self) -> StoreKey {
        project_key(&self.project)
            .with(fields::COMPOSITE_APP, &self.composite_app)
            .with(fields::VERSION, &self.version)
    }

    pub fn dig(&self, name: impl Into<String>) -> DigRef {
        DigRef {
            project: self.project.clone(),
            composite_app: self.composite_app.clone(),
            version: self.version.clone(),
            dig: name.into(),
        }
    }
}

impl fmt::Display for CompositeAppRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.composite_app, self.version)
    }
}

/// `(project, compositeApp, version, deploymentIntentGroup)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigRef {
    pub project: String,
    pub composite_app: String,
    pub version: String,
    pub dig: String,
}

impl DigRef {
    pub fn new(
        project: impl Into<String>,
        composite_app: impl Into<String>,
        version: impl Into<String>,
        dig: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            composite_app: composite_app.into(),
            version: version.into(),
            dig: dig.into(),
        }
    }

    pub fn composite_app(&self) -> CompositeAppRef {
        CompositeAppRef::new(&self.project, &self.composite_app, &self.version)
    }

    pub fn key(&self) -> StoreKey {
        self.composite_app().key().with(fields::DIG, &self.dig)
    }
}

impl fmt::Display for DigRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.project, self.composite_app, self.version, self.dig)
    }
}

pub fn project_key(project: &str) -> StoreKey {
    StoreKey::new().with(fields::PROJECT, project)
}

pub fn app_key(ca: &CompositeAppRef, app: &str) -> StoreKey {
    ca.key().with(fields::APP, app)
}

pub fn composite_profile_key(ca: &CompositeAppRef, profile: &str) -> StoreKey {
    ca.key().with(fields::COMPOSITE_PROFILE, profile)
}

pub fn app_profile_key(ca: &CompositeAppRef, profile: &str, app_profile: &str) -> StoreKey {
    composite_profile_key(ca, profile).with(fields::APP_PROFILE, app_profile)
}

pub fn generic_placement_intent_key(dig: &DigRef, intent: &str) -> StoreKey {
    dig.key().with(fields::GENERIC_PLACEMENT_INTENT, intent)
}

pub fn app_intent_key(dig: &DigRef, intent: &str, app_intent: &str) -> StoreKey {
    generic_placement_intent_key(dig, intent).with(fields::APP_INTENT, app_intent)
}

pub fn controller_key(name: &str) -> StoreKey {
    StoreKey::new().with(fields::CONTROLLER, name)
}

pub fn cluster_key(provider: &str, cluster: &str) -> StoreKey {
    StoreKey::new()
        .with(fields::PROVIDER, provider)
        .with(fields::CLUSTER, cluster)
}

pub fn logical_cloud_key(project: &str, name: &str) -> StoreKey {
    project_key(project).with(fields::LOGICAL_CLOUD, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_keys_extend_parent_keys() {
        let dig = DigRef::new("p", "ca", "v1", "dig");
        let gpi = generic_placement_intent_key(&dig, "gpi");
        let ai = app_intent_key(&dig, "gpi", "web-intent");
        assert_eq!(dig.key().arity(), 4);
        assert_eq!(gpi.arity(), 5);
        assert_eq!(ai.arity(), 6);
        for (field, value) in dig.key().bound_fields() {
            assert_eq!(ai.get(field), Some(value));
        }
    }

    #[test]
    fn test_refs_display() {
        let dig = DigRef::new("p", "ca", "v1", "dig");
        assert_eq!(dig.to_string(), "p/ca/v1/dig");
        assert_eq!(dig.composite_app().dig("other").dig, "other");
    }
}
