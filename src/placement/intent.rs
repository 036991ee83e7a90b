use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{OrchError, Result};

/// Placement predicate tree attached to one app.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentStruc {
    #[serde(rename = "allOf", default, skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<AllOf>,
    #[serde(rename = "anyOf", default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<AnyOf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllOf {
    #[serde(
        rename = "providerName",
        alias = "provider-name",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub provider_name: String,
    #[serde(
        rename = "clusterName",
        alias = "cluster-name",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub cluster_name: String,
    #[serde(
        rename = "clusterLabel",
        alias = "cluster-label-name",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub cluster_label: String,
    #[serde(rename = "anyOf", default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<AnyOf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnyOf {
    #[serde(
        rename = "providerName",
        alias = "provider-name",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub provider_name: String,
    #[serde(
        rename = "clusterName",
        alias = "cluster-name",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub cluster_name: String,
    #[serde(
        rename = "clusterLabel",
        alias = "cluster-label-name",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub cluster_label: String,
}

/// A single predicate: one provider plus either a cluster name or a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Leaf<'a> {
    Named { provider: &'a str, cluster: &'a str },
    Labelled { provider: &'a str, label: &'a str },
}

pub(crate) fn leaf<'a>(provider: &'a str, cluster: &'a str, label: &'a str) -> Result<Leaf<'a>> {
    match (cluster.is_empty(), label.is_empty()) {
        (false, false) => Err(OrchError::validation(format!(
            "placement leaf sets both clusterName {cluster:?} and clusterLabel {label:?}"
        ))),
        (true, true) => Err(OrchError::validation(
            "placement leaf sets neither clusterName nor clusterLabel",
        )),
        _ if provider.is_empty() => Err(OrchError::validation(
            "placement leaf is missing providerName",
        )),
        (false, true) => Ok(Leaf::Named { provider, cluster }),
        (true, false) => Ok(Leaf::Labelled { provider, label }),
    }
}

impl AllOf {
    /// True when the element names no cluster of its own and only carries
    /// nested optional predicates.
    pub fn is_group_only(&self) -> bool {
        self.provider_name.is_empty()
            && self.cluster_name.is_empty()
            && self.cluster_label.is_empty()
            && !self.any_of.is_empty()
    }

    pub(crate) fn leaf(&self) -> Result<Leaf<'_>> {
        leaf(&self.provider_name, &self.cluster_name, &self.cluster_label)
    }
}

impl AnyOf {
    pub(crate) fn leaf(&self) -> Result<Leaf<'_>> {
        leaf(&self.provider_name, &self.cluster_name, &self.cluster_label)
    }
}

/// A `(provider, label)` pair the resolver needs answered by the cluster registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelSelector {
    pub provider: String,
    pub label: String,
}

impl IntentStruc {
    /// Check every leaf of the tree.
    pub fn validate(&self) -> Result<()> {
        if self.all_of.is_empty() && self.any_of.is_empty() {
            return Err(OrchError::validation("placement intent has no predicates"));
        }
        for all in &self.all_of {
            if !all.is_group_only() {
                all.leaf()?;
            }
            for any in &all.any_of {
                any.leaf()?;
            }
        }
        for any in &self.any_of {
            any.leaf()?;
        }
        Ok(())
    }

    /// Distinct label lookups the tree needs, in first-use order.
    pub fn label_selectors(&self) -> Vec<LabelSelector> {
        let mut out: Vec<LabelSelector> = Vec::new();
        let mut push = |provider: &str, label: &str| {
            if label.is_empty() {
                return;
            }
            let sel = LabelSelector {
                provider: provider.to_string(),
                label: label.to_string(),
            };
            if !out.contains(&sel) {
                out.push(sel);
            }
        };
        for all in &self.all_of {
            push(&all.provider_name, &all.cluster_label);
            for any in &all.any_of {
                push(&any.provider_name, &any.cluster_label);
            }
        }
        for any in &self.any_of {
            push(&any.provider_name, &any.cluster_label);
        }
        out
    }
}

/// Concrete cluster target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterRef {
    pub provider: String,
    #[serde(rename = "clusterName")]
    pub cluster_name: String,
}

impl ClusterRef {
    pub fn new(provider: impl Into<String>, cluster_name: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            cluster_name: cluster_name.into(),
        }
    }

    /// Name of the cluster node in a run-time context: `provider+cluster`.
    pub fn context_name(&self) -> String {
        format!("{}+{}", self.provider, self.cluster_name)
    }

    pub fn from_context_name(name: &str) -> Option<Self> {
        let (provider, cluster) = name.split_once('+')?;
        if provider.is_empty() || cluster.is_empty() {
            return None;
        }
        Some(Self::new(provider, cluster))
    }
}

impl fmt::Display for ClusterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.cluster_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalGroup {
    #[serde(rename = "groupNumber")]
    pub group_number: u32,
    pub clusters: Vec<ClusterRef>,
}

/// Resolution result: clusters that must all receive the app, plus numbered
/// groups of which exactly one member survives placement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterList {
    pub mandatory: Vec<ClusterRef>,
    #[serde(rename = "optionalGroups")]
    pub optional_groups: Vec<OptionalGroup>,
}

impl ClusterList {
    pub fn is_empty(&self) -> bool {
        self.mandatory.is_empty() && self.optional_groups.iter().all(|g| g.clusters.is_empty())
    }

    /// Mandatory clusters followed by every optional-group member.
    pub fn all_clusters(&self) -> impl Iterator<Item = &ClusterRef> {
        self.mandatory
            .iter()
            .chain(self.optional_groups.iter().flat_map(|g| g.clusters.iter()))
    }
}
