use std::cmp::Ordering;

use super::manifest::ResourceTemplate;

/// Helm install order. Kinds not listed here install last.
pub const INSTALL_ORDER: &[&str] = &[
    "Namespace",
    "ResourceQuota",
    "LimitRange",
    "Secret",
    "ConfigMap",
    "StorageClass",
    "PersistentVolume",
    "PersistentVolumeClaim",
    "ServiceAccount",
    "CustomResourceDefinition",
    "ClusterRole",
    "ClusterRoleBinding",
    "Role",
    "RoleBinding",
    "Service",
    "DaemonSet",
    "Pod",
    "ReplicationController",
    "ReplicaSet",
    "Deployment",
    "StatefulSet",
    "Job",
    "CronJob",
    "Ingress",
    "APIService",
];

fn rank(kind: &str) -> usize {
    INSTALL_ORDER
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(INSTALL_ORDER.len())
}

/// Compare two objects by install order, then kind (for unknown kinds), then name.
pub fn install_order(a: &ResourceTemplate, b: &ResourceTemplate) -> Ordering {
    rank(&a.gvk.kind)
        .cmp(&rank(&b.gvk.kind))
        .then_with(|| a.gvk.kind.cmp(&b.gvk.kind))
        .then_with(|| a.name.cmp(&b.name))
}

pub fn sort_by_install_order(templates: &mut [ResourceTemplate]) {
    templates.sort_by(install_order);
}
