//! Stand-ins for the cluster and logical-cloud services the orchestrator
//! consults but does not own.

use std::sync::Arc;

use async_trait::async_trait;

use super::common::{get_as, list_as, require_parent, to_value, validate_name};
use super::keys::{cluster_key, logical_cloud_key, project_key};
use super::types::{ClusterRecord, LogicalCloud};
use crate::error::Result;
use crate::store::{tags, DocumentStore, CLUSTER_COLLECTION, LOGICAL_CLOUD_COLLECTION, ORCHESTRATOR_COLLECTION};

#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    /// Insert or replace a cluster and its labels.
    async fn put_cluster(&self, cluster: &ClusterRecord) -> Result<()>;
    async fn get_cluster(&self, provider: &str, name: &str) -> Result<ClusterRecord>;
    async fn list_clusters(&self, provider: &str) -> Result<Vec<ClusterRecord>>;
    /// Names of the provider's clusters carrying `label`, in registration order.
    async fn clusters_with_label(&self, provider: &str, label: &str) -> Result<Vec<String>>;
    async fn delete_cluster(&self, provider: &str, name: &str) -> Result<()>;
}

pub struct ClusterClient {
    store: Arc<dyn DocumentStore>,
}

impl ClusterClient {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ClusterRegistry for ClusterClient {
    async fn put_cluster(&self, cluster: &ClusterRecord) -> Result<()> {
        validate_name("cluster provider", &cluster.provider)?;
        validate_name("cluster", &cluster.name)?;
        self.store
            .insert(
                CLUSTER_COLLECTION,
                &cluster_key(&cluster.provider, &cluster.name),
                tags::CLUSTER,
                &to_value(cluster)?,
            )
            .await
    }

    async fn get_cluster(&self, provider: &str, name: &str) -> Result<ClusterRecord> {
        get_as(self.store.as_ref(), CLUSTER_COLLECTION, &cluster_key(provider, name), tags::CLUSTER, || {
            format!("cluster {provider}/{name}")
        })
        .await
    }

    async fn list_clusters(&self, provider: &str) -> Result<Vec<ClusterRecord>> {
        list_as(self.store.as_ref(), CLUSTER_COLLECTION, &cluster_key(provider, ""), tags::CLUSTER).await
    }

    async fn clusters_with_label(&self, provider: &str, label: &str) -> Result<Vec<String>> {
        Ok(self
            .list_clusters(provider)
            .await?
            .into_iter()
            .filter(|c| c.labels.iter().any(|l| l == label))
            .map(|c| c.name)
            .collect())
    }

    async fn delete_cluster(&self, provider: &str, name: &str) -> Result<()> {
        self.store.remove(CLUSTER_COLLECTION, &cluster_key(provider, name)).await
    }
}

#[async_trait]
pub trait LogicalCloudRegistry: Send + Sync {
    /// Insert or replace a logical cloud of an existing project.
    async fn put_logical_cloud(&self, project: &str, cloud: &LogicalCloud) -> Result<()>;
    async fn get_logical_cloud(&self, project: &str, name: &str) -> Result<LogicalCloud>;
    async fn list_logical_clouds(&self, project: &str) -> Result<Vec<LogicalCloud>>;
    async fn delete_logical_cloud(&self, project: &str, name: &str) -> Result<()>;
}

pub struct LogicalCloudClient {
    store: Arc<dyn DocumentStore>,
}

impl LogicalCloudClient {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl LogicalCloudRegistry for LogicalCloudClient {
    async fn put_logical_cloud(&self, project: &str, cloud: &LogicalCloud) -> Result<()> {
        validate_name("logical cloud", &cloud.metadata.name)?;
        require_parent(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &project_key(project), tags::PROJECT, || {
            format!("project {project}")
        })
        .await?;
        self.store
            .insert(
                LOGICAL_CLOUD_COLLECTION,
                &logical_cloud_key(project, &cloud.metadata.name),
                tags::LOGICAL_CLOUD,
                &to_value(cloud)?,
            )
            .await
    }

    async fn get_logical_cloud(&self, project: &str, name: &str) -> Result<LogicalCloud> {
        let key = logical_cloud_key(project, name);
        get_as(self.store.as_ref(), LOGICAL_CLOUD_COLLECTION, &key, tags::LOGICAL_CLOUD, || {
            format!("logical cloud {name} in project {project}")
        })
        .await
    }

    async fn list_logical_clouds(&self, project: &str) -> Result<Vec<LogicalCloud>> {
        let key = logical_cloud_key(project, "");
        list_as(self.store.as_ref(), LOGICAL_CLOUD_COLLECTION, &key, tags::LOGICAL_CLOUD).await
    }

    async fn delete_logical_cloud(&self, project: &str, name: &str) -> Result<()> {
        self.store
            .remove(LOGICAL_CLOUD_COLLECTION, &logical_cloud_key(project, name))
            .await
    }
}
