//! Entity registry: one narrow manager trait per entity, each backed by the
//! document store, composed into [`Registry`].

pub mod app;
pub mod blob;
pub mod cluster;
pub mod common;
pub mod controller;
pub mod dig;
pub mod intent;
pub mod keys;
pub mod project;
pub mod types;

use std::sync::Arc;

pub use app::{
    AppClient, AppManager, AppProfileClient, AppProfileManager, CompositeProfileClient,
    CompositeProfileManager,
};
pub use blob::{BlobPolicy, DEFAULT_MAX_BLOB_BYTES};
pub use cluster::{ClusterClient, ClusterRegistry, LogicalCloudClient, LogicalCloudRegistry};
pub use controller::{ControllerClient, ControllerManager};
pub use dig::{DeploymentIntentGroupClient, DeploymentIntentGroupManager};
pub use intent::{
    AppIntentClient, AppIntentManager, GenericPlacementIntentClient, GenericPlacementIntentManager,
};
pub use keys::{CompositeAppRef, DigRef};
pub use project::{CompositeAppClient, CompositeAppManager, ProjectClient, ProjectManager};
pub use types::*;

use crate::store::DocumentStore;

/// Every entity manager the orchestrator consumes.
///
/// Fields are trait objects so tests can swap in stubs for any one of them.
#[derive(Clone)]
pub struct Registry {
    pub projects: Arc<dyn ProjectManager>,
    pub composite_apps: Arc<dyn CompositeAppManager>,
    pub apps: Arc<dyn AppManager>,
    pub composite_profiles: Arc<dyn CompositeProfileManager>,
    pub app_profiles: Arc<dyn AppProfileManager>,
    pub placement_intents: Arc<dyn GenericPlacementIntentManager>,
    pub app_intents: Arc<dyn AppIntentManager>,
    pub digs: Arc<dyn DeploymentIntentGroupManager>,
    pub controllers: Arc<dyn ControllerManager>,
    pub clusters: Arc<dyn ClusterRegistry>,
    pub logical_clouds: Arc<dyn LogicalCloudRegistry>,
}

impl Registry {
    /// Store-backed managers with the default blob limit.
    pub fn with_store(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_blob_limit(store, DEFAULT_MAX_BLOB_BYTES)
    }

    pub fn with_blob_limit(store: Arc<dyn DocumentStore>, max_blob_bytes: u64) -> Self {
        let blobs = BlobPolicy::new(max_blob_bytes);
        Self {
            projects: Arc::new(ProjectClient::new(store.clone())),
            composite_apps: Arc::new(CompositeAppClient::new(store.clone())),
            apps: Arc::new(AppClient::new(store.clone(), blobs)),
            composite_profiles: Arc::new(CompositeProfileClient::new(store.clone())),
            app_profiles: Arc::new(AppProfileClient::new(store.clone(), blobs)),
            placement_intents: Arc::new(GenericPlacementIntentClient::new(store.clone())),
            app_intents: Arc::new(AppIntentClient::new(store.clone())),
            digs: Arc::new(DeploymentIntentGroupClient::new(store.clone())),
            controllers: Arc::new(ControllerClient::new(store.clone())),
            clusters: Arc::new(ClusterClient::new(store.clone())),
            logical_clouds: Arc::new(LogicalCloudClient::new(store)),
        }
    }
}
