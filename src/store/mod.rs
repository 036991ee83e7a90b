pub mod backend;
pub mod schema;
pub mod sqlite;

pub use backend::{DocumentStore, StoreKey, Versioned};
pub use sqlite::SqliteStore;

/// Collection holding every orchestrator entity row.
pub const ORCHESTRATOR_COLLECTION: &str = "orchestrator";
/// Collection holding sub-controller registrations.
pub const CONTROLLER_COLLECTION: &str = "controller";
/// Collection holding cluster records and their labels.
pub const CLUSTER_COLLECTION: &str = "cluster";
/// Collection holding logical clouds.
pub const LOGICAL_CLOUD_COLLECTION: &str = "logicalcloud";

/// Row tags, one per entity kind.
pub mod tags {
    pub const PROJECT: &str = "projectmetadata";
    pub const COMPOSITE_APP: &str = "compositeappmetadata";
    pub const APP: &str = "appmetadata";
    pub const APP_CONTENT: &str = "appcontent";
    pub const COMPOSITE_PROFILE: &str = "compositeprofilemetadata";
    pub const APP_PROFILE: &str = "profilemetadata";
    pub const APP_PROFILE_CONTENT: &str = "profilecontent";
    pub const GENERIC_PLACEMENT_INTENT: &str = "genericplacementintentmetadata";
    pub const APP_INTENT: &str = "appintentmetadata";
    pub const DEPLOYMENT_INTENT_GROUP: &str = "deploymentintentgroupmetadata";
    pub const DIG_INTENTS: &str = "deploymentintentgroupintents";
    pub const STATE_INFO: &str = "stateInfo";
    pub const CONTROLLER: &str = "controllermetadata";
    pub const CLUSTER: &str = "clustermetadata";
    pub const LOGICAL_CLOUD: &str = "logicalcloudmetadata";
}
