use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use super::handle::Handle;
use super::kv::KvStore;
use super::types::{
    ClusterMeta, ClusterSnapshot, CompositeAppMeta, ContextStatus, InstructionKind, ResourceStatus,
    StatusRecord,
};
use crate::error::{OrchError, Result};

const APP: &str = "app";
const CLUSTER: &str = "cluster";
const RESOURCE: &str = "resource";
const INSTRUCTION: &str = "instruction";

const META: &str = "meta";
const STATUS: &str = "status";
const STOP_FLAG: &str = "stopflag";
const STATUS_CONTEXT_ID: &str = "statusappctxid";
const READY_STATUS: &str = "readystatus";

/// One run-time context tree: composite app → app → cluster → resource.
#[derive(Clone)]
pub struct AppContext {
    kv: Arc<dyn KvStore>,
    id: String,
    root: Handle,
}

impl AppContext {
    /// Allocate a fresh context id and write its root node.
    pub async fn create(kv: Arc<dyn KvStore>) -> Result<Self> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let root = Handle::root(&id);
        kv.put(root.as_str(), &json!(id)).await?;
        tracing::debug!(context_id = %id, "Created app context");
        Ok(Self { kv, id, root })
    }

    /// Attach to an existing context; `NotFound` if its root is gone.
    pub async fn load(kv: Arc<dyn KvStore>, id: &str) -> Result<Self> {
        let root = Handle::root(id);
        if kv.get(root.as_str()).await?.is_none() {
            return Err(OrchError::not_found(format!("app context {id}")));
        }
        Ok(Self {
            kv,
            id: id.to_string(),
            root,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Handle {
        &self.root
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.kv.get(self.root.as_str()).await?.is_some())
    }

    /// Remove the whole tree.
    pub async fn delete(&self) -> Result<()> {
        let removed = self.kv.delete_prefix(self.root.as_str()).await?;
        tracing::debug!(context_id = %self.id, keys = removed, "Deleted app context");
        Ok(())
    }

    /// Every node and level handle in the tree, in path order.
    pub async fn all_handles(&self) -> Result<Vec<Handle>> {
        let keys = self.kv.keys_with_prefix(self.root.as_str()).await?;
        let mut handles: Vec<Handle> = keys
            .iter()
            .filter_map(|k| k.strip_prefix(self.root.as_str()))
            .map(|rest| {
                let mut h = self.root.clone();
                for pair in rest.trim_end_matches('/').split('/').collect::<Vec<_>>().chunks(2) {
                    h = match pair {
                        [segment, name] => h.child(segment, name),
                        [level] if !level.is_empty() => h.level(level),
                        _ => h,
                    };
                }
                h
            })
            .collect();
        handles.sort();
        handles.dedup();
        Ok(handles)
    }

    // ─── Raw values ─────────────────────────────────────────────────────────

    async fn put_json<T: Serialize + ?Sized>(&self, handle: &Handle, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.kv.put(handle.as_str(), &value).await
    }

    async fn get_json<T: DeserializeOwned>(&self, handle: &Handle) -> Result<Option<T>> {
        match self.kv.get(handle.as_str()).await? {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    /// Write an arbitrary level value under `parent`.
    pub async fn set_level_value(&self, parent: &Handle, level: &str, value: &Value) -> Result<Handle> {
        let handle = parent.level(level);
        self.kv.put(handle.as_str(), value).await?;
        Ok(handle)
    }

    pub async fn level_value(&self, parent: &Handle, level: &str) -> Result<Option<Value>> {
        self.kv.get(parent.level(level).as_str()).await
    }

    async fn child_names(&self, parent: &Handle, segment: &str) -> Result<Vec<String>> {
        let prefix = format!("{}{}/", parent, segment);
        let keys = self.kv.keys_with_prefix(&prefix).await?;
        Ok(keys
            .iter()
            .filter_map(|k| parent.direct_child_name(segment, k))
            .map(str::to_string)
            .collect())
    }

    async fn require_node(&self, handle: Handle, what: impl FnOnce() -> String) -> Result<Handle> {
        if self.kv.get(handle.as_str()).await?.is_none() {
            return Err(OrchError::not_found(what()));
        }
        Ok(handle)
    }

    // ─── Composite app ──────────────────────────────────────────────────────

    pub async fn set_composite_meta(&self, meta: &CompositeAppMeta) -> Result<()> {
        self.put_json(&self.root.level(META), meta).await
    }

    pub async fn composite_meta(&self) -> Result<CompositeAppMeta> {
        self.get_json(&self.root.level(META))
            .await?
            .ok_or_else(|| OrchError::not_found(format!("composite app metadata in context {}", self.id)))
    }

    pub async fn status(&self) -> Result<Option<ContextStatus>> {
        let record: Option<StatusRecord<ContextStatus>> = self.get_json(&self.root.level(STATUS)).await?;
        Ok(record.map(|r| r.status))
    }

    pub async fn set_status(&self, status: ContextStatus) -> Result<()> {
        self.put_json(&self.root.level(STATUS), &StatusRecord { status }).await
    }

    pub async fn stop_flag(&self) -> Result<bool> {
        Ok(self
            .get_json::<bool>(&self.root.level(STOP_FLAG))
            .await?
            .unwrap_or(false))
    }

    pub async fn set_stop_flag(&self, stop: bool) -> Result<()> {
        self.put_json(&self.root.level(STOP_FLAG), &stop).await
    }

    pub async fn status_context_id(&self) -> Result<Option<String>> {
        self.get_json(&self.root.level(STATUS_CONTEXT_ID)).await
    }

    pub async fn set_status_context_id(&self, id: &str) -> Result<()> {
        self.put_json(&self.root.level(STATUS_CONTEXT_ID), id).await
    }

    // ─── Instructions ───────────────────────────────────────────────────────

    pub async fn add_instruction(&self, parent: &Handle, kind: InstructionKind, value: &Value) -> Result<Handle> {
        let handle = parent.child(INSTRUCTION, kind.as_str());
        self.kv.put(handle.as_str(), value).await?;
        Ok(handle)
    }

    pub async fn instruction(&self, parent: &Handle, kind: InstructionKind) -> Result<Option<Value>> {
        self.kv
            .get(parent.child(INSTRUCTION, kind.as_str()).as_str())
            .await
    }

    // ─── Apps ───────────────────────────────────────────────────────────────

    pub async fn add_app(&self, name: &str) -> Result<Handle> {
        let handle = self.root.child(APP, name);
        self.put_json(&handle, name).await?;
        Ok(handle)
    }

    pub async fn app_handle(&self, name: &str) -> Result<Handle> {
        self.require_node(self.root.child(APP, name), || {
            format!("app {name} in context {}", self.id)
        })
        .await
    }

    pub async fn app_names(&self) -> Result<Vec<String>> {
        self.child_names(&self.root, APP).await
    }

    // ─── Clusters ───────────────────────────────────────────────────────────

    /// Register a cluster under an app. `group` is `None` for mandatory
    /// clusters and the optional-group number otherwise.
    pub async fn add_cluster(&self, app: &Handle, cluster: &str, group: Option<u32>) -> Result<Handle> {
        let handle = app.child(CLUSTER, cluster);
        let seq = self.child_names(app, CLUSTER).await?.len() as u64;
        self.put_json(&handle, cluster).await?;
        let meta = ClusterMeta {
            group: group.map(|g| g.to_string()).unwrap_or_default(),
            seq,
        };
        self.put_json(&handle.level(META), &meta).await?;
        Ok(handle)
    }

    pub async fn cluster_handle(&self, app: &str, cluster: &str) -> Result<Handle> {
        let handle = self.root.child(APP, app).child(CLUSTER, cluster);
        self.require_node(handle, || {
            format!("cluster {cluster} of app {app} in context {}", self.id)
        })
        .await
    }

    /// Cluster names of an app in registration order.
    pub async fn cluster_names(&self, app: &str) -> Result<Vec<String>> {
        let app = self.app_handle(app).await?;
        self.child_names(&app, CLUSTER).await
    }

    /// Optional group number of a cluster, `None` when mandatory.
    pub async fn cluster_group(&self, app: &str, cluster: &str) -> Result<Option<u32>> {
        let handle = self.cluster_handle(app, cluster).await?;
        let meta: ClusterMeta = self.get_json(&handle.level(META)).await?.unwrap_or_default();
        parse_group(&meta.group)
    }

    /// Optional groups of an app: group number → clusters in registration order.
    pub async fn cluster_group_map(&self, app: &str) -> Result<BTreeMap<u32, Vec<String>>> {
        let app_handle = self.app_handle(app).await?;
        let mut tagged = Vec::new();
        for cluster in self.child_names(&app_handle, CLUSTER).await? {
            let meta: ClusterMeta = self
                .get_json(&app_handle.child(CLUSTER, &cluster).level(META))
                .await?
                .unwrap_or_default();
            if let Some(group) = parse_group(&meta.group)? {
                tagged.push((group, meta.seq, cluster));
            }
        }
        tagged.sort_by_key(|(group, seq, _)| (*group, *seq));

        let mut groups: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for (group, _, cluster) in tagged {
            groups.entry(group).or_default().push(cluster);
        }
        Ok(groups)
    }

    pub async fn delete_cluster(&self, app: &str, cluster: &str) -> Result<()> {
        let handle = self.cluster_handle(app, cluster).await?;
        self.kv.delete_prefix(handle.as_str()).await?;
        tracing::debug!(context_id = %self.id, app, cluster, "Removed cluster from context");
        Ok(())
    }

    pub async fn cluster_snapshot(&self, app: &str, cluster: &str) -> Result<Option<ClusterSnapshot>> {
        let handle = self.cluster_handle(app, cluster).await?;
        self.get_json(&handle.level(STATUS)).await
    }

    pub async fn set_cluster_snapshot(&self, app: &str, cluster: &str, snapshot: &ClusterSnapshot) -> Result<()> {
        let handle = self.cluster_handle(app, cluster).await?;
        self.put_json(&handle.level(STATUS), snapshot).await
    }

    pub async fn ready_status(&self, app: &str, cluster: &str) -> Result<Option<String>> {
        let handle = self.cluster_handle(app, cluster).await?;
        let record: Option<StatusRecord<String>> = self.get_json(&handle.level(READY_STATUS)).await?;
        Ok(record.map(|r| r.status))
    }

    // ─── Resources ──────────────────────────────────────────────────────────

    pub async fn add_resource(&self, cluster: &Handle, name: &str, content: &str) -> Result<Handle> {
        let handle = cluster.child(RESOURCE, name);
        self.put_json(&handle, content).await?;
        Ok(handle)
    }

    pub async fn resource_names(&self, app: &str, cluster: &str) -> Result<Vec<String>> {
        let handle = self.cluster_handle(app, cluster).await?;
        self.child_names(&handle, RESOURCE).await
    }

    pub async fn resource_content(&self, app: &str, cluster: &str, resource: &str) -> Result<String> {
        let handle = self.root.child(APP, app).child(CLUSTER, cluster).child(RESOURCE, resource);
        self.get_json(&handle).await?.ok_or_else(|| {
            OrchError::not_found(format!("resource {resource} on {cluster} for app {app}"))
        })
    }

    pub async fn resource_status(&self, app: &str, cluster: &str, resource: &str) -> Result<ResourceStatus> {
        let handle = self
            .root
            .child(APP, app)
            .child(CLUSTER, cluster)
            .child(RESOURCE, resource)
            .level(STATUS);
        let record: Option<StatusRecord<ResourceStatus>> = self.get_json(&handle).await?;
        Ok(record.map(|r| r.status).unwrap_or_default())
    }

    pub async fn set_resource_status(
        &self,
        app: &str,
        cluster: &str,
        resource: &str,
        status: ResourceStatus,
    ) -> Result<()> {
        let handle = self
            .root
            .child(APP, app)
            .child(CLUSTER, cluster)
            .child(RESOURCE, resource)
            .level(STATUS);
        self.put_json(&handle, &StatusRecord { status }).await
    }
}

fn parse_group(raw: &str) -> Result<Option<u32>> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<u32>()
        .map(Some)
        .map_err(|_| OrchError::Backend(anyhow::anyhow!("corrupt cluster group tag {raw:?}")))
}
