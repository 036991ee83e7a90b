use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use super::state::{ActionEntry, DigState};
use crate::context::{AppContext, ContextStatus, KvStore};
use crate::error::{OrchError, Result};
use crate::helm::manifest::parse_header;
use crate::helm::Gvk;
use crate::placement::ClusterRef;
use crate::registry::{DeploymentIntentGroupManager, DigRef};

/// Status shown for a resource the cluster view has no report for.
const NOT_REPORTED: &str = "Pending";

/// Where resource status is read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusView {
    /// Per-resource status the sync engine records in the context.
    #[default]
    Rsync,
    /// Latest per-cluster snapshot reported back from the cluster.
    Cluster,
}

impl FromStr for StatusView {
    type Err = OrchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "rsync" => Ok(StatusView::Rsync),
            "cluster" => Ok(StatusView::Cluster),
            other => Err(OrchError::validation(format!(
                "status type {other:?} is neither \"rsync\" nor \"cluster\""
            ))),
        }
    }
}

impl fmt::Display for StatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusView::Rsync => f.write_str("rsync"),
            StatusView::Cluster => f.write_str("cluster"),
        }
    }
}

/// Query options shared by every status shape. Empty filters match all.
#[derive(Debug, Clone, Default)]
pub struct StatusQuery {
    /// Context to report on; the DIG's current one when unset.
    pub instance: Option<String>,
    pub view: StatusView,
    pub apps: Vec<String>,
    pub clusters: Vec<String>,
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceEntry {
    /// Context name, `name+Kind`.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gvk: Option<Gvk>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterEntry {
    #[serde(flatten)]
    pub cluster: ClusterRef,
    #[serde(rename = "readyStatus", skip_serializing_if = "Option::is_none")]
    pub ready_status: Option<String>,
    pub resources: Vec<ResourceEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppEntry {
    pub name: String,
    pub clusters: Vec<ClusterEntry>,
}

/// The full status summary of a DIG.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigStatus {
    pub project: String,
    #[serde(rename = "compositeApp")]
    pub composite_app: String,
    #[serde(rename = "compositeAppVersion")]
    pub version: String,
    #[serde(rename = "deploymentIntentGroup")]
    pub dig: String,
    pub state: DigState,
    pub actions: Vec<ActionEntry>,
    #[serde(rename = "statusContextId")]
    pub status_context_id: String,
    #[serde(rename = "contextId")]
    pub context_id: String,
    #[serde(rename = "contextStatus", skip_serializing_if = "Option::is_none")]
    pub context_status: Option<ContextStatus>,
    pub view: StatusView,
    #[serde(rename = "resourceCounts")]
    pub resource_counts: BTreeMap<String, usize>,
    pub apps: Vec<AppEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppClusters {
    pub app: String,
    pub clusters: Vec<ClusterRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppResources {
    pub app: String,
    pub resources: Vec<ResourceEntry>,
}

/// Computes DIG status views on demand from the action log and the context.
pub struct StatusAggregator {
    digs: Arc<dyn DeploymentIntentGroupManager>,
    kv: Arc<dyn KvStore>,
}

/// The context a query resolved to, with the log it came from.
struct Resolved {
    ctx: AppContext,
    state: DigState,
    actions: Vec<ActionEntry>,
    status_context_id: String,
}

impl StatusAggregator {
    pub fn new(digs: Arc<dyn DeploymentIntentGroupManager>, kv: Arc<dyn KvStore>) -> Self {
        Self { digs, kv }
    }

    async fn resolve(&self, dig: &DigRef, query: &StatusQuery) -> Result<Resolved> {
        let info = self.digs.state(dig).await?.value;
        let context_id = match &query.instance {
            Some(id) if !info.contains_context(id) => {
                return Err(OrchError::not_found(format!("instance {id} of {dig}")));
            }
            Some(id) => id.clone(),
            None => info
                .last_context()
                .ok_or_else(|| OrchError::not_found(format!("any instance of {dig}")))?
                .to_string(),
        };
        let ctx = AppContext::load(self.kv.clone(), &context_id).await?;
        Ok(Resolved {
            ctx,
            state: info.current_state(),
            status_context_id: info.status_context_id.clone(),
            actions: info.actions,
        })
    }

    /// App names in the context, narrowed by the app filter. A filter naming
    /// an app the context does not hold is `NotFound`.
    async fn selected_apps(&self, ctx: &AppContext, query: &StatusQuery) -> Result<Vec<String>> {
        let apps = ctx.app_names().await?;
        if query.apps.is_empty() {
            return Ok(apps);
        }
        for wanted in &query.apps {
            if !apps.contains(wanted) {
                return Err(OrchError::not_found(format!("app {wanted} in context {}", ctx.id())));
            }
        }
        Ok(apps.into_iter().filter(|a| query.apps.contains(a)).collect())
    }

    async fn selected_clusters(&self, ctx: &AppContext, app: &str, query: &StatusQuery) -> Result<Vec<String>> {
        let clusters = ctx.cluster_names(app).await?;
        Ok(clusters
            .into_iter()
            .filter(|c| {
                query.clusters.is_empty()
                    || query.clusters.iter().any(|f| {
                        f == c || ClusterRef::from_context_name(c).is_some_and(|r| &r.cluster_name == f)
                    })
            })
            .collect())
    }

    async fn cluster_resources(
        &self,
        ctx: &AppContext,
        app: &str,
        cluster: &str,
        query: &StatusQuery,
    ) -> Result<Vec<ResourceEntry>> {
        let snapshot = match query.view {
            StatusView::Cluster => ctx.cluster_snapshot(app, cluster).await?.unwrap_or_default(),
            StatusView::Rsync => Default::default(),
        };
        let mut out = Vec::new();
        for name in ctx.resource_names(app, cluster).await? {
            if !resource_selected(&name, &query.resources) {
                continue;
            }
            let content = ctx.resource_content(app, cluster, &name).await?;
            let status = match query.view {
                StatusView::Rsync => ctx.resource_status(app, cluster, &name).await?.to_string(),
                StatusView::Cluster => snapshot
                    .resources
                    .get(&name)
                    .cloned()
                    .unwrap_or_else(|| NOT_REPORTED.to_string()),
            };
            out.push(ResourceEntry {
                name,
                gvk: parse_header(&content).map(|h| h.gvk),
                status,
            });
        }
        Ok(out)
    }

    // ─── Query shapes ───────────────────────────────────────────────────────

    pub async fn summary(&self, dig: &DigRef, query: &StatusQuery) -> Result<DigStatus> {
        let resolved = self.resolve(dig, query).await?;
        let ctx = &resolved.ctx;

        let mut apps = Vec::new();
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for app in self.selected_apps(ctx, query).await? {
            let mut clusters = Vec::new();
            for cluster in self.selected_clusters(ctx, &app, query).await? {
                let resources = self.cluster_resources(ctx, &app, &cluster, query).await?;
                for r in &resources {
                    *counts.entry(r.status.clone()).or_default() += 1;
                }
                clusters.push(ClusterEntry {
                    cluster: cluster_ref(&cluster)?,
                    ready_status: ctx.ready_status(&app, &cluster).await?,
                    resources,
                });
            }
            apps.push(AppEntry { name: app, clusters });
        }

        Ok(DigStatus {
            project: dig.project.clone(),
            composite_app: dig.composite_app.clone(),
            version: dig.version.clone(),
            dig: dig.dig.clone(),
            state: resolved.state,
            actions: resolved.actions,
            status_context_id: resolved.status_context_id,
            context_id: ctx.id().to_string(),
            context_status: ctx.status().await?,
            view: query.view,
            resource_counts: counts,
            apps,
        })
    }

    pub async fn apps(&self, dig: &DigRef, query: &StatusQuery) -> Result<Vec<String>> {
        let resolved = self.resolve(dig, query).await?;
        self.selected_apps(&resolved.ctx, query).await
    }

    pub async fn clusters_by_app(&self, dig: &DigRef, query: &StatusQuery) -> Result<Vec<AppClusters>> {
        let resolved = self.resolve(dig, query).await?;
        let ctx = &resolved.ctx;
        let mut out = Vec::new();
        for app in self.selected_apps(ctx, query).await? {
            let clusters = self
                .selected_clusters(ctx, &app, query)
                .await?
                .iter()
                .map(|c| cluster_ref(c))
                .collect::<Result<Vec<_>>>()?;
            out.push(AppClusters { app, clusters });
        }
        Ok(out)
    }

    /// Resources of each app. The rsync view reports the first cluster of
    /// each app; the cluster view merges every cluster's snapshot.
    pub async fn resources_by_app(&self, dig: &DigRef, query: &StatusQuery) -> Result<Vec<AppResources>> {
        let resolved = self.resolve(dig, query).await?;
        let ctx = &resolved.ctx;
        let mut out = Vec::new();
        for app in self.selected_apps(ctx, query).await? {
            let clusters = self.selected_clusters(ctx, &app, query).await?;
            let mut resources: Vec<ResourceEntry> = Vec::new();
            let scan = match query.view {
                StatusView::Rsync => &clusters[..clusters.len().min(1)],
                StatusView::Cluster => &clusters[..],
            };
            for cluster in scan {
                for entry in self.cluster_resources(ctx, &app, cluster, query).await? {
                    if !resources.iter().any(|r| r.name == entry.name) {
                        resources.push(entry);
                    }
                }
            }
            out.push(AppResources { app, resources });
        }
        Ok(out)
    }
}

fn cluster_ref(context_name: &str) -> Result<ClusterRef> {
    ClusterRef::from_context_name(context_name).ok_or_else(|| {
        OrchError::Backend(anyhow::anyhow!("corrupt cluster node name {context_name:?}"))
    })
}

/// A resource filter entry matches the context name or the bare object name.
fn resource_selected(context_name: &str, filter: &[String]) -> bool {
    if filter.is_empty() {
        return true;
    }
    let bare = context_name.split('+').next().unwrap_or(context_name);
    filter.iter().any(|f| f == context_name || f == bare)
}
