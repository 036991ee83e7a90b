use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::{bail, Context as _};
use serde_json::{json, Map, Value};

use crate::context::{AppContext, CompositeAppMeta, ContextStatus, InstructionKind, KvStore};
use crate::error::{OrchError, Result};
use crate::helm::manifest::rewrite_namespace;
use crate::helm::{HelmRenderer, RenderRequest, ResourceTemplate};
use crate::placement::{resolve, ClusterList, ClusterRef, LabelSelector};
use crate::registry::{DeploymentIntentGroup, DigIntents, DigRef, LogicalCloud, Registry};

/// Dependency marker written for every app and resource.
const READY_GO: &str = "go";

/// Builds the run-time context of a DIG: every app rendered and attached to
/// every cluster its placement intent selects.
pub struct AppContextBuilder {
    registry: Registry,
    kv: Arc<dyn KvStore>,
    renderer: Arc<HelmRenderer>,
}

/// What the builder needs to know about the DIG before touching the context
/// store.
struct BuildInputs {
    dig: DeploymentIntentGroup,
    intents: DigIntents,
    cloud: LogicalCloud,
}

impl AppContextBuilder {
    pub fn new(registry: Registry, kv: Arc<dyn KvStore>, renderer: Arc<HelmRenderer>) -> Self {
        Self { registry, kv, renderer }
    }

    /// Create and populate a fresh context for `dig`.
    ///
    /// Lookups that fail before the context exists keep their own error
    /// kind. Anything failing afterwards deletes the context and surfaces as
    /// `ContextBuildFailed`.
    pub async fn build(&self, dig: &DigRef) -> Result<AppContext> {
        let inputs = self.prepare(dig).await?;
        let ctx = AppContext::create(self.kv.clone()).await?;
        tracing::info!(dig = %dig, context_id = %ctx.id(), "Building app context");

        match self.populate(&ctx, dig, &inputs).await {
            Ok(apps) => {
                tracing::info!(dig = %dig, context_id = %ctx.id(), apps, "App context built");
                Ok(ctx)
            }
            Err(e) => {
                tracing::warn!(dig = %dig, context_id = %ctx.id(), error = %format!("{e:#}"), "App context build failed");
                if let Err(cleanup) = ctx.delete().await {
                    tracing::error!(context_id = %ctx.id(), error = %cleanup, "Failed to delete partial context");
                }
                Err(OrchError::ContextBuildFailed(e))
            }
        }
    }

    async fn prepare(&self, dig: &DigRef) -> Result<BuildInputs> {
        let record = self.registry.digs.get_dig(dig).await?;
        let intents = self.registry.digs.intents(dig).await?;
        let cloud = self
            .registry
            .logical_clouds
            .get_logical_cloud(&dig.project, &record.spec.logical_cloud)
            .await?;
        if !cloud.is_ready() {
            return Err(OrchError::state_invalid(format!(
                "logical cloud {} is {:?}, not instantiated",
                cloud.metadata.name, cloud.status
            )));
        }
        Ok(BuildInputs {
            dig: record,
            intents,
            cloud,
        })
    }

    async fn populate(&self, ctx: &AppContext, dig_ref: &DigRef, inputs: &BuildInputs) -> anyhow::Result<usize> {
        let BuildInputs { dig, intents, cloud } = inputs;
        let ca = dig_ref.composite_app();
        let namespace = cloud.spec.namespace.as_str();

        ctx.set_composite_meta(&CompositeAppMeta {
            project: ca.project.clone(),
            composite_app: ca.composite_app.clone(),
            version: ca.version.clone(),
            release: dig.spec.version.clone(),
            deployment_intent_group: dig_ref.dig.clone(),
            namespace: namespace.to_string(),
            level: cloud.spec.level.clone(),
            logical_cloud: cloud.metadata.name.clone(),
        })
        .await?;

        let gpi = intents
            .generic_placement_intent()
            .with_context(|| format!("{dig_ref} has no generic placement intent attached"))?;

        let apps = self.registry.apps.list_apps(&ca).await?;
        if apps.is_empty() {
            bail!("composite app {ca} has no apps");
        }

        // Placement first, so every label lookup happens before rendering.
        let mut placements = Vec::with_capacity(apps.len());
        for app in &apps {
            let name = &app.metadata.name;
            let intent = self
                .registry
                .app_intents
                .get_app_intent_by_app(dig_ref, gpi, name)
                .await
                .with_context(|| format!("placement intent for app {name}"))?;
            placements.push(intent.spec.intent);
        }
        let mut labels: HashMap<LabelSelector, Vec<String>> = HashMap::new();
        for sel in placements.iter().flat_map(|p| p.label_selectors()) {
            if labels.contains_key(&sel) {
                continue;
            }
            let clusters = self
                .registry
                .clusters
                .clusters_with_label(&sel.provider, &sel.label)
                .await?;
            labels.insert(sel, clusters);
        }

        let mut app_order = Vec::with_capacity(apps.len());
        for (app, placement) in apps.iter().zip(&placements) {
            let name = &app.metadata.name;
            let clusters = resolve(placement, &labels).with_context(|| format!("resolving placement of app {name}"))?;
            if clusters.is_empty() {
                bail!("placement of app {name} selects no clusters");
            }
            for cluster in &clusters.mandatory {
                if !cloud.contains(cluster) {
                    bail!(
                        "cluster {cluster} for app {name} is not part of logical cloud {}",
                        cloud.metadata.name
                    );
                }
            }

            let templates = self
                .render_app(dig_ref, dig, name, namespace)
                .await
                .with_context(|| format!("rendering app {name}"))?;
            if templates.is_empty() {
                bail!("app {name} renders no resources");
            }

            let app_handle = ctx.add_app(name).await?;
            attach_clusters(ctx, &app_handle, &clusters, &templates).await?;
            app_order.push(name.clone());
        }

        let dependency: Map<String, Value> = app_order
            .iter()
            .map(|a| (a.clone(), Value::String(READY_GO.to_string())))
            .collect();
        ctx.add_instruction(ctx.root(), InstructionKind::Order, &json!({ "apporder": app_order }))
            .await?;
        ctx.add_instruction(ctx.root(), InstructionKind::Dependency, &json!({ "appdependency": dependency }))
            .await?;
        ctx.set_status(ContextStatus::Created).await?;
        Ok(app_order.len())
    }

    async fn render_app(
        &self,
        dig_ref: &DigRef,
        dig: &DeploymentIntentGroup,
        app: &str,
        namespace: &str,
    ) -> anyhow::Result<Vec<ResourceTemplate>> {
        let ca = dig_ref.composite_app();
        let chart = self.registry.apps.get_app_content(&ca, app).await?;
        let profile = self
            .registry
            .app_profiles
            .get_app_profile_content_by_app(&ca, &dig.spec.profile, app)
            .await?;
        let overrides = dig.overrides_for(app);

        let mut templates = self
            .renderer
            .render(&RenderRequest {
                app_archive: &chart,
                profile_archive: &profile,
                overrides: &overrides,
                app_name: app,
                namespace,
                release_name: &dig.spec.version,
            })
            .await?;
        if !namespace.is_empty() {
            for tpl in &mut templates {
                if rewrite_namespace(tpl, namespace)? {
                    tracing::debug!(app, resource = %tpl.context_name(), namespace, "Rewrote resource namespace");
                }
            }
        }
        Ok(templates)
    }
}

/// Register the app's clusters (mandatory first, then each optional group)
/// and attach every resource plus order/dependency instructions to each.
async fn attach_clusters(
    ctx: &AppContext,
    app: &crate::context::Handle,
    clusters: &ClusterList,
    templates: &[ResourceTemplate],
) -> anyhow::Result<()> {
    let mut seen: BTreeSet<ClusterRef> = BTreeSet::new();
    let mut targets: Vec<(&ClusterRef, Option<u32>)> = Vec::new();
    for cluster in &clusters.mandatory {
        if seen.insert(cluster.clone()) {
            targets.push((cluster, None));
        }
    }
    for group in &clusters.optional_groups {
        for cluster in &group.clusters {
            if seen.insert(cluster.clone()) {
                targets.push((cluster, Some(group.group_number)));
            }
        }
    }

    let mut names: Vec<String> = Vec::with_capacity(templates.len());
    let mut unique: Vec<&ResourceTemplate> = Vec::with_capacity(templates.len());
    for tpl in templates {
        let name = tpl.context_name();
        if names.contains(&name) {
            tracing::warn!(resource = %name, source = %tpl.source, "Duplicate resource dropped");
            continue;
        }
        names.push(name);
        unique.push(tpl);
    }
    let dependency: Map<String, Value> = names
        .iter()
        .map(|n| (n.clone(), Value::String(READY_GO.to_string())))
        .collect();

    for (cluster, group) in targets {
        let handle = ctx.add_cluster(app, &cluster.context_name(), group).await?;
        for (name, tpl) in names.iter().zip(&unique) {
            ctx.add_resource(&handle, name, &tpl.content).await?;
        }
        ctx.add_instruction(&handle, InstructionKind::Order, &json!({ "resorder": names }))
            .await?;
        ctx.add_instruction(&handle, InstructionKind::Dependency, &json!({ "resdependency": dependency }))
            .await?;
    }
    Ok(())
}
