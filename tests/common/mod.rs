#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::BoxFuture;
use flate2::write::GzEncoder;
use flate2::Compression;

use orkestra::config::OrchestratorConfig;
use orkestra::context::{AppContext, ContextStatus, KvStore, SqliteKv};
use orkestra::deploy::{ControllerInvoker, ControllerReply, SyncEngine};
use orkestra::helm::{RenderError, TemplateEngine, TemplateRequest};
use orkestra::orchestrator::Parts;
use orkestra::placement::{AllOf, AnyOf, ClusterRef, IntentStruc};
use orkestra::registry::{
    App, AppIntent, AppIntentSpec, AppProfile, AppProfileSpec, ClusterRecord, CompositeApp, CompositeAppRef,
    CompositeAppSpec, CompositeProfile, Controller, ControllerType, DeploymentIntentGroup, DigIntents, DigRef,
    DigSpec, GenericPlacementIntent, LogicalCloud, LogicalCloudSpec, Metadata, Project, Registry,
    GENERIC_PLACEMENT_INTENT_KEY,
};
use orkestra::store::{DocumentStore, SqliteStore};
use orkestra::{OrchError, Orchestrator};

pub const PROJECT: &str = "p1";
pub const COMPOSITE_APP: &str = "shop";
pub const VERSION: &str = "v1";
pub const DIG: &str = "dig1";
pub const PROVIDER: &str = "prov";
pub const PROFILE: &str = "default";
pub const CLOUD: &str = "lc1";
pub const NAMESPACE: &str = "apps";
pub const GPI: &str = "placement";
pub const APPS: [&str; 2] = ["web", "db"];

// ─── Tarballs ────────────────────────────────────────────────────────────────

pub fn tar_gz<P: AsRef<str>, B: AsRef<str>>(entries: &[(P, B)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, body) in entries {
        let body = body.as_ref().as_bytes();
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path.as_ref(), body).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Minimal chart laid out as `<app>/Chart.yaml` plus defaults.
pub fn chart(app: &str) -> Vec<u8> {
    tar_gz(&[
        (
            format!("{app}/Chart.yaml"),
            format!("apiVersion: v2\nname: {app}\nversion: 0.1.0\n"),
        ),
        (format!("{app}/values.yaml"), "replicas: 1\nimage: nginx\n".to_string()),
    ])
}

/// Profile whose values file bumps `replicas`.
pub fn profile() -> Vec<u8> {
    tar_gz(&[
        ("manifest.yaml", "version: v1\ntype:\n  values: override_values.yaml\n"),
        ("override_values.yaml", "replicas: 2\n"),
    ])
}

// ─── Template engine ─────────────────────────────────────────────────────────

/// One recorded template call.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub release: String,
    pub app: String,
    pub namespace: String,
    pub values: String,
}

/// Emits a Service (in a foreign namespace) and a Deployment named after the
/// chart directory.
#[derive(Default)]
pub struct StubEngine {
    pub calls: Mutex<Vec<Rendered>>,
    pub fail: AtomicBool,
}

impl StubEngine {
    pub fn calls(&self) -> Vec<Rendered> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn stub_manifest(app: &str) -> String {
    format!(
        "---\n# Source: {app}/templates/deployment.yaml\napiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: {app}\nspec:\n  replicas: 1\n\
         ---\n# Source: {app}/templates/service.yaml\napiVersion: v1\nkind: Service\nmetadata:\n  name: {app}\n  namespace: other\n\
         ---\n# Source: {app}/templates/NOTES.txt\nThanks for installing {app}.\n"
    )
}

#[async_trait]
impl TemplateEngine for StubEngine {
    async fn template(&self, req: &TemplateRequest<'_>) -> Result<String, RenderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RenderError::RenderFailed("stub engine failure".into()));
        }
        let app = req
            .chart_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let values = std::fs::read_to_string(req.values_file).unwrap_or_default();
        self.calls.lock().unwrap().push(Rendered {
            release: req.release.to_string(),
            app: app.clone(),
            namespace: req.namespace.to_string(),
            values,
        });
        Ok(stub_manifest(&app))
    }
}

// ─── Controller invoker ──────────────────────────────────────────────────────

/// Records invocation order; rejects the controllers named in `reject`.
#[derive(Default)]
pub struct StubInvoker {
    calls: Mutex<Vec<String>>,
    reject: Mutex<HashSet<String>>,
}

impl StubInvoker {
    pub fn reject(&self, name: &str) {
        self.reject.lock().unwrap().insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn reply(&self, name: &str) -> ControllerReply {
        self.calls.lock().unwrap().push(name.to_string());
        if self.reject.lock().unwrap().contains(name) {
            ControllerReply::rejected(format!("{name} says no"))
        } else {
            ControllerReply::ok()
        }
    }
}

#[async_trait]
impl ControllerInvoker for StubInvoker {
    async fn filter_clusters(&self, controller: &Controller, _context_id: &str) -> orkestra::Result<ControllerReply> {
        Ok(self.reply(controller.name()))
    }

    async fn update_app_context(
        &self,
        controller: &Controller,
        _intent_name: &str,
        _context_id: &str,
    ) -> orkestra::Result<ControllerReply> {
        Ok(self.reply(controller.name()))
    }
}

// ─── Sync engine ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCall {
    Install(String),
    Uninstall(String),
    Update(String, String),
}

/// Marks contexts the way the real sync engine would when it starts work.
pub struct StubSync {
    kv: Arc<dyn KvStore>,
    calls: Mutex<Vec<SyncCall>>,
    pub fail: AtomicBool,
    before_next: Mutex<Option<BoxFuture<'static, ()>>>,
}

impl StubSync {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            before_next: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> Vec<SyncCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Run `work` inside the next sync call, before it does anything.
    pub fn before_next_call(&self, work: impl Future<Output = ()> + Send + 'static) {
        *self.before_next.lock().unwrap() = Some(Box::pin(work));
    }

    async fn record(&self, call: SyncCall, context_id: &str, status: ContextStatus) -> orkestra::Result<()> {
        let pending = self.before_next.lock().unwrap().take();
        if let Some(work) = pending {
            work.await;
        }
        self.calls.lock().unwrap().push(call);
        if self.fail.load(Ordering::SeqCst) {
            return Err(OrchError::SyncFailed(format!("stub refused context {context_id}")));
        }
        AppContext::load(self.kv.clone(), context_id)
            .await?
            .set_status(status)
            .await
    }
}

#[async_trait]
impl SyncEngine for StubSync {
    async fn install(&self, context_id: &str) -> orkestra::Result<()> {
        self.record(SyncCall::Install(context_id.into()), context_id, ContextStatus::Instantiating)
            .await
    }

    async fn uninstall(&self, context_id: &str) -> orkestra::Result<()> {
        self.record(SyncCall::Uninstall(context_id.into()), context_id, ContextStatus::Terminating)
            .await
    }

    async fn update(&self, from_context_id: &str, to_context_id: &str) -> orkestra::Result<()> {
        self.record(
            SyncCall::Update(from_context_id.into(), to_context_id.into()),
            to_context_id,
            ContextStatus::Instantiating,
        )
        .await
    }
}

// ─── World ───────────────────────────────────────────────────────────────────

/// An orchestrator over in-memory stores with every outbound seam stubbed.
pub struct World {
    pub orch: Orchestrator,
    pub kv: Arc<dyn KvStore>,
    pub engine: Arc<StubEngine>,
    pub invoker: Arc<StubInvoker>,
    pub sync: Arc<StubSync>,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        Self::with_kv(config, Arc::new(SqliteKv::open_memory().unwrap()))
    }

    pub fn with_kv(config: OrchestratorConfig, kv: Arc<dyn KvStore>) -> Self {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open_memory().unwrap());
        let engine = Arc::new(StubEngine::default());
        let invoker = Arc::new(StubInvoker::default());
        let sync = Arc::new(StubSync::new(kv.clone()));
        let orch = Orchestrator::with_parts(
            config,
            Parts {
                store,
                kv: kv.clone(),
                engine: engine.clone(),
                invoker: invoker.clone(),
                sync: sync.clone(),
            },
        );
        Self {
            orch,
            kv,
            engine,
            invoker,
            sync,
        }
    }

    pub fn registry(&self) -> &Registry {
        self.orch.registry()
    }

    /// A world with the default composite app and one DIG seeded.
    pub async fn seeded() -> (Self, DigRef) {
        let world = Self::new();
        let dig = seed(world.registry()).await;
        (world, dig)
    }

    pub async fn context(&self, id: &str) -> AppContext {
        AppContext::load(self.kv.clone(), id).await.unwrap()
    }

    /// Approve then instantiate, returning the new context id.
    pub async fn instantiate(&self, dig: &DigRef) -> String {
        self.orch.lifecycle().approve(dig).await.unwrap();
        self.orch.lifecycle().instantiate(dig).await.unwrap()
    }
}

// ─── Seeding ─────────────────────────────────────────────────────────────────

pub fn composite_app() -> CompositeAppRef {
    CompositeAppRef::new(PROJECT, COMPOSITE_APP, VERSION)
}

pub fn named(provider: &str, cluster: &str) -> AllOf {
    AllOf {
        provider_name: provider.into(),
        cluster_name: cluster.into(),
        ..Default::default()
    }
}

pub fn any_named(provider: &str, cluster: &str) -> AnyOf {
    AnyOf {
        provider_name: provider.into(),
        cluster_name: cluster.into(),
        ..Default::default()
    }
}

pub fn any_labelled(provider: &str, label: &str) -> AnyOf {
    AnyOf {
        provider_name: provider.into(),
        cluster_label: label.into(),
        ..Default::default()
    }
}

/// `web`: c1 plus one of the `edge` clusters (c2, c3). `db`: c4.
pub fn app_placement(app: &str) -> IntentStruc {
    match app {
        "web" => IntentStruc {
            all_of: vec![AllOf {
                any_of: vec![any_labelled(PROVIDER, "edge")],
                ..named(PROVIDER, "c1")
            }],
            any_of: vec![],
        },
        _ => IntentStruc {
            all_of: vec![named(PROVIDER, "c4")],
            any_of: vec![],
        },
    }
}

/// Project, composite app with two apps, profile, clusters, a ready logical
/// cloud, and one DIG with its placement intents.
pub async fn seed(r: &Registry) -> DigRef {
    r.projects
        .create_project(&Project {
            metadata: Metadata::named(PROJECT),
        })
        .await
        .unwrap();
    r.composite_apps
        .create_composite_app(
            PROJECT,
            &CompositeApp {
                metadata: Metadata::named(COMPOSITE_APP),
                spec: CompositeAppSpec {
                    version: VERSION.into(),
                },
            },
        )
        .await
        .unwrap();

    let ca = composite_app();
    for app in APPS {
        r.apps
            .create_app(&ca, &App { metadata: Metadata::named(app), chart: None }, &chart(app))
            .await
            .unwrap();
    }
    r.composite_profiles
        .create_composite_profile(&ca, &CompositeProfile { metadata: Metadata::named(PROFILE) })
        .await
        .unwrap();
    for app in APPS {
        let ap = AppProfile {
            metadata: Metadata::named(format!("{app}-profile")),
            spec: AppProfileSpec { app: app.into() },
            profile: None,
        };
        r.app_profiles
            .create_app_profile(&ca, PROFILE, &ap, &profile())
            .await
            .unwrap();
    }

    let clusters = [("c1", vec![]), ("c2", vec!["edge"]), ("c3", vec!["edge"]), ("c4", vec![]), ("c5", vec![])];
    for (name, labels) in &clusters {
        r.clusters
            .put_cluster(&ClusterRecord {
                provider: PROVIDER.into(),
                name: name.to_string(),
                labels: labels.iter().map(|l| l.to_string()).collect(),
            })
            .await
            .unwrap();
    }
    r.logical_clouds
        .put_logical_cloud(
            PROJECT,
            &LogicalCloud {
                metadata: Metadata::named(CLOUD),
                spec: LogicalCloudSpec {
                    namespace: NAMESPACE.into(),
                    level: "1".into(),
                    clusters: clusters.iter().map(|(c, _)| ClusterRef::new(PROVIDER, *c)).collect(),
                },
                status: "Instantiated".into(),
            },
        )
        .await
        .unwrap();

    seed_dig(r, DIG, "r1").await
}

/// A DIG of the seeded composite app with per-app placement attached.
pub async fn seed_dig(r: &Registry, name: &str, release: &str) -> DigRef {
    let ca = composite_app();
    r.digs
        .create_dig(
            &ca,
            &DeploymentIntentGroup {
                metadata: Metadata::named(name),
                spec: DigSpec {
                    profile: PROFILE.into(),
                    version: release.into(),
                    logical_cloud: CLOUD.into(),
                    override_values: vec![],
                },
            },
        )
        .await
        .unwrap();
    let dig = ca.dig(name);
    r.placement_intents
        .create_generic_placement_intent(&dig, &GenericPlacementIntent { metadata: Metadata::named(GPI) })
        .await
        .unwrap();
    for app in APPS {
        let intent = AppIntent {
            metadata: Metadata::named(format!("{app}-placement")),
            spec: AppIntentSpec {
                app: app.into(),
                intent: app_placement(app),
            },
        };
        r.app_intents.create_app_intent(&dig, GPI, &intent).await.unwrap();
    }
    attach_controllers(r, &dig, &[]).await;
    dig
}

/// Register controllers (if new) and attach them, replacing the DIG's intents.
pub async fn attach_controllers(r: &Registry, dig: &DigRef, controllers: &[(&str, ControllerType, u32)]) {
    let mut intent = BTreeMap::new();
    intent.insert(GENERIC_PLACEMENT_INTENT_KEY.to_string(), GPI.to_string());
    for (name, kind, priority) in controllers {
        let controller = Controller::new(name, "localhost", 9000, *kind, *priority);
        match r.controllers.create_controller(&controller).await {
            Ok(_) | Err(OrchError::Conflict(_)) => {}
            Err(e) => panic!("create controller {name}: {e}"),
        }
        intent.insert(name.to_string(), format!("{name}-intent"));
    }
    r.digs.set_intents(dig, &DigIntents { intent }).await.unwrap();
}
