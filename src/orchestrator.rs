use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::OrchestratorConfig;
use crate::context::{KvStore, SqliteKv};
use crate::deploy::{
    AppContextBuilder, ControllerInvoker, ControllerScheduler, DigLifecycle, StatusAggregator, SyncEngine,
};
use crate::error::{OrchError, Result};
use crate::helm::{HelmCli, HelmRenderer, TemplateEngine};
use crate::registry::{ControllerClient, DigRef, Registry};
use crate::rpc::sync::resolve_endpoint;
use crate::rpc::{GrpcControllerInvoker, ReadySubscription, RpcConnections, RsyncClient};
use crate::store::{DocumentStore, SqliteStore};

/// Client name the orchestrator subscribes to readiness streams under.
const READY_CLIENT_NAME: &str = "orkestra";

/// Seams that can be swapped out when composing an [`Orchestrator`].
pub struct Parts {
    pub store: Arc<dyn DocumentStore>,
    pub kv: Arc<dyn KvStore>,
    pub engine: Arc<dyn TemplateEngine>,
    pub invoker: Arc<dyn ControllerInvoker>,
    pub sync: Arc<dyn SyncEngine>,
}

/// The composed orchestrator: registry, lifecycle and status over one
/// document store and one context store.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Registry,
    kv: Arc<dyn KvStore>,
    pool: RpcConnections,
    lifecycle: DigLifecycle,
    status: StatusAggregator,
}

impl Orchestrator {
    /// Open both SQLite stores named by `config` and wire the gRPC clients.
    pub fn open(config: OrchestratorConfig) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open(Path::new(&config.database.path))?);
        let kv: Arc<dyn KvStore> = Arc::new(SqliteKv::open(Path::new(&config.context_store.path))?);
        info!(
            database = %config.database.path,
            context_store = %config.context_store.path,
            "Stores opened"
        );

        let pool = RpcConnections::new(config.rpc.deadline());
        let controllers = Arc::new(ControllerClient::new(store.clone()));
        let parts = Parts {
            store,
            kv,
            engine: Arc::new(HelmCli::new(&config.helm.binary)),
            invoker: Arc::new(GrpcControllerInvoker::new(pool.clone())),
            sync: Arc::new(RsyncClient::new(pool.clone(), controllers, config.sync_controller.clone())),
        };
        Ok(Self::compose(config, parts, pool))
    }

    /// Compose over caller-supplied stores, renderer engine, invoker and
    /// sync engine.
    pub fn with_parts(config: OrchestratorConfig, parts: Parts) -> Self {
        let pool = RpcConnections::new(config.rpc.deadline());
        Self::compose(config, parts, pool)
    }

    fn compose(config: OrchestratorConfig, parts: Parts, pool: RpcConnections) -> Self {
        let registry = Registry::with_blob_limit(parts.store, config.max_blob_bytes);
        let renderer = Arc::new(HelmRenderer::new(parts.engine).with_profile_manifest(&config.helm.profile_manifest));
        let builder = AppContextBuilder::new(registry.clone(), parts.kv.clone(), renderer);
        let scheduler = ControllerScheduler::new(registry.controllers.clone(), parts.invoker);
        let lifecycle = DigLifecycle::new(registry.clone(), parts.kv.clone(), builder, scheduler, parts.sync);
        let status = StatusAggregator::new(registry.digs.clone(), parts.kv.clone());
        Self {
            config,
            registry,
            kv: parts.kv,
            pool,
            lifecycle,
            status,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn context_store(&self) -> Arc<dyn KvStore> {
        self.kv.clone()
    }

    pub fn lifecycle(&self) -> &DigLifecycle {
        &self.lifecycle
    }

    pub fn status(&self) -> &StatusAggregator {
        &self.status
    }

    /// Open a channel to every registered controller.
    pub async fn init_channels(&self) -> Result<usize> {
        self.pool.init_from_registry(self.registry.controllers.as_ref()).await
    }

    /// Unregister a controller and drop its pooled channel.
    pub async fn delete_controller(&self, name: &str) -> Result<()> {
        self.registry.controllers.delete_controller(name).await?;
        self.pool.evict(name).await;
        info!(controller = %name, "Controller deleted");
        Ok(())
    }

    /// Subscribe to readiness events for the DIG's current context.
    pub async fn watch(&self, dig: &DigRef) -> Result<ReadySubscription> {
        let info = self.lifecycle.state(dig).await?;
        let context_id = info
            .last_context()
            .ok_or_else(|| OrchError::not_found(format!("any instance of {dig}")))?
            .to_string();
        let name = &self.config.sync_controller;
        let endpoint = resolve_endpoint(self.registry.controllers.as_ref(), name).await?;
        let channel = self.pool.channel(name, &endpoint).await?;
        info!(dig = %dig, context_id = %context_id, "Watching readiness");
        Ok(ReadySubscription::start(
            channel,
            READY_CLIENT_NAME,
            &context_id,
            self.config.rpc.ready_notify_backoff(),
        ))
    }
}
