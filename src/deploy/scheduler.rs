use std::sync::Arc;

use async_trait::async_trait;

use crate::context::AppContext;
use crate::error::{OrchError, Result};
use crate::registry::{Controller, ControllerManager, ControllerType, DigIntents, GENERIC_PLACEMENT_INTENT_KEY};

/// Outcome reported by a sub-controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerReply {
    pub ok: bool,
    pub message: String,
}

impl ControllerReply {
    pub fn ok() -> Self {
        Self {
            ok: true,
            message: String::new(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Transport to placement and action sub-controllers.
#[async_trait]
pub trait ControllerInvoker: Send + Sync {
    async fn filter_clusters(&self, controller: &Controller, context_id: &str) -> Result<ControllerReply>;

    async fn update_app_context(
        &self,
        controller: &Controller,
        intent_name: &str,
        context_id: &str,
    ) -> Result<ControllerReply>;
}

/// A controller attached to a DIG together with the intent it applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledController {
    pub controller: Controller,
    pub intent: String,
}

/// Controllers split by type, each queue in invocation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulePlan {
    pub placement: Vec<ScheduledController>,
    pub action: Vec<ScheduledController>,
}

/// Drives the placement and action passes over a freshly built context.
pub struct ControllerScheduler {
    controllers: Arc<dyn ControllerManager>,
    invoker: Arc<dyn ControllerInvoker>,
}

impl ControllerScheduler {
    pub fn new(controllers: Arc<dyn ControllerManager>, invoker: Arc<dyn ControllerInvoker>) -> Self {
        Self { controllers, invoker }
    }

    /// Look up every attached controller and order each queue by priority,
    /// lowest number first, ties by name.
    pub async fn plan(&self, intents: &DigIntents) -> Result<SchedulePlan> {
        let mut plan = SchedulePlan::default();
        for (name, intent) in &intents.intent {
            if name == GENERIC_PLACEMENT_INTENT_KEY {
                continue;
            }
            let controller = self.controllers.get_controller(name).await?;
            let entry = ScheduledController {
                controller,
                intent: intent.clone(),
            };
            match entry.controller.spec.controller_type {
                ControllerType::Placement => plan.placement.push(entry),
                ControllerType::Action => plan.action.push(entry),
            }
        }
        for queue in [&mut plan.placement, &mut plan.action] {
            queue.sort_by(|a, b| {
                (a.controller.spec.priority, a.controller.name())
                    .cmp(&(b.controller.spec.priority, b.controller.name()))
            });
        }
        Ok(plan)
    }

    /// Placement pass, prune, action pass. Any failure deletes the context.
    pub async fn run(&self, ctx: &AppContext, intents: &DigIntents) -> Result<()> {
        match self.run_passes(ctx, intents).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(context_id = %ctx.id(), error = %e, "Scheduling aborted, deleting context");
                if let Err(cleanup) = ctx.delete().await {
                    tracing::error!(context_id = %ctx.id(), error = %cleanup, "Failed to delete context");
                }
                Err(e)
            }
        }
    }

    async fn run_passes(&self, ctx: &AppContext, intents: &DigIntents) -> Result<()> {
        let plan = self.plan(intents).await?;
        let context_id = ctx.id();

        for entry in &plan.placement {
            check_stop(ctx).await?;
            let name = entry.controller.name();
            tracing::info!(controller = %name, context_id = %context_id, priority = entry.controller.spec.priority, "Invoking placement controller");
            let reply = self
                .invoker
                .filter_clusters(&entry.controller, context_id)
                .await
                .unwrap_or_else(|e| ControllerReply::rejected(e.to_string()));
            if !reply.ok {
                return Err(OrchError::PlacementRejected {
                    controller: name.to_string(),
                    message: reply.message,
                });
            }
        }

        let pruned = Self::prune(ctx).await?;
        tracing::debug!(context_id = %context_id, pruned, "Optional clusters pruned");

        for entry in &plan.action {
            check_stop(ctx).await?;
            let name = entry.controller.name();
            tracing::info!(controller = %name, context_id = %context_id, intent = %entry.intent, "Invoking action controller");
            let reply = self
                .invoker
                .update_app_context(&entry.controller, &entry.intent, context_id)
                .await
                .unwrap_or_else(|e| ControllerReply::rejected(e.to_string()));
            if !reply.ok {
                return Err(OrchError::ActionFailed {
                    controller: name.to_string(),
                    message: reply.message,
                });
            }
        }
        Ok(())
    }

    /// Keep only the first surviving cluster of every optional group.
    /// Returns how many clusters were removed.
    pub async fn prune(ctx: &AppContext) -> Result<usize> {
        let mut removed = 0;
        for app in ctx.app_names().await? {
            for (group, clusters) in ctx.cluster_group_map(&app).await? {
                for cluster in clusters.iter().skip(1) {
                    ctx.delete_cluster(&app, cluster).await?;
                    tracing::debug!(app = %app, group, cluster = %cluster, "Pruned optional cluster");
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

async fn check_stop(ctx: &AppContext) -> Result<()> {
    if ctx.stop_flag().await? {
        return Err(OrchError::state_invalid(format!(
            "context {} was stopped",
            ctx.id()
        )));
    }
    Ok(())
}
