use std::future::Future;
use std::sync::Arc;

use crate::context::{AppContext, ContextStatus, KvStore};
use crate::error::{OrchError, Result};
use crate::registry::{DigRef, Registry};

use super::builder::AppContextBuilder;
use super::scheduler::ControllerScheduler;
use super::state::{update_state, DigState, StateInfo};
use super::sync::SyncEngine;

/// The DIG state machine: every operation checks the action log, does its
/// downstream work, and only then appends to the log. The append re-checks
/// the transition; when it fails, the downstream work is reverted.
pub struct DigLifecycle {
    registry: Registry,
    kv: Arc<dyn KvStore>,
    builder: AppContextBuilder,
    scheduler: ControllerScheduler,
    sync: Arc<dyn SyncEngine>,
}

fn refuse(op: &str, dig: &DigRef, state: DigState) -> OrchError {
    OrchError::state_invalid(format!("cannot {op} {dig} while it is {state}"))
}

impl DigLifecycle {
    pub fn new(
        registry: Registry,
        kv: Arc<dyn KvStore>,
        builder: AppContextBuilder,
        scheduler: ControllerScheduler,
        sync: Arc<dyn SyncEngine>,
    ) -> Self {
        Self {
            registry,
            kv,
            builder,
            scheduler,
            sync,
        }
    }

    pub async fn state(&self, dig: &DigRef) -> Result<StateInfo> {
        Ok(self.registry.digs.state(dig).await?.value)
    }

    // ─── Approve ────────────────────────────────────────────────────────────

    /// Created, Terminated or Updated → Approved. Approving an approved DIG
    /// writes nothing.
    pub async fn approve(&self, dig: &DigRef) -> Result<()> {
        update_state(self.registry.digs.as_ref(), dig, |info| match info.current_state() {
            DigState::Approved => Ok(false),
            DigState::Created | DigState::Terminated | DigState::Updated => {
                info.push(DigState::Approved, "", 0);
                Ok(true)
            }
            other => Err(refuse("approve", dig, other)),
        })
        .await?;
        Ok(())
    }

    // ─── Instantiate ────────────────────────────────────────────────────────

    /// Build, schedule and install a new context. Returns its id.
    pub async fn instantiate(&self, dig: &DigRef) -> Result<String> {
        let state = self.state(dig).await?.current_state();
        if !matches!(state, DigState::Approved | DigState::Terminated) {
            return Err(refuse("instantiate", dig, state));
        }
        let intents = self.registry.digs.intents(dig).await?;

        let ctx = self.builder.build(dig).await?;
        self.scheduler.run(&ctx, &intents).await?;
        self.mark_status_context(&ctx, ctx.id()).await?;
        self.hand_off(&ctx, self.sync.install(ctx.id())).await?;

        let context_id = ctx.id().to_string();
        let appended = update_state(self.registry.digs.as_ref(), dig, |info| {
            let state = info.current_state();
            if !matches!(state, DigState::Approved | DigState::Terminated) {
                return Err(refuse("instantiate", dig, state));
            }
            let revision = info.next_revision();
            info.push(DigState::Instantiated, &context_id, revision);
            info.status_context_id = context_id.clone();
            Ok(true)
        })
        .await;
        if let Err(e) = appended {
            self.unwind(&ctx, self.sync.uninstall(ctx.id()), &e).await;
            return Err(e);
        }
        Ok(context_id)
    }

    // ─── Terminate ──────────────────────────────────────────────────────────

    pub async fn terminate(&self, dig: &DigRef) -> Result<()> {
        let info = self.state(dig).await?;
        let state = info.current_state();
        if !matches!(
            state,
            DigState::Instantiated | DigState::Updated | DigState::InstantiateStopped
        ) {
            return Err(refuse("terminate", dig, state));
        }
        let context_id = info
            .last_context()
            .ok_or_else(|| OrchError::not_found(format!("context of {dig}")))?
            .to_string();

        tracing::info!(dig = %dig, context_id = %context_id, "Uninstalling");
        self.sync.uninstall(&context_id).await?;

        update_state(self.registry.digs.as_ref(), dig, |info| {
            if info.current_state() != state || info.last_context() != Some(context_id.as_str()) {
                return Err(OrchError::state_invalid(format!(
                    "{dig} changed underneath terminate of context {context_id}"
                )));
            }
            let revision = info.latest_revision();
            info.push(DigState::Terminated, &context_id, revision);
            Ok(true)
        })
        .await?;
        Ok(())
    }

    // ─── Stop ───────────────────────────────────────────────────────────────

    /// Ask the sync engine to stop working on the current context. In-flight
    /// RPCs are left alone.
    pub async fn stop(&self, dig: &DigRef) -> Result<()> {
        let info = self.state(dig).await?;
        let state = info.current_state();
        let (stopped, op_status) = match state {
            DigState::Instantiated => (DigState::InstantiateStopped, ContextStatus::Instantiating),
            DigState::Terminated => (DigState::TerminateStopped, ContextStatus::Terminating),
            other => return Err(refuse("stop", dig, other)),
        };
        let context_id = info
            .last_context()
            .ok_or_else(|| OrchError::not_found(format!("context of {dig}")))?
            .to_string();

        let ctx = AppContext::load(self.kv.clone(), &context_id).await?;
        match ctx.status().await? {
            Some(status) if status == op_status => {}
            status => {
                return Err(OrchError::state_invalid(format!(
                    "context {context_id} is {}, nothing in progress to stop",
                    status.map(|s| s.to_string()).unwrap_or_else(|| "without status".into())
                )))
            }
        }
        ctx.set_stop_flag(true).await?;
        tracing::info!(dig = %dig, context_id = %context_id, "Stop flag set");

        update_state(self.registry.digs.as_ref(), dig, |info| {
            if info.current_state() != state || info.last_context() != Some(context_id.as_str()) {
                return Err(OrchError::state_invalid(format!(
                    "{dig} changed underneath stop of context {context_id}"
                )));
            }
            let revision = info.latest_revision();
            info.push(stopped, &context_id, revision);
            Ok(true)
        })
        .await?;
        Ok(())
    }

    // ─── Migrate ────────────────────────────────────────────────────────────

    /// Move the deployment of `source` onto the approved DIG `target` of the
    /// same composite app. Returns the target's new context id.
    pub async fn migrate(&self, source: &DigRef, target: &DigRef) -> Result<String> {
        if source.project != target.project || source.composite_app != target.composite_app {
            return Err(OrchError::validation(format!(
                "cannot migrate {source} to {target}: different composite app"
            )));
        }
        let source_info = self.state(source).await?;
        let state = source_info.current_state();
        if state != DigState::Instantiated {
            return Err(refuse("migrate", source, state));
        }
        let target_state = self.state(target).await?.current_state();
        if target_state != DigState::Approved {
            return Err(refuse("migrate to", target, target_state));
        }
        let (from_id, status_id) = current_and_status(&source_info, source)?;

        let intents = self.registry.digs.intents(target).await?;
        let ctx = self.builder.build(target).await?;
        self.scheduler.run(&ctx, &intents).await?;
        self.mark_status_context(&ctx, &status_id).await?;
        tracing::info!(source = %source, target = %target, from = %from_id, to = %ctx.id(), "Migrating");
        self.hand_off(&ctx, self.sync.update(&from_id, ctx.id())).await?;

        let to_id = ctx.id().to_string();
        let appended = update_state(self.registry.digs.as_ref(), source, |info| {
            require_current(info, source, "migrate", &from_id)?;
            let revision = info.latest_revision();
            info.push(DigState::Updated, &from_id, revision);
            Ok(true)
        })
        .await;
        if let Err(e) = appended {
            self.unwind(&ctx, self.sync.update(&to_id, &from_id), &e).await;
            return Err(e);
        }

        let appended = update_state(self.registry.digs.as_ref(), target, |info| {
            let state = info.current_state();
            if state != DigState::Approved {
                return Err(refuse("migrate to", target, state));
            }
            let revision = info.next_revision();
            info.push(DigState::Instantiated, &to_id, revision);
            info.status_context_id = status_id.clone();
            Ok(true)
        })
        .await;
        if let Err(e) = appended {
            self.unwind(&ctx, self.sync.update(&to_id, &from_id), &e).await;
            // The source keeps running its old context.
            let restored = update_state(self.registry.digs.as_ref(), source, |info| {
                let revision = info.latest_revision();
                info.push(DigState::Instantiated, &from_id, revision);
                Ok(true)
            })
            .await;
            if let Err(restore) = restored {
                tracing::error!(dig = %source, error = %restore, "Failed to restore source state");
            }
            return Err(e);
        }
        Ok(to_id)
    }

    // ─── Update ─────────────────────────────────────────────────────────────

    /// Rebuild the DIG into a new context and move onto it. Returns the new
    /// revision.
    pub async fn update(&self, dig: &DigRef) -> Result<u64> {
        let info = self.state(dig).await?;
        let state = info.current_state();
        if state != DigState::Instantiated {
            return Err(refuse("update", dig, state));
        }
        let (from_id, status_id) = current_and_status(&info, dig)?;

        let intents = self.registry.digs.intents(dig).await?;
        let ctx = self.builder.build(dig).await?;
        self.scheduler.run(&ctx, &intents).await?;
        self.mark_status_context(&ctx, &status_id).await?;
        self.hand_off(&ctx, self.sync.update(&from_id, ctx.id())).await?;

        let to_id = ctx.id().to_string();
        let mut new_revision = 0;
        let appended = update_state(self.registry.digs.as_ref(), dig, |info| {
            require_current(info, dig, "update", &from_id)?;
            let revision = info.latest_revision();
            info.push(DigState::Updated, &from_id, revision);
            info.push(DigState::Instantiated, &to_id, revision + 1);
            new_revision = revision + 1;
            Ok(true)
        })
        .await;
        if let Err(e) = appended {
            self.unwind(&ctx, self.sync.update(&to_id, &from_id), &e).await;
            return Err(e);
        }
        Ok(new_revision)
    }

    // ─── Rollback ───────────────────────────────────────────────────────────

    /// Move back onto the context recorded for `revision`. Returns the new
    /// revision; no context is deleted.
    pub async fn rollback(&self, dig: &DigRef, revision: u64) -> Result<u64> {
        let info = self.state(dig).await?;
        let state = info.current_state();
        if state != DigState::Instantiated {
            return Err(refuse("roll back", dig, state));
        }
        let target_id = info
            .context_for_revision(revision)
            .ok_or_else(|| OrchError::not_found(format!("revision {revision} of {dig}")))?
            .to_string();
        let (from_id, status_id) = current_and_status(&info, dig)?;

        let target = AppContext::load(self.kv.clone(), &target_id).await?;
        target.set_status_context_id(&status_id).await?;
        tracing::info!(dig = %dig, revision, from = %from_id, to = %target_id, "Rolling back");
        self.sync.update(&from_id, &target_id).await?;

        let mut new_revision = 0;
        let appended = update_state(self.registry.digs.as_ref(), dig, |info| {
            require_current(info, dig, "roll back", &from_id)?;
            let prev = info.latest_revision();
            info.push(DigState::Updated, &from_id, prev);
            info.push(DigState::Instantiated, &target_id, prev + 1);
            new_revision = prev + 1;
            Ok(true)
        })
        .await;
        if let Err(e) = appended {
            // The target context predates this call, so it is only moved off.
            if let Err(revert) = self.sync.update(&target_id, &from_id).await {
                tracing::error!(dig = %dig, error = %revert, "Failed to revert rollback");
            }
            return Err(e);
        }
        Ok(new_revision)
    }

    /// Record which context observers follow, deleting the freshly built
    /// context if that fails.
    async fn mark_status_context(&self, ctx: &AppContext, status_id: &str) -> Result<()> {
        if let Err(e) = ctx.set_status_context_id(status_id).await {
            tracing::warn!(context_id = %ctx.id(), error = %e, "Failed to set status context, deleting context");
            discard(ctx).await;
            return Err(e);
        }
        Ok(())
    }

    /// Run a sync call for a freshly built context, deleting the context if
    /// the sync engine refuses it.
    async fn hand_off(
        &self,
        ctx: &AppContext,
        call: impl Future<Output = Result<()>>,
    ) -> Result<()> {
        if let Err(e) = call.await {
            tracing::warn!(context_id = %ctx.id(), error = %e, "Sync hand-off failed, deleting context");
            discard(ctx).await;
            return Err(e);
        }
        Ok(())
    }

    /// Undo a hand-off whose state append was refused: `revert` moves the
    /// sync engine off the context, then the context is deleted.
    async fn unwind(&self, ctx: &AppContext, revert: impl Future<Output = Result<()>>, cause: &OrchError) {
        tracing::warn!(context_id = %ctx.id(), error = %cause, "State append failed, reverting hand-off");
        if let Err(e) = revert.await {
            tracing::error!(context_id = %ctx.id(), error = %e, "Failed to revert sync hand-off");
        }
        discard(ctx).await;
    }
}

async fn discard(ctx: &AppContext) {
    if let Err(cleanup) = ctx.delete().await {
        tracing::error!(context_id = %ctx.id(), error = %cleanup, "Failed to delete context");
    }
}

/// `dig` must still be Instantiated on `context_id`.
fn require_current(info: &StateInfo, dig: &DigRef, op: &str, context_id: &str) -> Result<()> {
    let state = info.current_state();
    if state != DigState::Instantiated {
        return Err(refuse(op, dig, state));
    }
    if info.last_context() != Some(context_id) {
        return Err(OrchError::state_invalid(format!(
            "cannot {op} {dig}: it moved off context {context_id}"
        )));
    }
    Ok(())
}

/// Current context and the status context id observers follow.
fn current_and_status(info: &StateInfo, dig: &DigRef) -> Result<(String, String)> {
    let current = info
        .last_instantiated()
        .map(|a| a.context_id.clone())
        .ok_or_else(|| OrchError::not_found(format!("instantiated context of {dig}")))?;
    let status = if info.status_context_id.is_empty() {
        current.clone()
    } else {
        info.status_context_id.clone()
    };
    Ok((current, status))
}
