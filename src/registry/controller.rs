use std::sync::Arc;

use async_trait::async_trait;

use super::common::{check_update_name, get_as, list_as, to_value, validate_name};
use super::keys::controller_key;
use super::types::{Controller, MAX_CONTROLLER_PRIORITY, MIN_CONTROLLER_PRIORITY};
use crate::error::{OrchError, Result};
use crate::store::{tags, DocumentStore, CONTROLLER_COLLECTION};

#[async_trait]
pub trait ControllerManager: Send + Sync {
    async fn create_controller(&self, controller: &Controller) -> Result<Controller>;
    async fn get_controller(&self, name: &str) -> Result<Controller>;
    async fn list_controllers(&self) -> Result<Vec<Controller>>;
    async fn update_controller(&self, name: &str, controller: &Controller) -> Result<Controller>;
    async fn delete_controller(&self, name: &str) -> Result<()>;
}

/// Host, port range, and priority range of a registration.
pub fn validate_controller(controller: &Controller) -> Result<()> {
    validate_name("controller", controller.name())?;
    let spec = &controller.spec;
    if spec.host.trim().is_empty() {
        return Err(OrchError::validation(format!(
            "controller {} has no host",
            controller.name()
        )));
    }
    if spec.port == 0 || spec.port > u32::from(u16::MAX) {
        return Err(OrchError::validation(format!(
            "controller {} port {} is outside (0, 65535]",
            controller.name(),
            spec.port
        )));
    }
    if !(MIN_CONTROLLER_PRIORITY..=MAX_CONTROLLER_PRIORITY).contains(&spec.priority) {
        return Err(OrchError::validation(format!(
            "controller {} priority {} is outside [{MIN_CONTROLLER_PRIORITY}, {MAX_CONTROLLER_PRIORITY}]",
            controller.name(),
            spec.priority
        )));
    }
    Ok(())
}

pub struct ControllerClient {
    store: Arc<dyn DocumentStore>,
}

impl ControllerClient {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ControllerManager for ControllerClient {
    async fn create_controller(&self, controller: &Controller) -> Result<Controller> {
        validate_controller(controller)?;
        self.store
            .create(
                CONTROLLER_COLLECTION,
                &controller_key(controller.name()),
                tags::CONTROLLER,
                &to_value(controller)?,
                &[],
            )
            .await?;
        tracing::info!(
            controller = %controller.name(),
            kind = %controller.spec.controller_type,
            priority = controller.spec.priority,
            endpoint = %controller.endpoint(),
            "Controller registered"
        );
        Ok(controller.clone())
    }

    async fn get_controller(&self, name: &str) -> Result<Controller> {
        get_as(self.store.as_ref(), CONTROLLER_COLLECTION, &controller_key(name), tags::CONTROLLER, || {
            format!("controller {name}")
        })
        .await
    }

    async fn list_controllers(&self) -> Result<Vec<Controller>> {
        list_as(self.store.as_ref(), CONTROLLER_COLLECTION, &controller_key(""), tags::CONTROLLER).await
    }

    async fn update_controller(&self, name: &str, controller: &Controller) -> Result<Controller> {
        check_update_name("controller", name, controller.name())?;
        validate_controller(controller)?;
        self.get_controller(name).await?;
        self.store
            .insert(CONTROLLER_COLLECTION, &controller_key(name), tags::CONTROLLER, &to_value(controller)?)
            .await?;
        Ok(controller.clone())
    }

    async fn delete_controller(&self, name: &str) -> Result<()> {
        self.store.remove(CONTROLLER_COLLECTION, &controller_key(name)).await?;
        tracing::info!(controller = %name, "Controller removed");
        Ok(())
    }
}
