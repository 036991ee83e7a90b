use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::pool::RpcConnections;
use super::proto::installapp::installapp_client::InstallappClient;
use super::proto::installapp::{InstallAppRequest, UninstallAppRequest};
use super::proto::updateapp::updateapp_client::UpdateappClient;
use super::proto::updateapp::UpdateAppRequest;
use crate::config::ServiceEndpoint;
use crate::deploy::SyncEngine;
use crate::error::{OrchError, Result};
use crate::registry::ControllerManager;

/// gRPC client of the sync engine. The endpoint comes from the controller
/// registry, or from the service environment when the sync engine is not
/// registered.
pub struct RsyncClient {
    pool: RpcConnections,
    controllers: Arc<dyn ControllerManager>,
    name: String,
}

impl RsyncClient {
    pub fn new(pool: RpcConnections, controllers: Arc<dyn ControllerManager>, name: impl Into<String>) -> Self {
        Self {
            pool,
            controllers,
            name: name.into(),
        }
    }

    async fn channel(&self) -> Result<tonic::transport::Channel> {
        let endpoint = resolve_endpoint(self.controllers.as_ref(), &self.name).await?;
        self.pool
            .channel(&self.name, &endpoint)
            .await
            .map_err(|e| self.failed("connect", e))
    }

    fn failed(&self, method: &str, err: OrchError) -> OrchError {
        OrchError::SyncFailed(format!("{method} on {}: {err}", self.name))
    }
}

/// Registered endpoint of controller `name`, else the one its service
/// environment variables describe.
pub async fn resolve_endpoint(controllers: &dyn ControllerManager, name: &str) -> Result<String> {
    match controllers.get_controller(name).await {
        Ok(controller) => Ok(controller.endpoint()),
        Err(e) if e.is_not_found() => Ok(ServiceEndpoint::from_env(name).uri()),
        Err(e) => Err(e),
    }
}

fn refused(accepted: bool, method: &str, context_id: &str, message: String) -> Result<()> {
    if accepted {
        return Ok(());
    }
    let message = if message.is_empty() {
        "no reason given".to_string()
    } else {
        message
    };
    Err(OrchError::SyncFailed(format!(
        "{method} refused context {context_id}: {message}"
    )))
}

#[async_trait]
impl SyncEngine for RsyncClient {
    async fn install(&self, context_id: &str) -> Result<()> {
        info!(sync = %self.name, context_id, "Installing context");
        let mut client = InstallappClient::new(self.channel().await?);
        let response = self
            .pool
            .call(
                &self.name,
                "InstallApp",
                client.install_app(InstallAppRequest {
                    app_context: context_id.to_string(),
                }),
            )
            .await
            .map_err(|e| self.failed("InstallApp", e))?;
        refused(
            response.app_context_installed,
            "InstallApp",
            context_id,
            response.app_context_install_message,
        )
    }

    async fn uninstall(&self, context_id: &str) -> Result<()> {
        info!(sync = %self.name, context_id, "Uninstalling context");
        let mut client = InstallappClient::new(self.channel().await?);
        let response = self
            .pool
            .call(
                &self.name,
                "UninstallApp",
                client.uninstall_app(UninstallAppRequest {
                    app_context: context_id.to_string(),
                }),
            )
            .await
            .map_err(|e| self.failed("UninstallApp", e))?;
        refused(
            response.app_context_uninstalled,
            "UninstallApp",
            context_id,
            response.app_context_uninstall_message,
        )
    }

    async fn update(&self, from_context_id: &str, to_context_id: &str) -> Result<()> {
        info!(sync = %self.name, from = from_context_id, to = to_context_id, "Updating context");
        let mut client = UpdateappClient::new(self.channel().await?);
        let response = self
            .pool
            .call(
                &self.name,
                "UpdateApp",
                client.update_app(UpdateAppRequest {
                    update_from_app_context: from_context_id.to_string(),
                    update_to_app_context: to_context_id.to_string(),
                }),
            )
            .await
            .map_err(|e| self.failed("UpdateApp", e))?;
        refused(
            response.app_context_updated,
            "UpdateApp",
            to_context_id,
            response.app_context_update_message,
        )
    }
}
