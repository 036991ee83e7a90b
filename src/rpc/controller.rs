use async_trait::async_trait;
use tracing::debug;

use super::pool::RpcConnections;
use super::proto::contextupdate::contextupdate_client::ContextupdateClient;
use super::proto::contextupdate::ContextUpdateRequest;
use super::proto::placementcontroller::placementcontroller_client::PlacementcontrollerClient;
use super::proto::placementcontroller::ResourceRequest;
use crate::deploy::{ControllerInvoker, ControllerReply};
use crate::error::Result;
use crate::registry::Controller;

/// Invokes placement and action controllers over pooled gRPC channels.
pub struct GrpcControllerInvoker {
    pool: RpcConnections,
}

impl GrpcControllerInvoker {
    pub fn new(pool: RpcConnections) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ControllerInvoker for GrpcControllerInvoker {
    async fn filter_clusters(&self, controller: &Controller, context_id: &str) -> Result<ControllerReply> {
        let name = controller.name();
        let channel = self.pool.channel(name, &controller.endpoint()).await?;
        let mut client = PlacementcontrollerClient::new(channel);
        let response = self
            .pool
            .call(
                name,
                "FilterClusters",
                client.filter_clusters(ResourceRequest {
                    app_context: context_id.to_string(),
                }),
            )
            .await?;
        debug!(controller = %name, context_id, status = response.status, "FilterClusters returned");
        Ok(ControllerReply {
            ok: response.status,
            message: response.message,
        })
    }

    async fn update_app_context(
        &self,
        controller: &Controller,
        intent_name: &str,
        context_id: &str,
    ) -> Result<ControllerReply> {
        let name = controller.name();
        let channel = self.pool.channel(name, &controller.endpoint()).await?;
        let mut client = ContextupdateClient::new(channel);
        let response = self
            .pool
            .call(
                name,
                "UpdateAppContext",
                client.update_app_context(ContextUpdateRequest {
                    intent_name: intent_name.to_string(),
                    app_context: context_id.to_string(),
                }),
            )
            .await?;
        debug!(controller = %name, context_id, intent = intent_name, updated = response.app_context_updated, "UpdateAppContext returned");
        Ok(ControllerReply {
            ok: response.app_context_updated,
            message: response.app_context_update_message,
        })
    }
}
