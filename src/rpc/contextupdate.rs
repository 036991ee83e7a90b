use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

use super::proto::contextupdate::contextupdate_server::{Contextupdate, ContextupdateServer};
use super::proto::contextupdate::{ContextUpdateRequest, ContextUpdateResponse};
use crate::error::Result;

/// What an action controller does when asked to apply an intent to a
/// context.
#[async_trait]
pub trait ContextUpdateHandler: Send + Sync + 'static {
    async fn update_app_context(&self, intent_name: &str, context_id: &str) -> Result<()>;
}

/// Serves the `Contextupdate` service over a handler.
///
/// The RPC itself never fails: handler errors come back as
/// `app_context_updated = false` with the error as the message.
pub struct ContextUpdateService<H> {
    handler: Arc<H>,
}

impl<H: ContextUpdateHandler> ContextUpdateService<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    pub fn into_server(self) -> ContextupdateServer<Self> {
        ContextupdateServer::new(self)
    }

    /// Serve on `addr` until `shutdown` resolves.
    pub async fn serve(
        handler: Arc<H>,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<()> {
        info!(addr = %addr, "Serving Contextupdate");
        tonic::transport::Server::builder()
            .add_service(Self::new(handler).into_server())
            .serve_with_shutdown(addr, shutdown)
            .await
            .with_context(|| format!("Contextupdate server on {addr}"))?;
        Ok(())
    }
}

#[tonic::async_trait]
impl<H: ContextUpdateHandler> Contextupdate for ContextUpdateService<H> {
    async fn update_app_context(
        &self,
        request: Request<ContextUpdateRequest>,
    ) -> std::result::Result<Response<ContextUpdateResponse>, Status> {
        let req = request.into_inner();
        let reply = match self
            .handler
            .update_app_context(&req.intent_name, &req.app_context)
            .await
        {
            Ok(()) => ContextUpdateResponse {
                app_context_updated: true,
                app_context_update_message: format!(
                    "context {} updated for intent {}",
                    req.app_context, req.intent_name
                ),
            },
            Err(e) => {
                warn!(context_id = %req.app_context, intent = %req.intent_name, error = %e, "Context update failed");
                ContextUpdateResponse {
                    app_context_updated: false,
                    app_context_update_message: e.to_string(),
                }
            }
        };
        Ok(Response::new(reply))
    }
}
