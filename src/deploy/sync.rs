use async_trait::async_trait;

use crate::error::Result;

/// Hand-off to the engine that reconciles a context into clusters.
///
/// Implementations report rejections as `SyncFailed`.
#[async_trait]
pub trait SyncEngine: Send + Sync {
    /// Start reconciling a context. Progress is observed through the context.
    async fn install(&self, context_id: &str) -> Result<()>;

    async fn uninstall(&self, context_id: &str) -> Result<()>;

    /// Move the deployment from one context to another.
    async fn update(&self, from_context_id: &str, to_context_id: &str) -> Result<()>;
}
