use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::sync::RwLock;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info, warn};

use crate::error::{OrchError, Result};
use crate::registry::ControllerManager;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

struct PooledChannel {
    endpoint: String,
    channel: Channel,
}

/// Lazily connected channels to sub-controllers, keyed by controller name.
///
/// Channels are created on first use and rebuilt when the registered
/// endpoint changes. Calls that fail with `Unavailable` evict the channel
/// so the next call reconnects.
#[derive(Clone)]
pub struct RpcConnections {
    /// gRPC calls take the read lock, channel creation takes the write lock.
    channels: Arc<RwLock<HashMap<String, PooledChannel>>>,
    deadline: Duration,
}

impl RpcConnections {
    pub fn new(deadline: Duration) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            deadline,
        }
    }

    /// Deadline applied to every call made over a pooled channel.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// The channel for `name`, connecting to `endpoint` if the pool has no
    /// channel for it or holds one to a different address.
    pub async fn channel(&self, name: &str, endpoint: &str) -> Result<Channel> {
        // Check with read lock first (fast path)
        {
            let channels = self.channels.read().await;
            if let Some(pooled) = channels.get(name) {
                if pooled.endpoint == endpoint {
                    return Ok(pooled.channel.clone());
                }
            }
        }

        let channel = Endpoint::from_shared(endpoint.to_string())
            .with_context(|| format!("Invalid endpoint {endpoint:?} for controller {name}"))?
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(self.deadline)
            .connect_lazy();

        let mut channels = self.channels.write().await;
        if let Some(previous) = channels.insert(
            name.to_string(),
            PooledChannel {
                endpoint: endpoint.to_string(),
                channel: channel.clone(),
            },
        ) {
            if previous.endpoint != endpoint {
                info!(controller = %name, from = %previous.endpoint, to = %endpoint, "Controller endpoint changed, channel rebuilt");
            }
        } else {
            debug!(controller = %name, endpoint = %endpoint, "Channel created");
        }
        Ok(channel)
    }

    pub async fn evict(&self, name: &str) -> bool {
        let removed = self.channels.write().await.remove(name).is_some();
        if removed {
            debug!(controller = %name, "Channel evicted");
        }
        removed
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.channels.read().await.contains_key(name)
    }

    /// Open a channel for every registered controller. Returns how many
    /// channels the pool holds afterwards.
    pub async fn init_from_registry(&self, controllers: &dyn ControllerManager) -> Result<usize> {
        for controller in controllers.list_controllers().await? {
            self.channel(controller.name(), &controller.endpoint()).await?;
        }
        let count = self.channels.read().await.len();
        info!(channels = count, "Controller channels initialized");
        Ok(count)
    }

    /// Bound `call` by the pool deadline and map its failure to a backend
    /// error naming the controller and method. `Unavailable` evicts the
    /// channel.
    pub async fn call<T, F>(&self, name: &str, method: &str, call: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<tonic::Response<T>, tonic::Status>>,
    {
        match tokio::time::timeout(self.deadline, call).await {
            Err(_) => Err(OrchError::Backend(anyhow!(
                "{method} on {name} timed out after {}s",
                self.deadline.as_secs()
            ))),
            Ok(Err(status)) => {
                if status.code() == tonic::Code::Unavailable {
                    warn!(controller = %name, method, error = %status.message(), "Controller unavailable");
                    self.evict(name).await;
                }
                Err(OrchError::Backend(anyhow!(
                    "{method} on {name} failed: {} ({:?})",
                    status.message(),
                    status.code()
                )))
            }
            Ok(Ok(response)) => Ok(response.into_inner()),
        }
    }
}
