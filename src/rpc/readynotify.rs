use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tonic::transport::Channel;
use tracing::{debug, info, warn};

use super::proto::readynotify::ready_notify_client::ReadyNotifyClient;
use super::proto::readynotify::{Notification, Topic};
use crate::error::{OrchError, Result};

const EVENT_BUFFER: usize = 64;

/// A readiness notification for one context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyEvent {
    pub context_id: String,
    pub status: String,
    pub message: String,
}

impl From<Notification> for ReadyEvent {
    fn from(n: Notification) -> Self {
        Self {
            context_id: n.app_context,
            status: n.status,
            message: n.message,
        }
    }
}

/// A live subscription to the sync engine's readiness stream.
///
/// A background task holds the `Alert` stream open and re-opens it after
/// `backoff` whenever it ends or fails. Dropping the subscription stops the
/// task.
pub struct ReadySubscription {
    events: mpsc::Receiver<ReadyEvent>,
    task: JoinHandle<()>,
}

impl ReadySubscription {
    pub fn start(channel: Channel, client_name: &str, context_id: &str, backoff: Duration) -> Self {
        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let topic = Topic {
            client_name: client_name.to_string(),
            app_context: context_id.to_string(),
        };
        let task = tokio::spawn(subscribe_loop(channel, topic, backoff, tx));
        Self { events, task }
    }

    /// Next event, or `None` once the subscription task has stopped.
    pub async fn next(&mut self) -> Option<ReadyEvent> {
        self.events.recv().await
    }
}

impl Drop for ReadySubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn subscribe_loop(channel: Channel, topic: Topic, backoff: Duration, tx: mpsc::Sender<ReadyEvent>) {
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        let mut client = ReadyNotifyClient::new(channel.clone());
        match client.alert(topic.clone()).await {
            Ok(response) => {
                debug!(context_id = %topic.app_context, attempt, "Subscribed to readiness stream");
                let mut stream = response.into_inner();
                loop {
                    match stream.message().await {
                        Ok(Some(notification)) => {
                            if tx.send(ReadyEvent::from(notification)).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => {
                            debug!(context_id = %topic.app_context, "Readiness stream ended");
                            break;
                        }
                        Err(status) => {
                            warn!(context_id = %topic.app_context, error = %status.message(), "Readiness stream failed");
                            break;
                        }
                    }
                }
            }
            Err(status) => {
                warn!(context_id = %topic.app_context, attempt, error = %status.message(), "Alert subscription failed");
            }
        }

        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(backoff).await;
        info!(context_id = %topic.app_context, client = %topic.client_name, "Resubscribing to readiness stream");
    }
}

/// Drop the sync engine's subscription for `client_name` on a context.
pub async fn unsubscribe(channel: Channel, client_name: &str, context_id: &str) -> Result<bool> {
    let mut client = ReadyNotifyClient::new(channel);
    let response = client
        .unsubscribe(Topic {
            client_name: client_name.to_string(),
            app_context: context_id.to_string(),
        })
        .await
        .map_err(|status| OrchError::Backend(anyhow!("Unsubscribe failed: {}", status.message())))?
        .into_inner();
    if !response.unsubscribed {
        debug!(context_id, message = %response.message, "Unsubscribe refused");
    }
    Ok(response.unsubscribed)
}
