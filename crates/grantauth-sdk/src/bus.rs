//! Broadcast bus between execution contexts.
//!
//! Delivery is best-effort and at-most-once with no ordering across
//! publishers, so every consumer has to be idempotent. The coordinator takes
//! the bus as an `Option`: without one it relies on storage polling alone.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use grantauth_models::AuthEvent;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::BusError;

/// Stream of events received from the bus.
pub type EventStream = BoxStream<'static, AuthEvent>;

/// Same-origin publish/subscribe channel.
#[async_trait]
pub trait BroadcastBus: Send + Sync {
    /// Publish an event to every subscriber.
    async fn publish(&self, event: &AuthEvent) -> Result<(), BusError>;

    /// Subscribe to events published after this call returns.
    async fn subscribe(&self) -> Result<EventStream, BusError>;
}

const LOCAL_CAPACITY: usize = 64;

/// In-process bus for contexts living in one process.
///
/// Clones share the channel. Subscribers that fall behind lose the oldest
/// events, matching the lossy contract.
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<AuthEvent>,
}

impl LocalBus {
    /// Create a new bus.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(LOCAL_CAPACITY);
        Self { sender }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BroadcastBus for LocalBus {
    async fn publish(&self, event: &AuthEvent) -> Result<(), BusError> {
        // No subscribers is not an error.
        let _ = self.sender.send(event.clone());
        Ok(())
    }

    async fn subscribe(&self) -> Result<EventStream, BusError> {
        let receiver = self.sender.subscribe();
        let events = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((event, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "broadcast subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(events.boxed())
    }
}
