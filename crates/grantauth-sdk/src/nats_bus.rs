//! Broadcast bus over a NATS subject.
//!
//! Lets contexts in separate processes hear each other. Plain core-NATS
//! publish/subscribe: at-most-once, which is all the protocol asks for.

use async_trait::async_trait;
use futures::StreamExt;
use grantauth_models::AuthEvent;
use tracing::warn;

use crate::bus::{BroadcastBus, EventStream};
use crate::error::BusError;
use crate::keys::StorageKeys;

/// [`BroadcastBus`] on `grantauth.v1.{namespace}.auth.events`.
#[derive(Debug, Clone)]
pub struct NatsBus {
    client: async_nats::Client,
    subject: String,
}

impl NatsBus {
    /// Use an existing NATS connection.
    pub fn new(client: async_nats::Client, namespace: &str) -> Self {
        Self {
            client,
            subject: StorageKeys::events_subject(namespace),
        }
    }

    /// Connect to `nats_url` and bind to `namespace`.
    pub async fn connect(nats_url: &str, namespace: &str) -> Result<Self, BusError> {
        let client = async_nats::connect(nats_url).await?;
        Ok(Self::new(client, namespace))
    }

    /// The subject events travel on.
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[async_trait]
impl BroadcastBus for NatsBus {
    async fn publish(&self, event: &AuthEvent) -> Result<(), BusError> {
        let bytes = serde_json::to_vec(event)?;
        self.client
            .publish(self.subject.clone(), bytes.into())
            .await?;
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Nats(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<EventStream, BusError> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        let events = subscriber.filter_map(|message| async move {
            match serde_json::from_slice::<AuthEvent>(&message.payload) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "ignoring malformed auth event");
                    None
                }
            }
        });
        Ok(events.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grantauth_models::{ContextId, Identity};

    #[tokio::test]
    #[ignore = "needs a running NATS server"]
    async fn test_publish_reaches_subscriber() {
        let bus = NatsBus::connect("nats://localhost:4222", "test_namespace")
            .await
            .expect("Failed to connect to NATS server");
        let mut events = bus.subscribe().await.expect("subscribe");

        let event = AuthEvent::completed(ContextId::random(), Identity::new("0xabc"), true);
        bus.publish(&event).await.expect("publish");
        assert_eq!(events.next().await, Some(event));
    }

    #[tokio::test]
    async fn connect_to_unreachable_server_fails() {
        let result = NatsBus::connect("nats://127.0.0.1:1", "test_namespace").await;
        assert!(matches!(result, Err(BusError::Nats(_))));
    }
}
