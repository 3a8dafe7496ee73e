//! MQTT transport: delivers to a peer reachable on a fixed broker/topic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tracing::warn;

use super::{MessageStub, MiddlewareFactory, StubError};
use crate::domain::{Address, Message};

/// Builds [`MqttStub`]s, caching one [`AsyncClient`] (and its background
/// event loop) per distinct broker URL; multiple topics on the same broker
/// share a connection.
pub struct MqttFactory {
    clients: DashMap<String, AsyncClient>,
}

impl MqttFactory {
    /// Builds an empty factory with no open broker connections.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    fn client_for(&self, broker_url: &str) -> AsyncClient {
        if let Some(client) = self.clients.get(broker_url) {
            return client.clone();
        }
        let (host, port) = parse_broker_url(broker_url);
        let client_id = format!("ccmp-{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(30));
        let (client, mut event_loop) = AsyncClient::new(options, 64);
        tokio::spawn(async move {
            loop {
                if let Err(err) = event_loop.poll().await {
                    warn!(error = %err, "mqtt event loop terminated");
                    break;
                }
            }
        });
        self.clients.insert(broker_url.to_string(), client.clone());
        client
    }
}

impl Default for MqttFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_broker_url(broker_url: &str) -> (String, u16) {
    let without_scheme = broker_url.split("://").next_back().unwrap_or(broker_url);
    match without_scheme.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(1883)),
        None => (without_scheme.to_string(), 1883),
    }
}

#[async_trait]
impl MiddlewareFactory for MqttFactory {
    fn can_create(&self, address: &Address) -> bool {
        matches!(address, Address::Mqtt { .. })
    }

    async fn create(&self, address: &Address) -> Result<Arc<dyn MessageStub>, StubError> {
        let Address::Mqtt { broker_url, topic } = address else {
            return Err(StubError::NoFactoryForAddress { kind: address.kind() });
        };
        let client = self.client_for(broker_url);
        Ok(Arc::new(MqttStub {
            client,
            topic: topic.clone(),
        }))
    }
}

/// Publishes messages to one broker/topic pair.
pub struct MqttStub {
    client: AsyncClient,
    topic: String,
}

#[async_trait]
impl MessageStub for MqttStub {
    async fn send(&self, message: Message) -> Result<(), StubError> {
        let payload =
            serde_json::to_vec(&message).map_err(|err| StubError::Transport(err.to_string()))?;
        self.client
            .publish(&self.topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|err| StubError::Transport(err.to_string()))
    }
}
