//! HTTP long-poll channel transport: delivers by posting to a channel
//! endpoint, keyed by a channel id header.

use std::sync::Arc;

use async_trait::async_trait;

use super::{MessageStub, MiddlewareFactory, StubError};
use crate::domain::{Address, Message};

/// Builds [`HttpStub`]s sharing a single `reqwest` client across every HTTP
/// channel address.
pub struct HttpFactory {
    client: reqwest::Client,
}

impl HttpFactory {
    /// Builds a factory using a freshly constructed `reqwest` client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MiddlewareFactory for HttpFactory {
    fn can_create(&self, address: &Address) -> bool {
        matches!(address, Address::HttpChannel { .. })
    }

    async fn create(&self, address: &Address) -> Result<Arc<dyn MessageStub>, StubError> {
        let Address::HttpChannel { url, channel_id } = address else {
            return Err(StubError::NoFactoryForAddress { kind: address.kind() });
        };
        Ok(Arc::new(HttpStub {
            client: self.client.clone(),
            url: url.clone(),
            channel_id: channel_id.clone(),
        }))
    }
}

/// Posts messages to one HTTP long-poll channel.
pub struct HttpStub {
    client: reqwest::Client,
    url: String,
    channel_id: String,
}

#[async_trait]
impl MessageStub for HttpStub {
    async fn send(&self, message: Message) -> Result<(), StubError> {
        let response = self
            .client
            .post(&self.url)
            .header("x-ccmp-channel-id", &self.channel_id)
            .json(&message)
            .send()
            .await
            .map_err(|err| StubError::Transport(err.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(StubError::Transport(format!(
                "http channel returned status {}",
                response.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn can_create_only_accepts_http_channel_addresses() {
        let factory = HttpFactory::new();
        assert!(factory.can_create(&Address::HttpChannel {
            url: "https://example.com/channel".into(),
            channel_id: "c1".into(),
        }));
        assert!(!factory.can_create(&Address::InProcess));
    }
}
