//! WebSocket transport: outbound connections to peer cluster controllers
//! (`WebSocketServer` addresses) and delivery back to consumers already
//! connected to this cluster controller as clients (`WebSocketClient`
//! addresses).

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::warn;

use super::{MessageStub, MiddlewareFactory, StubError};
use crate::domain::{Address, Message};

/// Builds stubs for both directions of the WebSocket transport.
///
/// Delivery to an already-connected `WebSocketClient` is routed through
/// `client_senders`, populated by the component that accepts inbound
/// WebSocket connections (outside the scope of this factory). Delivery to
/// a `WebSocketServer` peer opens (and caches, via the owning
/// [`super::StubFactory`]) a new outbound connection.
pub struct WebSocketFactory {
    client_senders: Arc<DashMap<String, mpsc::UnboundedSender<Message>>>,
}

impl WebSocketFactory {
    /// Builds a factory sharing `client_senders` with the inbound-connection
    /// acceptor.
    #[must_use]
    pub fn new(client_senders: Arc<DashMap<String, mpsc::UnboundedSender<Message>>>) -> Self {
        Self { client_senders }
    }
}

#[async_trait]
impl MiddlewareFactory for WebSocketFactory {
    fn can_create(&self, address: &Address) -> bool {
        matches!(address, Address::WebSocketClient { .. } | Address::WebSocketServer { .. })
    }

    async fn create(&self, address: &Address) -> Result<Arc<dyn MessageStub>, StubError> {
        match address {
            Address::WebSocketClient { connection_id } => {
                let sender = self
                    .client_senders
                    .get(connection_id)
                    .map(|entry| entry.value().clone())
                    .ok_or(StubError::ConnectionClosed { kind: "websocket-client" })?;
                Ok(Arc::new(WebSocketStub { outbound: sender }))
            }
            Address::WebSocketServer { url } => {
                let (stream, _response) = connect_async(url)
                    .await
                    .map_err(|err| StubError::Transport(err.to_string()))?;
                let (mut writer, mut reader) = stream.split();
                let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

                tokio::spawn(async move {
                    while let Some(message) = rx.recv().await {
                        let payload = match serde_json::to_vec(&message) {
                            Ok(bytes) => bytes,
                            Err(err) => {
                                warn!(error = %err, "failed to encode outbound websocket message");
                                continue;
                            }
                        };
                        if writer.send(WsMessage::Binary(payload.into())).await.is_err() {
                            break;
                        }
                    }
                });
                // The reader half is drained so the underlying connection stays
                // alive; inbound frames on an outbound peer connection are
                // handed to the dispatcher by the acceptor side of the
                // transport, not this stub.
                tokio::spawn(async move { while reader.next().await.is_some() {} });

                Ok(Arc::new(WebSocketStub { outbound: tx }))
            }
            _ => Err(StubError::NoFactoryForAddress { kind: address.kind() }),
        }
    }
}

/// Forwards messages onto a single WebSocket connection's writer task.
pub struct WebSocketStub {
    outbound: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl MessageStub for WebSocketStub {
    async fn send(&self, message: Message) -> Result<(), StubError> {
        self.outbound
            .send(message)
            .map_err(|_| StubError::ConnectionClosed { kind: "websocket" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{CustomHeaders, EffortLevel, MessageParams, MessageType};
    use crate::domain::ParticipantId;

    #[tokio::test]
    async fn delivers_to_registered_client_sender() {
        let senders = Arc::new(DashMap::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        senders.insert("conn-1".to_string(), tx);
        let factory = WebSocketFactory::new(senders);

        let address = Address::WebSocketClient { connection_id: "conn-1".to_string() };
        let stub = factory.create(&address).await.unwrap();

        let message = Message::try_new(MessageParams {
            sender: ParticipantId::generate(),
            recipient: ParticipantId::generate(),
            message_type: MessageType::OneWay,
            expiry_ms: u64::MAX,
            effort: EffortLevel::Assured,
            reply_to: None,
            headers: CustomHeaders::new(),
            encrypt: false,
            compress: false,
            payload: Vec::new(),
        })
        .unwrap();
        let sent_id = message.message_id();
        stub.send(message).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().message_id(), sent_id);
    }

    #[tokio::test]
    async fn unregistered_client_connection_is_closed() {
        let senders = Arc::new(DashMap::new());
        let factory = WebSocketFactory::new(senders);
        let address = Address::WebSocketClient { connection_id: "missing".to_string() };
        let err = factory.create(&address).await.unwrap_err();
        assert!(matches!(err, StubError::ConnectionClosed { .. }));
    }
}
