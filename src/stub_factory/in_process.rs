//! In-process transport: delivers directly into this cluster controller's
//! own dispatcher, skipping any wire encoding.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{MessageStub, MiddlewareFactory, StubError};
use crate::domain::{Address, Message};

/// Builds [`InProcessStub`]s that forward into a single shared inbound
/// channel, normally the dispatcher's own inbound queue.
pub struct InProcessFactory {
    inbound: mpsc::UnboundedSender<Message>,
}

impl InProcessFactory {
    /// Builds a factory delivering into `inbound`.
    #[must_use]
    pub fn new(inbound: mpsc::UnboundedSender<Message>) -> Self {
        Self { inbound }
    }
}

#[async_trait]
impl MiddlewareFactory for InProcessFactory {
    fn can_create(&self, address: &Address) -> bool {
        matches!(address, Address::InProcess)
    }

    async fn create(
        &self,
        _address: &Address,
    ) -> Result<std::sync::Arc<dyn MessageStub>, StubError> {
        Ok(std::sync::Arc::new(InProcessStub {
            inbound: self.inbound.clone(),
        }))
    }
}

/// Delivers a message into the owning process's own dispatcher.
pub struct InProcessStub {
    inbound: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl MessageStub for InProcessStub {
    async fn send(&self, message: Message) -> Result<(), StubError> {
        self.inbound
            .send(message)
            .map_err(|_| StubError::ConnectionClosed { kind: "in-process" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{CustomHeaders, EffortLevel, MessageParams, MessageType};
    use crate::domain::ParticipantId;

    #[tokio::test]
    async fn delivers_into_inbound_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let factory = InProcessFactory::new(tx);
        let stub = factory.create(&Address::InProcess).await.unwrap();

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

        let received = rx.recv().await.unwrap();
        assert_eq!(received.message_id(), sent_id);
    }

    #[tokio::test]
    async fn send_after_receiver_dropped_is_connection_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let factory = InProcessFactory::new(tx);
        let stub = factory.create(&Address::InProcess).await.unwrap();

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
        let err = stub.send(message).await.unwrap_err();
        assert!(matches!(err, StubError::ConnectionClosed { .. }));
    }
}
