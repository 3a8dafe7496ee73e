//! The wire-level message envelope.
//!
//! Grounded on `message_router::domain_types::FipaMessage` and its smart
//! constructor `try_new_validated` / `MessageParticipants` pattern: illegal
//! states (missing ids, non-monotonic expiry) are rejected at construction,
//! never checked ad hoc at each call site.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{MessageId, ParticipantId};

/// One of the ten message type tags carried in every envelope.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// A request awaiting a reply.
    Request,
    /// A reply correlated to a prior request.
    Reply,
    /// Fire-and-forget, no reply expected.
    OneWay,
    /// Attribute or broadcast subscription request.
    SubscriptionRequest,
    /// Multicast (broadcast fan-out) subscription request.
    MulticastSubscriptionRequest,
    /// Broadcast subscription request with filter parameters.
    BroadcastSubscriptionRequest,
    /// Acknowledgement of a subscription request.
    SubscriptionReply,
    /// Consumer-initiated unsubscribe.
    SubscriptionStop,
    /// An attribute or broadcast value delivered to a subscriber.
    Publication,
    /// A multicast publication delivered to all registered receivers.
    Multicast,
}

/// Relative priority a transport may use for queueing; not a qos concept.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub enum EffortLevel {
    /// Best-effort, may be dropped under load.
    Normal,
    /// Must be delivered or explicitly fail; the default.
    #[default]
    Assured,
}

/// Arbitrary caller-supplied headers, distinct from the envelope's own
/// routing/expiry metadata.
pub type CustomHeaders = HashMap<String, String>;

/// Header key correlating a request with its reply.
pub const HEADER_REQUEST_REPLY_ID: &str = "requestReplyId";
/// Header key correlating a publication/subscription-stop with its subscription.
pub const HEADER_SUBSCRIPTION_ID: &str = "subscriptionId";
/// Header key naming which multicast channel a [`MessageType::Multicast`]
/// message targets, shared by the Dispatcher (which stamps it) and the
/// Router (which scopes fan-out to it).
pub const HEADER_MULTICAST_ID: &str = "multicastId";
/// Header key carrying a human-readable failure reason on an error reply.
pub const HEADER_ERROR: &str = "error";

/// Errors raised by [`Message::try_new`].
#[derive(Debug, Error)]
pub enum MessageError {
    /// Sender and recipient must differ; routing a message to oneself
    /// through the transport plane is a programming error upstream.
    #[error("message sender and recipient must not be the same participant")]
    SenderIsRecipient,
}

/// Constructor parameters for [`Message::try_new`].
pub struct MessageParams {
    /// Message parameters: sender.
    pub sender: ParticipantId,
    /// Message parameters: recipient.
    pub recipient: ParticipantId,
    /// Message parameters: type tag.
    pub message_type: MessageType,
    /// Message parameters: absolute expiry, ms since epoch UTC.
    pub expiry_ms: u64,
    /// Message parameters: effort level.
    pub effort: EffortLevel,
    /// Message parameters: optional serialized reply-to address.
    pub reply_to: Option<String>,
    /// Message parameters: custom headers.
    pub headers: CustomHeaders,
    /// Message parameters: encrypt flag.
    pub encrypt: bool,
    /// Message parameters: compress flag.
    pub compress: bool,
    /// Message parameters: opaque payload, never inspected by the core.
    pub payload: Vec<u8>,
}

/// An immutable message envelope as routed by the message plane.
///
/// The core only ever reads headers (sender, recipient, type, expiry); the
/// `payload` is an opaque byte string produced and consumed by the external
/// wire codec (see `SPEC_FULL.md` §10.5).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    message_id: MessageId,
    sender: ParticipantId,
    recipient: ParticipantId,
    message_type: MessageType,
    expiry_ms: u64,
    effort: EffortLevel,
    reply_to: Option<String>,
    headers: CustomHeaders,
    encrypt: bool,
    compress: bool,
    payload: Vec<u8>,
}

impl Message {
    /// Builds a new message, assigning a fresh message id.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::SenderIsRecipient`] if sender and recipient
    /// are the same participant.
    pub fn try_new(params: MessageParams) -> Result<Self, MessageError> {
        if params.sender == params.recipient {
            return Err(MessageError::SenderIsRecipient);
        }
        Ok(Self {
            message_id: MessageId::generate(),
            sender: params.sender,
            recipient: params.recipient,
            message_type: params.message_type,
            expiry_ms: params.expiry_ms,
            effort: params.effort,
            reply_to: params.reply_to,
            headers: params.headers,
            encrypt: params.encrypt,
            compress: params.compress,
            payload: params.payload,
        })
    }

    /// The message's unique id.
    #[must_use]
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// The sending participant.
    #[must_use]
    pub fn sender(&self) -> ParticipantId {
        self.sender
    }

    /// The intended recipient.
    #[must_use]
    pub fn recipient(&self) -> ParticipantId {
        self.recipient
    }

    /// The message type tag.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Absolute expiry, ms since epoch UTC.
    #[must_use]
    pub fn expiry_ms(&self) -> u64 {
        self.expiry_ms
    }

    /// The effort level.
    #[must_use]
    pub fn effort(&self) -> EffortLevel {
        self.effort
    }

    /// The serialized reply-to address, if any.
    #[must_use]
    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    /// Custom headers.
    #[must_use]
    pub fn headers(&self) -> &CustomHeaders {
        &self.headers
    }

    /// The opaque payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Whether this message requests encryption on the wire.
    #[must_use]
    pub fn encrypt(&self) -> bool {
        self.encrypt
    }

    /// Whether this message requests compression on the wire.
    #[must_use]
    pub fn compress(&self) -> bool {
        self.compress
    }

    /// True if `now_ms` is at or past this message's expiry.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expiry_ms <= now_ms
    }
}

/// Milliseconds since the Unix epoch, for comparison against message expiry.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the epoch")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(sender: ParticipantId, recipient: ParticipantId) -> MessageParams {
        MessageParams {
            sender,
            recipient,
            message_type: MessageType::Request,
            expiry_ms: now_ms() + 60_000,
            effort: EffortLevel::Assured,
            reply_to: None,
            headers: CustomHeaders::new(),
            encrypt: false,
            compress: false,
            payload: b"hello".to_vec(),
        }
    }

    #[test]
    fn rejects_sender_equal_to_recipient() {
        let id = ParticipantId::generate();
        let err = Message::try_new(params(id, id)).unwrap_err();
        assert!(matches!(err, MessageError::SenderIsRecipient));
    }

    #[test]
    fn accepts_distinct_sender_and_recipient() {
        let msg = Message::try_new(params(ParticipantId::generate(), ParticipantId::generate()))
            .unwrap();
        assert_eq!(msg.message_type(), MessageType::Request);
        assert!(!msg.is_expired(now_ms()));
    }

    #[test]
    fn expiry_is_inclusive_of_now() {
        let mut p = params(ParticipantId::generate(), ParticipantId::generate());
        p.expiry_ms = now_ms();
        let msg = Message::try_new(p).unwrap();
        assert!(msg.is_expired(now_ms() + 1));
    }
}
