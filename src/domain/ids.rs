//! Identifier newtypes.
//!
//! Grounded on the `message_router::domain_types` id pattern (`MessageId`,
//! `ConversationId`, `NodeId`): a `Uuid`-backed wrapper with a `generate()`
//! constructor, plus a string-backed id where the wire format calls for a
//! caller-supplied value rather than a generated one.

use nutype::nutype;
use uuid::Uuid;

/// Globally-unique identifier of a proxy or provider instance.
#[nutype(derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Display, Serialize, Deserialize
))]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    /// Generates a fresh random participant id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Unique identifier of a single message.
#[nutype(derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Display, Serialize, Deserialize
))]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generates a fresh random message id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Correlates an outbound request with its eventual reply.
#[nutype(derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Display, Serialize, Deserialize
))]
pub struct RequestReplyId(Uuid);

impl RequestReplyId {
    /// Generates a fresh random request-reply id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Identifier of an active subscription, either caller-supplied (from a
/// subscription request) or generated locally.
#[nutype(
    sanitize(trim),
    validate(len_char_min = 1, len_char_max = 256),
    derive(Clone, Debug, Eq, PartialEq, Hash, Display, Serialize, Deserialize)
)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Generates a fresh random subscription id.
    #[must_use]
    pub fn generate() -> Self {
        Self::try_new(Uuid::new_v4().to_string()).expect("uuid string is always valid")
    }
}

/// `providerParticipantId/broadcastName[/partition…]` fan-out channel id.
#[nutype(
    sanitize(trim),
    validate(len_char_min = 1, len_char_max = 1024),
    derive(Clone, Debug, Eq, PartialEq, Hash, Display, Serialize, Deserialize)
)]
pub struct MulticastId(String);

impl MulticastId {
    /// Builds a multicast id from a provider, broadcast name, and ordered
    /// partition segments, per the grammar in the glossary.
    ///
    /// # Errors
    ///
    /// Returns an error if the assembled id fails length validation.
    pub fn build(
        provider_id: &ParticipantId,
        broadcast_name: &str,
        partitions: &[String],
    ) -> Result<Self, SubscriptionIdError> {
        let mut id = format!("{provider_id}/{broadcast_name}");
        for partition in partitions {
            id.push('/');
            id.push_str(partition);
        }
        Self::try_new(id)
    }
}

/// Identifier of a cluster controller node, used for the global directory's
/// liveness beacon (`touch`).
#[nutype(derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Display, Serialize, Deserialize
))]
pub struct ClusterControllerId(Uuid);

impl ClusterControllerId {
    /// Generates a fresh random cluster controller id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Re-exported so callers building a [`MulticastId`] can name the error type
/// without reaching into the nutype-generated module path.
pub type SubscriptionIdError = MulticastIdError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_ids_are_unique() {
        assert_ne!(ParticipantId::generate(), ParticipantId::generate());
    }

    #[test]
    fn multicast_id_joins_provider_name_and_partitions() {
        let provider = ParticipantId::generate();
        let id = MulticastId::build(
            &provider,
            "locationUpdate",
            &["north".to_string(), "+".to_string()],
        )
        .unwrap();
        assert_eq!(id.as_ref(), &format!("{provider}/locationUpdate/north/+"));
    }
}
