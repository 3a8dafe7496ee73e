//! Core data model for the message-plane: ids, messages, addresses, routing
//! entries, subscription qos, and capability entries.
//!
//! Design principles carried from the router domain types this module is
//! grounded on: make illegal states unrepresentable, parse don't validate,
//! express every primitive as a `nutype` newtype with its own invariants.

pub mod address;
pub mod capabilities;
pub mod ids;
pub mod message;
pub mod qos;
pub mod routing_entry;

pub use address::Address;
pub use capabilities::{
    ArbitrationResult, ArbitrationStrategy, LocalCapabilitiesEntry, ProviderQos, ProviderScope,
};
pub use ids::{
    ClusterControllerId, MessageId, MulticastId, ParticipantId, RequestReplyId, SubscriptionId,
};
pub use message::{
    CustomHeaders, EffortLevel, Message, MessageParams, MessageType, HEADER_ERROR,
    HEADER_MULTICAST_ID, HEADER_REQUEST_REPLY_ID, HEADER_SUBSCRIPTION_ID,
};
pub use qos::{MulticastQos, OnChangeQos, OnChangeWithKeepAliveQos, PeriodicQos, SubscriptionQos};
pub use routing_entry::RoutingEntry;
