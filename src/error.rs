//! Crate-level error composition.
//!
//! Each component defines its own `thiserror` enum scoped to its failure
//! modes (grounded on `message_router::traits::RouterError` /
//! `ConfigError` / `DeliveryError` — one enum per concern, not one
//! crate-wide error type). `CcError` composes them via
//! `#[from]` for call sites that cross component boundaries, such as the
//! dispatcher and the top-level `ClusterController`.

use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatcher::DispatcherError;
use crate::domain::message::MessageError;
use crate::domain::qos::{InvalidPartitionError, QosError};
use crate::lcd::LcdError;
use crate::persistence::PersistenceError;
use crate::publication_manager::PublicationError;
use crate::reply_caller_directory::ReplyCallerError;
use crate::router::RouterError;
use crate::stub_factory::StubError;
use crate::subscription_manager::SubscriptionError;

/// Errors that can cross a component boundary inside the cluster
/// controller.
#[derive(Debug, Error)]
pub enum CcError {
    /// A malformed message envelope (e.g. sender equals recipient).
    #[error(transparent)]
    Message(#[from] MessageError),
    /// A qos cross-field invariant was violated.
    #[error(transparent)]
    Qos(#[from] QosError),
    /// A malformed multicast partition path.
    #[error(transparent)]
    Partition(#[from] InvalidPartitionError),
    /// Routing failure (see [`RouterError`]).
    #[error(transparent)]
    Router(#[from] RouterError),
    /// Outbound stub failure (see [`StubError`]).
    #[error(transparent)]
    Stub(#[from] StubError),
    /// Subscription manager failure (see [`SubscriptionError`]).
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    /// Publication manager failure (see [`PublicationError`]).
    #[error(transparent)]
    Publication(#[from] PublicationError),
    /// Reply caller directory failure (see [`ReplyCallerError`]).
    #[error(transparent)]
    ReplyCaller(#[from] ReplyCallerError),
    /// Local capabilities directory failure (see [`LcdError`]).
    #[error(transparent)]
    Lcd(#[from] LcdError),
    /// Dispatcher failure (see [`DispatcherError`]).
    #[error(transparent)]
    Dispatch(#[from] DispatcherError),
    /// Persistence failure (see [`PersistenceError`]).
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    /// Configuration failure (see [`ConfigError`]).
    #[error(transparent)]
    Config(#[from] ConfigError),
}
