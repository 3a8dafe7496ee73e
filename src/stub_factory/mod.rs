//! C3 — Stub Factory.
//!
//! Grounded on a plugin-style registry pattern (an ordered list of
//! candidates consulted first-match-wins, cached by key) generalized from
//! sandbox-runtime selection to transport selection: an ordered list
//! of per-transport [`MiddlewareFactory`] implementations, each asked in
//! turn whether it can build a stub for a given [`Address`], with the
//! resulting stub cached by address so repeated sends to the same
//! destination reuse one connection.

mod http;
mod in_process;
mod mqtt;
mod websocket;

pub use http::{HttpFactory, HttpStub};
pub use in_process::{InProcessFactory, InProcessStub};
pub use mqtt::{MqttFactory, MqttStub};
pub use websocket::{WebSocketFactory, WebSocketStub};

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::instrument;

use crate::domain::{Address, Message};

/// Errors raised creating or using an outbound stub.
#[derive(Debug, Error)]
pub enum StubError {
    /// No registered middleware factory can build a stub for the given
    /// address.
    #[error("no middleware factory can create a stub for address kind {kind}")]
    NoFactoryForAddress {
        /// The address's `kind()` tag.
        kind: &'static str,
    },
    /// The underlying transport rejected or failed to deliver the message.
    #[error("transport delivery failed: {0}")]
    Transport(String),
    /// The stub's connection was closed and could not be reopened.
    #[error("connection closed for address kind {kind}")]
    ConnectionClosed {
        /// The address's `kind()` tag.
        kind: &'static str,
    },
}

/// A live, reusable handle capable of delivering messages to one address.
#[async_trait]
pub trait MessageStub: Send + Sync {
    /// Delivers `message` over this stub's transport.
    async fn send(&self, message: Message) -> Result<(), StubError>;
}

/// A transport-specific factory able to build [`MessageStub`]s for the
/// addresses it understands.
#[async_trait]
pub trait MiddlewareFactory: Send + Sync {
    /// True if this factory can build a stub for `address`.
    fn can_create(&self, address: &Address) -> bool;

    /// Builds a new stub for `address`.
    ///
    /// # Errors
    ///
    /// Returns [`StubError`] if the transport connection cannot be
    /// established.
    async fn create(&self, address: &Address) -> Result<Arc<dyn MessageStub>, StubError>;
}

/// Caches one [`MessageStub`] per distinct [`Address`], building new stubs
/// through an ordered list of registered [`MiddlewareFactory`]s.
#[derive(Default)]
pub struct StubFactory {
    factories: std::sync::RwLock<Vec<Arc<dyn MiddlewareFactory>>>,
    cache: DashMap<Address, Arc<dyn MessageStub>>,
}

impl StubFactory {
    /// Creates an empty stub factory with no registered middleware.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: std::sync::RwLock::new(Vec::new()),
            cache: DashMap::new(),
        }
    }

    /// Appends a middleware factory, consulted after all previously
    /// registered factories.
    pub fn register_middleware_factory(&self, factory: Arc<dyn MiddlewareFactory>) {
        self.factories
            .write()
            .expect("stub factory registry lock poisoned")
            .push(factory);
    }

    /// Returns the cached stub for `address`, or builds and caches one via
    /// the first registered factory that accepts it.
    ///
    /// # Errors
    ///
    /// Returns [`StubError::NoFactoryForAddress`] if no registered factory
    /// accepts `address`, or whatever error the winning factory's
    /// `create()` returns.
    #[instrument(skip(self), fields(address_kind = address.kind()))]
    pub async fn create(&self, address: &Address) -> Result<Arc<dyn MessageStub>, StubError> {
        if let Some(stub) = self.cache.get(address) {
            return Ok(stub.clone());
        }
        let candidate = {
            let factories = self.factories.read().expect("stub factory registry lock poisoned");
            factories.iter().find(|f| f.can_create(address)).cloned()
        };
        let factory = candidate.ok_or(StubError::NoFactoryForAddress { kind: address.kind() })?;
        let stub = factory.create(address).await?;
        self.cache.insert(address.clone(), stub.clone());
        Ok(stub)
    }

    /// Drops the cached stub for `address`, if any.
    pub fn remove(&self, address: &Address) {
        self.cache.remove(address);
    }

    /// True if a stub is currently cached for `address`.
    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.cache.contains_key(address)
    }
}
