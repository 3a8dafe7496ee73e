//! C4 — Message Router.
//!
//! Implements the five-step `route` algorithm: expiry check, local
//! short-circuit (folded into step 4 via the in-process stub, so a
//! recipient hosted in this process is just another routing-table entry
//! whose address happens to be [`Address::InProcess`]), queue-if-unknown,
//! stub dispatch (unicast or multicast fan-out via the receiver set
//! maintained by [`MessageRouter::add_multicast_receiver`]), and
//! exponential-backoff retry scheduled through C5.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::domain::message::now_ms;
use crate::domain::{Address, Message, MessageType, MulticastId, ParticipantId, HEADER_MULTICAST_ID};
use crate::message_queue::MessageQueue;
use crate::persistence::MulticastReceiverStore;
use crate::routing_table::RoutingTable;
use crate::scheduler::DelayedScheduler;
use crate::stub_factory::{StubError, StubFactory};

/// Errors surfaced by the router once retries (if any) are exhausted.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The message's expiry had already passed at route time.
    #[error("message {0} expired before it could be routed")]
    MessageExpired(crate::domain::MessageId),
    /// Delivery failed permanently, or all retries were exhausted.
    #[error("delivery failed after retries: {0}")]
    DeliveryFailed(#[from] StubError),
    /// A multicast message arrived without a usable `multicastId` header.
    #[error("multicast message {0} is missing or has a malformed multicastId header")]
    MissingMulticastId(crate::domain::MessageId),
}

/// Invoked once per message that the router could not deliver and will not
/// retry further, so the dispatcher/reply-caller-directory can surface a
/// failure to whoever is waiting.
pub type FailureListener = Arc<dyn Fn(Message, RouterError) + Send + Sync>;

/// Backoff parameters for retrying a transient delivery failure.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first failure.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub backoff_base_ms: u64,
    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: f64,
    /// Upper bound on the computed delay, in milliseconds.
    pub backoff_cap_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 100,
            backoff_factor: 2.0,
            backoff_cap_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    fn delay_ms(&self, try_count: u32) -> u64 {
        let scaled = (self.backoff_base_ms as f64) * self.backoff_factor.powi(try_count as i32);
        (scaled as u64).min(self.backoff_cap_ms)
    }
}

/// Decides next hops, queues undeliverable messages, dispatches through the
/// stub factory, and retries transient failures.
pub struct MessageRouter {
    routing_table: Arc<RoutingTable>,
    queue: Arc<MessageQueue>,
    stubs: Arc<StubFactory>,
    scheduler: Arc<DelayedScheduler>,
    retry_policy: RetryPolicy,
    multicast_receivers: DashMap<MulticastId, HashSet<ParticipantId>>,
    multicast_store: std::sync::RwLock<Option<Arc<MulticastReceiverStore>>>,
    failure_listener: std::sync::RwLock<Option<FailureListener>>,
}

impl MessageRouter {
    /// Builds a router over the given components.
    #[must_use]
    pub fn new(
        routing_table: Arc<RoutingTable>,
        queue: Arc<MessageQueue>,
        stubs: Arc<StubFactory>,
        scheduler: Arc<DelayedScheduler>,
        retry_policy: RetryPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            routing_table,
            queue,
            stubs,
            scheduler,
            retry_policy,
            multicast_receivers: DashMap::new(),
            multicast_store: std::sync::RwLock::new(None),
            failure_listener: std::sync::RwLock::new(None),
        })
    }

    /// Registers the callback invoked when a message cannot be delivered
    /// and no further retry will be attempted.
    pub fn set_failure_listener(&self, listener: FailureListener) {
        *self.failure_listener.write().expect("router lock poisoned") = Some(listener);
    }

    /// Replays `store`'s persisted multicast-receiver directory (§6b) into
    /// the in-memory fan-out set, then wires it in so subsequent
    /// `add_multicast_receiver`/`remove_multicast_receiver` calls persist
    /// their changes. Call once at startup, before routing begins.
    pub fn load_multicast_receiver_store(&self, store: Arc<MulticastReceiverStore>) {
        for (key, _) in store.entries() {
            if let Ok(multicast_id) = MulticastId::try_new(key) {
                let receivers = store.get(&multicast_id);
                if !receivers.is_empty() {
                    self.multicast_receivers.insert(multicast_id, receivers);
                }
            }
        }
        *self.multicast_store.write().expect("router lock poisoned") = Some(store);
    }

    fn notify_failure(&self, message: Message, error: RouterError) {
        if let Some(listener) = self
            .failure_listener
            .read()
            .expect("router lock poisoned")
            .clone()
        {
            listener(message, error);
        } else {
            warn!("dropping undeliverable message with no registered failure listener");
        }
    }

    /// Routes `message`, queueing, dispatching, or scheduling a retry as
    /// appropriate. `try_count` is zero for the original attempt.
    #[instrument(skip(self, message), fields(message_id = %message.message_id(), try_count = try_count))]
    pub async fn route(self: &Arc<Self>, message: Message, try_count: u32) {
        if message.is_expired(now_ms()) {
            self.notify_failure(message.clone(), RouterError::MessageExpired(message.message_id()));
            return;
        }

        if message.message_type() == MessageType::Multicast {
            self.route_multicast(message, try_count).await;
            return;
        }

        let recipient = message.recipient();
        let Some(entry) = self.routing_table.lookup(recipient, now_ms()) else {
            self.queue.enqueue(recipient, message);
            return;
        };

        self.dispatch_to(entry.address().clone(), message, try_count).await;
    }

    async fn route_multicast(self: &Arc<Self>, message: Message, try_count: u32) {
        let Some(multicast_id) = message
            .headers()
            .get(HEADER_MULTICAST_ID)
            .and_then(|raw| MulticastId::try_new(raw.clone()).ok())
        else {
            self.notify_failure(
                message.clone(),
                RouterError::MissingMulticastId(message.message_id()),
            );
            return;
        };

        let recipients: Vec<ParticipantId> = self
            .multicast_receivers
            .get(&multicast_id)
            .map(|receivers| receivers.iter().copied().collect())
            .unwrap_or_default();
        for recipient in recipients {
            if let Some(entry) = self.routing_table.lookup(recipient, now_ms()) {
                self.dispatch_to(entry.address().clone(), message.clone(), try_count).await;
            }
        }
    }

    async fn dispatch_to(self: &Arc<Self>, address: Address, message: Message, try_count: u32) {
        let stub = match self.stubs.create(&address).await {
            Ok(stub) => stub,
            Err(err) => {
                self.handle_failure(message, err, try_count);
                return;
            }
        };
        if let Err(err) = stub.send(message.clone()).await {
            self.handle_failure(message, err, try_count);
        }
    }

    fn handle_failure(self: &Arc<Self>, message: Message, error: StubError, try_count: u32) {
        let transient = matches!(error, StubError::Transport(_) | StubError::ConnectionClosed { .. });
        if transient && try_count < self.retry_policy.max_retries {
            let delay_ms = self.retry_policy.delay_ms(try_count);
            let router = Arc::clone(self);
            let retry_message = message;
            self.scheduler.schedule(delay_ms, move || {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    router.route(retry_message, try_count + 1).await;
                });
            });
        } else {
            self.notify_failure(message, RouterError::DeliveryFailed(error));
        }
    }

    /// Installs a routing entry (see C1) and redelivers any messages
    /// queued for `participant_id`, in their original enqueue order.
    #[instrument(skip(self, address), fields(participant_id = %participant_id))]
    pub async fn add_next_hop(
        self: &Arc<Self>,
        participant_id: ParticipantId,
        address: Address,
        is_globally_visible: bool,
        expiry_ms: u64,
        is_sticky: bool,
    ) {
        self.routing_table
            .add(participant_id, address, is_globally_visible, expiry_ms, is_sticky);
        let drained = self.queue.drain(participant_id);
        for queued in drained {
            self.route(queued, 0).await;
        }
    }

    /// Removes the routing entry for `participant_id` and discards any
    /// messages still queued for it.
    #[instrument(skip(self), fields(participant_id = %participant_id))]
    pub fn remove_next_hop(&self, participant_id: ParticipantId) {
        self.routing_table.remove(participant_id);
        let _ = self.queue.drain(participant_id);
    }

    /// Registers `subscriber_id` as a local fan-out receiver for
    /// `multicast_id`. `provider_id` forwarding to a non-local provider's
    /// routing peer is handled by the Publication Manager, which knows
    /// whether the provider is local; this method only maintains the
    /// receiver set used during fan-out.
    pub fn add_multicast_receiver(&self, multicast_id: MulticastId, subscriber_id: ParticipantId) {
        let mut entry = self.multicast_receivers.entry(multicast_id.clone()).or_default();
        entry.insert(subscriber_id);
        let snapshot = entry.clone();
        drop(entry);
        self.persist_multicast_receivers(&multicast_id, &snapshot);
    }

    /// Removes `subscriber_id` from the fan-out set for `multicast_id`.
    pub fn remove_multicast_receiver(&self, multicast_id: &MulticastId, subscriber_id: ParticipantId) {
        if let Some(mut receivers) = self.multicast_receivers.get_mut(multicast_id) {
            receivers.remove(&subscriber_id);
            let snapshot = receivers.clone();
            drop(receivers);
            self.persist_multicast_receivers(multicast_id, &snapshot);
        }
    }

    fn persist_multicast_receivers(&self, multicast_id: &MulticastId, receivers: &HashSet<ParticipantId>) {
        let Some(store) = self
            .multicast_store
            .read()
            .expect("router lock poisoned")
            .clone()
        else {
            return;
        };
        let result = if receivers.is_empty() {
            store.remove(multicast_id)
        } else {
            store.set(multicast_id, receivers)
        };
        if let Err(err) = result {
            warn!(%multicast_id, error = %err, "failed to persist multicast receiver directory");
        }
    }
}
