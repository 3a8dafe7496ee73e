//! C8 — Publication Manager.
//!
//! Provider-side counterpart to the Subscription Manager: qos bounds and
//! cross-field invariants are already enforced by
//! [`crate::domain::qos`]'s smart constructors, so this component's job is
//! wiring, not re-validating. It persists one JSON record per subscription
//! (§6c) so registrations survive restarts, and schedules on-change
//! coalescing, periodic, keep-alive, alert, and expiry timers through C5.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::domain::message::{now_ms, CustomHeaders, EffortLevel, MessageParams};
use crate::domain::{
    Message, MessageType, MulticastId, ParticipantId, SubscriptionId, SubscriptionQos,
    HEADER_ERROR, HEADER_MULTICAST_ID, HEADER_SUBSCRIPTION_ID,
};
use crate::persistence::{JsonRecordStore, JsonRecordStoreError};
use crate::router::MessageRouter;
use crate::scheduler::{DelayedScheduler, ScheduleHandle};

/// Errors raised by the publication manager.
#[derive(Debug, Error)]
pub enum PublicationError {
    /// The subscription id was not found.
    #[error("unknown publication subscription {0}")]
    UnknownSubscription(SubscriptionId),
    /// The persisted record could not be read, written, or removed.
    #[error(transparent)]
    Persistence(#[from] JsonRecordStoreError),
}

/// Provider-side collaborator the publication manager reads values from and
/// registers change callbacks with.
pub trait ProviderCaller: Send + Sync {
    /// Reads the current serialized value of `attribute_or_broadcast_name`,
    /// used for periodic ticks and keep-alive publications.
    fn read_value(&self, attribute_or_broadcast_name: &str) -> Vec<u8>;

    /// Registers `on_change` to be invoked with the new serialized value
    /// whenever `attribute_or_broadcast_name` changes or a broadcast fires.
    fn subscribe_to_changes(
        &self,
        attribute_or_broadcast_name: &str,
        on_change: Arc<dyn Fn(Vec<u8>) + Send + Sync>,
    );
}

/// Request to start publishing for one subscription.
pub struct PublicationRequest {
    /// The subscription id, shared with the consumer's Subscription Manager.
    pub subscription_id: SubscriptionId,
    /// The provider whose value is being published.
    pub provider_id: ParticipantId,
    /// The consumer receiving unicast publications (ignored for multicast
    /// qos, where fan-out is resolved by the router's receiver set).
    pub consumer_id: ParticipantId,
    /// Name of the attribute or broadcast being published.
    pub attribute_or_broadcast_name: String,
    /// The subscription's qos.
    pub qos: SubscriptionQos,
}

#[derive(Clone, Serialize, Deserialize)]
struct PublicationRecordData {
    provider_id: ParticipantId,
    consumer_id: ParticipantId,
    attribute_or_broadcast_name: String,
    qos: SubscriptionQos,
}

/// Which wire header correlates a published message back to its
/// subscription: a plain subscription id for unicast qos, or the full
/// multicast channel id for [`SubscriptionQos::Multicast`].
enum PublicationCorrelation {
    Subscription(SubscriptionId),
    Multicast(MulticastId),
}

impl PublicationCorrelation {
    fn stamp(&self, headers: &mut CustomHeaders) {
        match self {
            Self::Subscription(id) => {
                headers.insert(HEADER_SUBSCRIPTION_ID.to_string(), id.to_string());
            }
            Self::Multicast(id) => {
                headers.insert(HEADER_MULTICAST_ID.to_string(), id.to_string());
            }
        }
    }
}

/// Shared publish path for one subscription: builds and routes the message,
/// tracking when the last one went out so coalescing and keep-alive ticks
/// can compare against it. `stopped` is shared with the
/// [`PublicationEntry`] that owns this subscription's timers, so
/// [`PublicationManager::remove`] disables every future publication in one
/// store, including ones already in flight from a provider change callback.
struct PublicationState {
    router: Arc<MessageRouter>,
    stopped: Arc<AtomicBool>,
    last_published_ms: AtomicU64,
    provider_id: ParticipantId,
    consumer_id: ParticipantId,
    message_type: MessageType,
    publication_ttl_ms: u64,
    correlation: PublicationCorrelation,
}

impl PublicationState {
    fn publish(&self, value: Vec<u8>) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let mut headers = CustomHeaders::new();
        self.correlation.stamp(&mut headers);
        let Ok(message) = Message::try_new(MessageParams {
            sender: self.provider_id,
            recipient: self.consumer_id,
            message_type: self.message_type,
            expiry_ms: now_ms() + self.publication_ttl_ms,
            effort: EffortLevel::Assured,
            reply_to: None,
            headers,
            encrypt: false,
            compress: false,
            payload: value,
        }) else {
            return;
        };
        self.last_published_ms.store(now_ms(), Ordering::SeqCst);
        let router = Arc::clone(&self.router);
        tokio::spawn(async move {
            router.route(message, 0).await;
        });
    }
}

/// A self-rescheduling tick: fires `body`, then schedules its own next run,
/// storing the current handle so it can be cancelled from outside.
struct RecurringTick {
    scheduler: Arc<DelayedScheduler>,
    interval_ms: u64,
    handle: Mutex<Option<ScheduleHandle>>,
    stopped: AtomicBool,
    body: Box<dyn Fn() + Send + Sync>,
}

impl RecurringTick {
    fn start(scheduler: Arc<DelayedScheduler>, interval_ms: u64, body: Box<dyn Fn() + Send + Sync>) -> Arc<Self> {
        let tick = Arc::new(Self {
            scheduler,
            interval_ms,
            handle: Mutex::new(None),
            stopped: AtomicBool::new(false),
            body,
        });
        Arc::clone(&tick).reschedule();
        tick
    }

    fn fire(self: Arc<Self>) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        (self.body)();
        self.reschedule();
    }

    fn reschedule(self: Arc<Self>) {
        let next = Arc::clone(&self);
        let handle = self.scheduler.schedule(self.interval_ms, move || next.fire());
        *self.handle.lock().expect("recurring tick poisoned") = Some(handle);
    }

    fn cancel(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().expect("recurring tick poisoned").take() {
            self.scheduler.unschedule(handle);
        }
    }
}

struct PublicationEntry {
    periodic_tick: Option<Arc<RecurringTick>>,
    keep_alive_tick: Option<Arc<RecurringTick>>,
    on_change_handle: Arc<Mutex<Option<ScheduleHandle>>>,
    alert_tick: Option<Arc<RecurringTick>>,
    expiry_handle: ScheduleHandle,
    stopped: Arc<AtomicBool>,
}

/// Manages provider-side publication wiring for every active subscription
/// this CC's providers serve.
pub struct PublicationManager {
    scheduler: Arc<DelayedScheduler>,
    router: Arc<MessageRouter>,
    records: Arc<JsonRecordStore<PublicationRecordData>>,
    entries: DashMap<SubscriptionId, PublicationEntry>,
}

impl PublicationManager {
    /// Builds a publication manager persisting records under `record_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PublicationError`] if `record_dir` cannot be created.
    pub fn new(
        scheduler: Arc<DelayedScheduler>,
        router: Arc<MessageRouter>,
        record_dir: std::path::PathBuf,
    ) -> Result<Arc<Self>, PublicationError> {
        Ok(Arc::new(Self {
            scheduler,
            router,
            records: Arc::new(JsonRecordStore::open(record_dir)?),
            entries: DashMap::new(),
        }))
    }

    /// Starts publishing for `request`, persisting a record and wiring
    /// listeners/timers per the qos variant.
    ///
    /// # Errors
    ///
    /// Returns [`PublicationError::Persistence`] if the record cannot be
    /// written to disk.
    #[instrument(skip(self, provider, request), fields(subscription_id = %request.subscription_id))]
    pub fn add(
        self: &Arc<Self>,
        request: PublicationRequest,
        provider: Arc<dyn ProviderCaller>,
    ) -> Result<(), PublicationError> {
        self.records.put(
            request.subscription_id.as_ref(),
            &PublicationRecordData {
                provider_id: request.provider_id,
                consumer_id: request.consumer_id,
                attribute_or_broadcast_name: request.attribute_or_broadcast_name.clone(),
                qos: request.qos.clone(),
            },
        )?;
        self.wire(
            request.subscription_id,
            provider,
            request.provider_id,
            request.consumer_id,
            request.attribute_or_broadcast_name,
            request.qos,
            MessageType::Publication,
        );
        Ok(())
    }

    fn wire(
        self: &Arc<Self>,
        subscription_id: SubscriptionId,
        provider: Arc<dyn ProviderCaller>,
        provider_id: ParticipantId,
        consumer_id: ParticipantId,
        name: String,
        qos: SubscriptionQos,
        message_type: MessageType,
    ) {
        if let SubscriptionQos::Multicast(multicast_qos) = &qos {
            let unicast = multicast_qos.unicast().clone();
            let partitions = multicast_qos.partitions().to_vec();
            let correlation = MulticastId::build(&provider_id, &name, &partitions)
                .map(PublicationCorrelation::Multicast)
                .unwrap_or_else(|_| PublicationCorrelation::Subscription(subscription_id.clone()));
            self.wire_correlated(
                subscription_id,
                provider,
                provider_id,
                consumer_id,
                name,
                unicast,
                MessageType::Multicast,
                correlation,
            );
            return;
        }

        let correlation = PublicationCorrelation::Subscription(subscription_id.clone());
        self.wire_correlated(
            subscription_id,
            provider,
            provider_id,
            consumer_id,
            name,
            qos,
            message_type,
            correlation,
        );
    }

    fn wire_correlated(
        self: &Arc<Self>,
        subscription_id: SubscriptionId,
        provider: Arc<dyn ProviderCaller>,
        provider_id: ParticipantId,
        consumer_id: ParticipantId,
        name: String,
        qos: SubscriptionQos,
        message_type: MessageType,
        correlation: PublicationCorrelation,
    ) {
        let publication_ttl_ms = match &qos {
            SubscriptionQos::OnChange(q) => q.publication_ttl().into_inner(),
            SubscriptionQos::OnChangeWithKeepAlive(q) => q.publication_ttl().into_inner(),
            SubscriptionQos::Periodic(q) => q.publication_ttl().into_inner(),
            SubscriptionQos::Multicast(_) => unreachable!("multicast unwrapped by caller"),
        };

        let stopped = Arc::new(AtomicBool::new(false));
        let state = Arc::new(PublicationState {
            router: Arc::clone(&self.router),
            stopped: Arc::clone(&stopped),
            last_published_ms: AtomicU64::new(0),
            provider_id,
            consumer_id,
            message_type,
            publication_ttl_ms,
            correlation,
        });

        let mut on_change_handle = None;
        let mut periodic_tick = None;
        let mut keep_alive_tick = None;

        match &qos {
            SubscriptionQos::OnChange(q) => {
                on_change_handle = Some(self.wire_on_change(
                    Arc::clone(&provider),
                    Arc::clone(&state),
                    name.clone(),
                    q.min_interval().into_inner(),
                ));
            }
            SubscriptionQos::OnChangeWithKeepAlive(q) => {
                on_change_handle = Some(self.wire_on_change(
                    Arc::clone(&provider),
                    Arc::clone(&state),
                    name.clone(),
                    q.min_interval().into_inner(),
                ));
                let interval = q.max_interval().into_inner().max(1);
                let tick_state = Arc::clone(&state);
                let tick_provider = Arc::clone(&provider);
                let tick_name = name.clone();
                let body: Box<dyn Fn() + Send + Sync> = Box::new(move || {
                    let elapsed =
                        now_ms().saturating_sub(tick_state.last_published_ms.load(Ordering::SeqCst));
                    if elapsed >= interval {
                        let value = tick_provider.read_value(&tick_name);
                        tick_state.publish(value);
                    }
                });
                keep_alive_tick = Some(RecurringTick::start(Arc::clone(&self.scheduler), interval, body));
            }
            SubscriptionQos::Periodic(q) => {
                let interval = q.period().into_inner().max(1);
                let tick_state = Arc::clone(&state);
                let tick_provider = Arc::clone(&provider);
                let tick_name = name.clone();
                let body: Box<dyn Fn() + Send + Sync> = Box::new(move || {
                    let value = tick_provider.read_value(&tick_name);
                    tick_state.publish(value);
                });
                periodic_tick = Some(RecurringTick::start(Arc::clone(&self.scheduler), interval, body));
            }
            SubscriptionQos::Multicast(_) => unreachable!("multicast unwrapped by caller"),
        }

        let alert_tick = qos.alert_after_interval_ms().filter(|ms| *ms > 0).map(|ms| {
            let tick_state = Arc::clone(&state);
            let router = Arc::clone(&self.router);
            let id = subscription_id.clone();
            let consumer = consumer_id;
            let provider = provider_id;
            let body: Box<dyn Fn() + Send + Sync> = Box::new(move || {
                let elapsed =
                    now_ms().saturating_sub(tick_state.last_published_ms.load(Ordering::SeqCst));
                if elapsed < ms {
                    return;
                }
                tracing::warn!(subscription_id = %id, "no publication sent within alertAfterInterval");
                let mut headers = CustomHeaders::new();
                headers.insert(HEADER_SUBSCRIPTION_ID.to_string(), id.to_string());
                headers.insert(HEADER_ERROR.to_string(), "missed publication".to_string());
                let Ok(message) = Message::try_new(MessageParams {
                    sender: provider,
                    recipient: consumer,
                    message_type: MessageType::Publication,
                    expiry_ms: now_ms() + ms,
                    effort: EffortLevel::Assured,
                    reply_to: None,
                    headers,
                    encrypt: false,
                    compress: false,
                    payload: Vec::new(),
                }) else {
                    return;
                };
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    router.route(message, 0).await;
                });
            });
            RecurringTick::start(Arc::clone(&self.scheduler), ms, body)
        });

        let manager_for_expiry = Arc::clone(self);
        let id_for_expiry = subscription_id.clone();
        let expiry_delay = qos.expiry_ms().saturating_sub(now_ms());
        let expiry_handle = self.scheduler.schedule(expiry_delay, move || {
            manager_for_expiry.remove(&id_for_expiry);
        });

        self.entries.insert(
            subscription_id,
            PublicationEntry {
                periodic_tick,
                keep_alive_tick,
                on_change_handle: on_change_handle.unwrap_or_else(|| Arc::new(Mutex::new(None))),
                alert_tick,
                expiry_handle,
                stopped,
            },
        );
    }

    /// Wires an on-change callback that coalesces bursts of changes into at
    /// most one publication per `min_interval_ms`, returning a handle cell
    /// that always holds the currently-pending coalescing timer (if any),
    /// updated on every reschedule so [`PublicationManager::remove`] can
    /// cancel whichever one is live.
    fn wire_on_change(
        self: &Arc<Self>,
        provider: Arc<dyn ProviderCaller>,
        state: Arc<PublicationState>,
        name: String,
        min_interval_ms: u64,
    ) -> Arc<Mutex<Option<ScheduleHandle>>> {
        let scheduler = Arc::clone(&self.scheduler);
        let pending_value: Arc<Mutex<Option<Vec<u8>>>> = Arc::new(Mutex::new(None));
        let tick_scheduled = Arc::new(AtomicBool::new(false));
        let current_handle: Arc<Mutex<Option<ScheduleHandle>>> = Arc::new(Mutex::new(None));

        provider.subscribe_to_changes(&name, {
            let state = Arc::clone(&state);
            let pending_value = Arc::clone(&pending_value);
            let tick_scheduled = Arc::clone(&tick_scheduled);
            let scheduler = Arc::clone(&scheduler);
            let current_handle = Arc::clone(&current_handle);
            Arc::new(move |value: Vec<u8>| {
                if state.stopped.load(Ordering::SeqCst) {
                    return;
                }
                let elapsed = now_ms().saturating_sub(state.last_published_ms.load(Ordering::SeqCst));
                if elapsed >= min_interval_ms {
                    state.publish(value);
                    return;
                }
                *pending_value.lock().expect("publication state poisoned") = Some(value);
                if tick_scheduled
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    let state = Arc::clone(&state);
                    let pending_value = Arc::clone(&pending_value);
                    let tick_scheduled = Arc::clone(&tick_scheduled);
                    let current_handle = Arc::clone(&current_handle);
                    let handle = scheduler.schedule(min_interval_ms - elapsed, move || {
                        tick_scheduled.store(false, Ordering::SeqCst);
                        *current_handle.lock().expect("publication state poisoned") = None;
                        if let Some(value) = pending_value.lock().expect("publication state poisoned").take() {
                            state.publish(value);
                        }
                    });
                    *current_handle.lock().expect("publication state poisoned") = Some(handle);
                }
            })
        });
        current_handle
    }

    /// Cancels every timer for `subscription_id`, stops further
    /// publications (including any already scheduled from a provider change
    /// callback holding this subscription's [`PublicationState`]), and
    /// removes the persisted record.
    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub fn remove(&self, subscription_id: &SubscriptionId) {
        let Some((_, entry)) = self.entries.remove(subscription_id) else {
            return;
        };
        entry.stopped.store(true, Ordering::SeqCst);
        self.scheduler.unschedule(entry.expiry_handle);
        if let Some(tick) = entry.alert_tick {
            tick.cancel();
        }
        if let Some(handle) = entry.on_change_handle.lock().expect("publication entry poisoned").take() {
            self.scheduler.unschedule(handle);
        }
        if let Some(tick) = entry.periodic_tick {
            tick.cancel();
        }
        if let Some(tick) = entry.keep_alive_tick {
            tick.cancel();
        }
        if let Err(err) = self.records.remove(subscription_id.as_ref()) {
            tracing::warn!(error = %err, "failed to remove persisted publication record");
        }
    }

    /// Number of subscriptions currently wired for publication.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no subscriptions are currently wired.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageId;
    use crate::domain::qos::{MinIntervalMs, OnChangeQos, PublicationTtlMs};
    use crate::message_queue::{MessageQueue, MessageQueueCaps};
    use crate::router::RetryPolicy;
    use crate::routing_table::RoutingTable;
    use crate::stub_factory::StubFactory;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    struct StubProvider {
        callback: StdMutex<Option<Arc<dyn Fn(Vec<u8>) + Send + Sync>>>,
        value: StdMutex<Vec<u8>>,
    }

    impl ProviderCaller for StubProvider {
        fn read_value(&self, _name: &str) -> Vec<u8> {
            self.value.lock().unwrap().clone()
        }

        fn subscribe_to_changes(&self, _name: &str, on_change: Arc<dyn Fn(Vec<u8>) + Send + Sync>) {
            *self.callback.lock().unwrap() = Some(on_change);
        }
    }

    fn build_manager(dir: std::path::PathBuf) -> (Arc<PublicationManager>, Arc<MessageRouter>) {
        let scheduler = DelayedScheduler::new(4);
        let routing_table = Arc::new(RoutingTable::new());
        let queue = Arc::new(MessageQueue::new(MessageQueueCaps {
            global_byte_cap: 1_000_000,
            global_count_cap: 1_000,
            per_key_count_cap: 1_000,
        }));
        let stub_factory = Arc::new(StubFactory::new());
        let router = MessageRouter::new(
            routing_table,
            queue,
            stub_factory,
            Arc::clone(&scheduler),
            RetryPolicy::default(),
        );
        let manager = PublicationManager::new(scheduler, Arc::clone(&router), dir).unwrap();
        (manager, router)
    }

    #[tokio::test]
    async fn remove_stops_subsequent_on_change_publications() {
        use crate::domain::Address;
        use crate::stub_factory::InProcessFactory;
        use tokio::sync::mpsc;

        let dir = tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = DelayedScheduler::new(4);
        let routing_table = Arc::new(RoutingTable::new());
        let queue = Arc::new(MessageQueue::new(MessageQueueCaps {
            global_byte_cap: 1_000_000,
            global_count_cap: 1_000,
            per_key_count_cap: 1_000,
        }));
        let stub_factory = Arc::new(StubFactory::new());
        stub_factory.register_middleware_factory(Arc::new(InProcessFactory::new(tx)));
        let router = MessageRouter::new(
            routing_table,
            queue,
            stub_factory,
            Arc::clone(&scheduler),
            RetryPolicy::default(),
        );
        let consumer_id = ParticipantId::generate();
        router.add_next_hop(consumer_id, Address::InProcess, false, u64::MAX, false).await;
        let manager = PublicationManager::new(scheduler, Arc::clone(&router), dir.path().join("pub")).unwrap();

        let provider = Arc::new(StubProvider {
            callback: StdMutex::new(None),
            value: StdMutex::new(vec![1]),
        });
        let subscription_id = SubscriptionId::generate();
        manager
            .add(
                PublicationRequest {
                    subscription_id: subscription_id.clone(),
                    provider_id: ParticipantId::generate(),
                    consumer_id,
                    attribute_or_broadcast_name: "speed".to_string(),
                    qos: SubscriptionQos::OnChange(OnChangeQos::new(
                        MinIntervalMs::try_new(0).unwrap(),
                        now_ms() + 60_000,
                        PublicationTtlMs::try_new(1000).unwrap(),
                    )),
                },
                provider.clone(),
            )
            .unwrap();
        let callback = provider.callback.lock().unwrap().clone().unwrap();

        callback(vec![1, 2, 3]);
        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.recipient(), consumer_id);

        manager.remove(&subscription_id);
        callback(vec![4, 5, 6]);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err(), "no publication should be routed after remove");
    }

    #[tokio::test]
    async fn on_change_publishes_and_remove_clears_state() {
        let dir = tempdir().unwrap();
        let (manager, _router) = build_manager(dir.path().join("pub"));
        let provider = Arc::new(StubProvider {
            callback: StdMutex::new(None),
            value: StdMutex::new(vec![1, 2, 3]),
        });
        let subscription_id = SubscriptionId::generate();
        manager
            .add(
                PublicationRequest {
                    subscription_id: subscription_id.clone(),
                    provider_id: ParticipantId::generate(),
                    consumer_id: ParticipantId::generate(),
                    attribute_or_broadcast_name: "speed".to_string(),
                    qos: SubscriptionQos::OnChange(OnChangeQos::new(
                        MinIntervalMs::try_new(0).unwrap(),
                        now_ms() + 60_000,
                        PublicationTtlMs::try_new(1000).unwrap(),
                    )),
                },
                provider.clone(),
            )
            .unwrap();
        assert_eq!(manager.len(), 1);
        let callback = provider.callback.lock().unwrap().clone().unwrap();
        callback(vec![4, 5, 6]);
        manager.remove(&subscription_id);
        assert!(manager.is_empty());
        let _ = MessageId::generate();
    }

    #[tokio::test]
    async fn remove_clears_persisted_record() {
        let dir = tempdir().unwrap();
        let record_dir = dir.path().join("pub");
        let (manager, _router) = build_manager(record_dir.clone());
        let provider = Arc::new(StubProvider {
            callback: StdMutex::new(None),
            value: StdMutex::new(vec![9]),
        });
        let subscription_id = SubscriptionId::generate();
        manager
            .add(
                PublicationRequest {
                    subscription_id: subscription_id.clone(),
                    provider_id: ParticipantId::generate(),
                    consumer_id: ParticipantId::generate(),
                    attribute_or_broadcast_name: "odometer".to_string(),
                    qos: SubscriptionQos::OnChange(OnChangeQos::new(
                        MinIntervalMs::try_new(0).unwrap(),
                        now_ms() + 60_000,
                        PublicationTtlMs::try_new(1000).unwrap(),
                    )),
                },
                provider,
            )
            .unwrap();
        manager.remove(&subscription_id);
        let store: JsonRecordStore<PublicationRecordData> = JsonRecordStore::open(record_dir).unwrap();
        assert!(store.get(subscription_id.as_ref()).unwrap().is_none());
    }
}
