//! C9 — Subscription Manager.
//!
//! Consumer-side bookkeeping: stores `(listener, qos)` per subscription id,
//! schedules the missed-publication and expiry timers through C5, and
//! answers the Dispatcher's multicast fan-out query with wildcard-aware
//! matching (`+` one segment, `*` only as the final segment — the same
//! grammar [`crate::domain::qos::MulticastQos`] validates on the provider
//! side).

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::instrument;

use crate::domain::{Message, MulticastId, ParticipantId, SubscriptionId, SubscriptionQos};
use crate::scheduler::{DelayedScheduler, ScheduleHandle};

/// Errors raised by the subscription manager.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// The subscription id was not found (already unregistered or expired).
    #[error("unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),
    /// A multicast partition path failed the grammar check (see
    /// [`crate::domain::qos::InvalidPartitionError`]).
    #[error(transparent)]
    InvalidPartition(#[from] crate::domain::qos::InvalidPartitionError),
}

/// Lifecycle state of a registered subscription (§4.10 summary table).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubscriptionState {
    /// Publications are delivered as they arrive.
    Active,
    /// An on-change event fired before `minInterval` elapsed; queued.
    PausedByMinInterval,
    /// Unsubscribed or expired; no further outbound activity.
    Stopped,
}

/// Callbacks a subscriber provides when registering.
pub trait SubscriptionListener: Send + Sync {
    /// A publication arrived for this subscription.
    fn on_receive(&self, message: Message);
    /// The missed-publication alert fired, or a provider-side error arrived.
    fn on_error(&self, subscription_id: &SubscriptionId);
    /// The subscription was unregistered, locally or by expiry.
    fn on_unsubscribed(&self, subscription_id: &SubscriptionId);
}

struct SubscriptionEntry {
    listener: Arc<dyn SubscriptionListener>,
    qos: SubscriptionQos,
    state: std::sync::Mutex<SubscriptionState>,
    missed_publication_handle: std::sync::Mutex<Option<ScheduleHandle>>,
    expiry_handle: ScheduleHandle,
}

/// Tracks this CC's consumer-side subscriptions.
pub struct SubscriptionManager {
    scheduler: Arc<DelayedScheduler>,
    subscriptions: DashMap<SubscriptionId, SubscriptionEntry>,
    multicast_index: DashMap<MulticastId, SubscriptionId>,
}

impl SubscriptionManager {
    /// Builds an empty subscription manager scheduling timers through
    /// `scheduler`.
    #[must_use]
    pub fn new(scheduler: Arc<DelayedScheduler>) -> Arc<Self> {
        Arc::new(Self {
            scheduler,
            subscriptions: DashMap::new(),
            multicast_index: DashMap::new(),
        })
    }

    /// Registers an attribute/broadcast subscription, assigning a fresh id
    /// if `requested_id` is `None`. Schedules the missed-publication timer
    /// (if the qos enables alerting) and the expiry timer.
    #[instrument(skip(self, listener, qos), fields(requested_id = ?requested_id))]
    pub fn register_subscription(
        self: &Arc<Self>,
        listener: Arc<dyn SubscriptionListener>,
        qos: SubscriptionQos,
        requested_id: Option<SubscriptionId>,
    ) -> SubscriptionId {
        let subscription_id = requested_id.unwrap_or_else(SubscriptionId::generate);
        self.install(subscription_id.clone(), listener, qos);
        subscription_id
    }

    /// Registers a multicast subscription, computing the multicast id as
    /// `providerId/name[/partition…]` and indexing it for
    /// [`Self::get_subscription_listeners`].
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::InvalidPartition`] if a partition
    /// segment fails the grammar check.
    #[instrument(skip(self, listener, qos), fields(provider_id = %provider_id, name = name))]
    pub fn register_multicast_subscription(
        self: &Arc<Self>,
        name: &str,
        provider_id: ParticipantId,
        partitions: &[String],
        listener: Arc<dyn SubscriptionListener>,
        qos: SubscriptionQos,
        requested_id: Option<SubscriptionId>,
    ) -> Result<SubscriptionId, SubscriptionError> {
        validate_partitions(partitions)?;
        let multicast_id = MulticastId::build(&provider_id, name, partitions).map_err(|_| {
            crate::domain::qos::InvalidPartitionError {
                segment: partitions.join("/"),
                index: 0,
            }
        })?;
        let subscription_id = requested_id.unwrap_or_else(SubscriptionId::generate);
        self.install(subscription_id.clone(), listener, qos);
        self.multicast_index.insert(multicast_id, subscription_id.clone());
        Ok(subscription_id)
    }

    fn install(
        self: &Arc<Self>,
        subscription_id: SubscriptionId,
        listener: Arc<dyn SubscriptionListener>,
        qos: SubscriptionQos,
    ) {
        let manager_for_expiry = Arc::clone(self);
        let id_for_expiry = subscription_id.clone();
        let expiry_delay = qos.expiry_ms().saturating_sub(crate::domain::message::now_ms());
        let expiry_handle = self.scheduler.schedule(expiry_delay, move || {
            manager_for_expiry.unregister_subscription(&id_for_expiry);
        });

        let missed_publication_handle = qos.alert_after_interval_ms().filter(|ms| *ms > 0).map(|ms| {
            self.schedule_missed_publication_timer(subscription_id.clone(), ms)
        });

        self.subscriptions.insert(
            subscription_id,
            SubscriptionEntry {
                listener,
                qos,
                state: std::sync::Mutex::new(SubscriptionState::Active),
                missed_publication_handle: std::sync::Mutex::new(missed_publication_handle),
                expiry_handle,
            },
        );
    }

    /// Schedules a recurring alert: fires `on_error` every `delay_ms` for as
    /// long as the subscription stays registered and nothing resets it via
    /// [`Self::touch_subscription_state`]. Each firing reschedules itself
    /// and stores its own handle so [`Self::unregister_subscription`] or a
    /// subsequent reset can cancel the live one.
    fn schedule_missed_publication_timer(
        self: &Arc<Self>,
        subscription_id: SubscriptionId,
        delay_ms: u64,
    ) -> ScheduleHandle {
        let manager = Arc::clone(self);
        self.scheduler.schedule(delay_ms, move || {
            let Some(entry) = manager.subscriptions.get(&subscription_id) else {
                return;
            };
            entry.listener.on_error(&subscription_id);
            drop(entry);
            let next_handle =
                manager.schedule_missed_publication_timer(subscription_id.clone(), delay_ms);
            if let Some(entry) = manager.subscriptions.get(&subscription_id) {
                *entry
                    .missed_publication_handle
                    .lock()
                    .expect("subscription lock poisoned") = Some(next_handle);
            } else {
                manager.scheduler.unschedule(next_handle);
            }
        })
    }

    /// Cancels timers, removes the record, and fires `on_unsubscribed`.
    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub fn unregister_subscription(&self, subscription_id: &SubscriptionId) {
        let Some((_, entry)) = self.subscriptions.remove(subscription_id) else {
            return;
        };
        *entry.state.lock().expect("subscription lock poisoned") = SubscriptionState::Stopped;
        self.scheduler.unschedule(entry.expiry_handle);
        if let Some(handle) = entry
            .missed_publication_handle
            .lock()
            .expect("subscription lock poisoned")
            .take()
        {
            self.scheduler.unschedule(handle);
        }
        self.multicast_index.retain(|_, id| id != subscription_id);
        entry.listener.on_unsubscribed(subscription_id);
    }

    /// Resets the missed-publication timer for `subscription_id`; called on
    /// every inbound publication for that id.
    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub fn touch_subscription_state(self: &Arc<Self>, subscription_id: &SubscriptionId) {
        let Some(entry) = self.subscriptions.get(subscription_id) else {
            return;
        };
        *entry.state.lock().expect("subscription lock poisoned") = SubscriptionState::Active;
        let Some(delay_ms) = entry.qos.alert_after_interval_ms().filter(|ms| *ms > 0) else {
            return;
        };
        let mut handle_slot = entry
            .missed_publication_handle
            .lock()
            .expect("subscription lock poisoned");
        if let Some(old_handle) = handle_slot.take() {
            self.scheduler.unschedule(old_handle);
        }
        drop(handle_slot);
        let new_handle = self.schedule_missed_publication_timer(subscription_id.clone(), delay_ms);
        if let Some(entry) = self.subscriptions.get(subscription_id) {
            *entry
                .missed_publication_handle
                .lock()
                .expect("subscription lock poisoned") = Some(new_handle);
        }
    }

    /// Delivers `message` to the listener registered for `subscription_id`,
    /// resetting its missed-publication timer. Used by the Dispatcher for
    /// unicast publications; multicast fan-out instead goes through
    /// [`Self::get_subscription_listeners`]. Returns `false` if the
    /// subscription is unknown (already unregistered or expired).
    #[instrument(skip(self, message), fields(subscription_id = %subscription_id))]
    pub fn deliver(self: &Arc<Self>, subscription_id: &SubscriptionId, message: Message) -> bool {
        let Some(entry) = self.subscriptions.get(subscription_id) else {
            return false;
        };
        let listener = entry.listener.clone();
        drop(entry);
        self.touch_subscription_state(subscription_id);
        listener.on_receive(message);
        true
    }

    /// Returns every subscription listener whose registered multicast
    /// pattern matches `multicast_id`, for the Dispatcher to fan out one
    /// inbound multicast publication.
    #[must_use]
    pub fn get_subscription_listeners(
        &self,
        multicast_id: &str,
    ) -> Vec<Arc<dyn SubscriptionListener>> {
        let topic_segments: Vec<&str> = multicast_id.split('/').collect();
        self.multicast_index
            .iter()
            .filter(|entry| topic_matches(entry.key().as_ref(), &topic_segments))
            .filter_map(|entry| self.subscriptions.get(entry.value()).map(|e| e.listener.clone()))
            .collect()
    }

    /// Current state of `subscription_id`, if registered.
    #[must_use]
    pub fn state_of(&self, subscription_id: &SubscriptionId) -> Option<SubscriptionState> {
        self.subscriptions
            .get(subscription_id)
            .map(|entry| *entry.state.lock().expect("subscription lock poisoned"))
    }
}

/// Validates partition segments against the grammar used by
/// [`crate::domain::qos::MulticastQos`]: alphanumeric literal, single-level
/// wildcard `+`, or multi-level wildcard `*` only as the final segment.
fn validate_partitions(partitions: &[String]) -> Result<(), crate::domain::qos::InvalidPartitionError> {
    let last = partitions.len().saturating_sub(1);
    for (index, segment) in partitions.iter().enumerate() {
        let is_valid = if segment == "+" {
            true
        } else if segment == "*" {
            index == last
        } else {
            !segment.is_empty() && segment.chars().all(|c| c.is_ascii_alphanumeric())
        };
        if !is_valid {
            return Err(crate::domain::qos::InvalidPartitionError {
                segment: segment.clone(),
                index,
            });
        }
    }
    Ok(())
}

fn topic_matches(pattern: &str, topic: &[&str]) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let mut p = 0;
    let mut t = 0;
    while p < pattern_segments.len() {
        match pattern_segments[p] {
            "*" => return true,
            "+" => {
                if t >= topic.len() {
                    return false;
                }
                p += 1;
                t += 1;
            }
            literal => {
                if topic.get(t) != Some(&literal) {
                    return false;
                }
                p += 1;
                t += 1;
            }
        }
    }
    t == topic.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{CustomHeaders, EffortLevel, MessageParams, MessageType};
    use crate::domain::qos::{OnChangeQos, MinIntervalMs, PublicationTtlMs};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct RecordingListener {
        received: AtomicUsize,
        errors: AtomicUsize,
        unsubscribed: AtomicUsize,
    }

    impl RecordingListener {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                received: AtomicUsize::new(0),
                errors: AtomicUsize::new(0),
                unsubscribed: AtomicUsize::new(0),
            })
        }
    }

    impl SubscriptionListener for RecordingListener {
        fn on_receive(&self, _message: Message) {
            self.received.fetch_add(1, Ordering::SeqCst);
        }
        fn on_error(&self, _subscription_id: &SubscriptionId) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        fn on_unsubscribed(&self, _subscription_id: &SubscriptionId) {
            self.unsubscribed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn on_change_qos(expiry_ms: u64) -> SubscriptionQos {
        SubscriptionQos::OnChange(OnChangeQos::new(
            MinIntervalMs::try_new(0).unwrap(),
            expiry_ms,
            PublicationTtlMs::try_new(1000).unwrap(),
        ))
    }

    #[tokio::test]
    async fn unregister_fires_on_unsubscribed_and_removes_record() {
        let scheduler = DelayedScheduler::new(2);
        let manager = SubscriptionManager::new(scheduler);
        let listener = RecordingListener::new();
        let id = manager.register_subscription(
            listener.clone(),
            on_change_qos(crate::domain::message::now_ms() + 60_000),
            None,
        );
        manager.unregister_subscription(&id);
        assert_eq!(listener.unsubscribed.load(Ordering::SeqCst), 1);
        assert!(manager.state_of(&id).is_none());
    }

    #[tokio::test]
    async fn missed_publication_alert_recurs_until_unsubscribe() {
        use crate::domain::qos::{AlertAfterIntervalMs, MaxIntervalMs, OnChangeWithKeepAliveQos};

        let scheduler = DelayedScheduler::new(2);
        let manager = SubscriptionManager::new(scheduler);
        let listener = RecordingListener::new();
        let qos = SubscriptionQos::OnChangeWithKeepAlive(
            OnChangeWithKeepAliveQos::try_new(
                MinIntervalMs::try_new(0).unwrap(),
                MaxIntervalMs::try_new(10).unwrap(),
                AlertAfterIntervalMs::try_new(10).unwrap(),
                crate::domain::message::now_ms() + 60_000,
                PublicationTtlMs::try_new(1000).unwrap(),
            )
            .unwrap(),
        );
        let id = manager.register_subscription(listener.clone(), qos, None);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let fired_before_unsubscribe = listener.errors.load(Ordering::SeqCst);
        assert!(fired_before_unsubscribe >= 2, "alert must recur, not fire once");

        manager.unregister_subscription(&id);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(
            listener.errors.load(Ordering::SeqCst),
            fired_before_unsubscribe,
            "alert must stop firing once unsubscribed"
        );
    }

    #[tokio::test]
    async fn expiry_timer_auto_unregisters() {
        let scheduler = DelayedScheduler::new(2);
        let manager = SubscriptionManager::new(scheduler);
        let listener = RecordingListener::new();
        let id = manager.register_subscription(
            listener.clone(),
            on_change_qos(crate::domain::message::now_ms() + 20),
            None,
        );
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(listener.unsubscribed.load(Ordering::SeqCst), 1);
        assert!(manager.state_of(&id).is_none());
    }

    #[test]
    fn wildcard_plus_matches_single_segment() {
        assert!(topic_matches("provider1/event/+", &["provider1", "event", "north"]));
        assert!(!topic_matches("provider1/event/+", &["provider1", "event", "north", "extra"]));
    }

    #[test]
    fn wildcard_star_matches_remaining_segments() {
        assert!(topic_matches("provider1/event/*", &["provider1", "event", "north", "extra"]));
        assert!(topic_matches("provider1/event/*", &["provider1", "event"]));
    }

    #[tokio::test]
    async fn multicast_fan_out_matches_registered_pattern() {
        let scheduler = DelayedScheduler::new(2);
        let manager = SubscriptionManager::new(scheduler);
        let listener = RecordingListener::new();
        let provider = ParticipantId::generate();
        manager
            .register_multicast_subscription(
                "event",
                provider,
                &["+".to_string()],
                listener.clone(),
                on_change_qos(crate::domain::message::now_ms() + 60_000),
                None,
            )
            .unwrap();

        let matches = manager.get_subscription_listeners(&format!("{provider}/event/north"));
        assert_eq!(matches.len(), 1);

        let message = Message::try_new(MessageParams {
            sender: provider,
            recipient: ParticipantId::generate(),
            message_type: MessageType::Multicast,
            expiry_ms: u64::MAX,
            effort: EffortLevel::Assured,
            reply_to: None,
            headers: CustomHeaders::new(),
            encrypt: false,
            compress: false,
            payload: Vec::new(),
        })
        .unwrap();
        matches[0].on_receive(message);
        assert_eq!(listener.received.load(Ordering::SeqCst), 1);
    }
}
