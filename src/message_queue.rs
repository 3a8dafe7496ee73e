//! C2 — Message Queue.
//!
//! Per-recipient FIFO with a global byte cap, a global count cap, and a
//! per-key count cap (§4.2). Whichever cap is hit, the globally oldest
//! queued message (not just the oldest in the over-full key) is evicted
//! first and reported through the eviction callback, mirroring the
//! `ThroughputTracker`-style internal bookkeeping in
//! `message_router::router`, generalized to a real FIFO rather than a
//! simulated one.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::{instrument, warn};

use crate::domain::{Message, ParticipantId};

/// Why a message left the queue without being delivered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EvictionReason {
    /// A cap (global byte, global count, or per-key count) was exceeded.
    CapacityExceeded,
    /// The message's expiry was reached before it could be dequeued.
    Expired,
}

/// Invoked once per evicted message, outside the queue's internal lock.
pub type EvictionListener = Arc<dyn Fn(Message, EvictionReason) + Send + Sync>;

struct QueueState {
    by_key: HashMap<ParticipantId, VecDeque<Message>>,
    global_order: VecDeque<ParticipantId>,
    total_bytes: u64,
    total_count: u64,
}

impl QueueState {
    fn new() -> Self {
        Self {
            by_key: HashMap::new(),
            global_order: VecDeque::new(),
            total_bytes: 0,
            total_count: 0,
        }
    }

    /// Pops the globally oldest message, if any, updating totals.
    fn pop_oldest(&mut self) -> Option<Message> {
        let key = self.global_order.pop_front()?;
        let deque = self.by_key.get_mut(&key)?;
        let message = deque.pop_front()?;
        if deque.is_empty() {
            self.by_key.remove(&key);
        }
        self.total_count = self.total_count.saturating_sub(1);
        self.total_bytes = self
            .total_bytes
            .saturating_sub(message.payload().len() as u64);
        Some(message)
    }
}

/// Caps configuring a [`MessageQueue`].
#[derive(Clone, Copy, Debug)]
pub struct MessageQueueCaps {
    /// Maximum total payload bytes across every recipient.
    pub global_byte_cap: u64,
    /// Maximum total message count across every recipient.
    pub global_count_cap: u64,
    /// Maximum message count for any single recipient.
    pub per_key_count_cap: u64,
}

/// Per-recipient FIFO message queue with capacity-based and expiry-based
/// eviction.
pub struct MessageQueue {
    caps: MessageQueueCaps,
    state: Mutex<QueueState>,
    eviction_listener: Mutex<Option<EvictionListener>>,
}

impl MessageQueue {
    /// Builds an empty queue under the given caps.
    #[must_use]
    pub fn new(caps: MessageQueueCaps) -> Self {
        Self {
            caps,
            state: Mutex::new(QueueState::new()),
            eviction_listener: Mutex::new(None),
        }
    }

    /// Registers the callback invoked once per evicted message. Invoked
    /// outside the queue's internal lock, per the leaf-lock concurrency
    /// rule in §5.
    pub fn set_eviction_listener(&self, listener: EvictionListener) {
        *self.eviction_listener.lock().expect("queue lock poisoned") = Some(listener);
    }

    fn notify_evicted(&self, message: Message, reason: EvictionReason) {
        if let Some(listener) = self.eviction_listener.lock().expect("queue lock poisoned").clone()
        {
            listener(message, reason);
        }
    }

    /// Enqueues `message` under `key`, evicting the globally oldest message
    /// first if any cap would otherwise be exceeded.
    #[instrument(skip(self, message), fields(key = %key))]
    pub fn enqueue(&self, key: ParticipantId, message: Message) {
        let payload_len = message.payload().len() as u64;
        let mut evicted = Vec::new();
        {
            let mut state = self.state.lock().expect("queue lock poisoned");
            loop {
                let key_len = state.by_key.get(&key).map_or(0, VecDeque::len) as u64;
                let would_exceed_global_bytes =
                    state.total_bytes + payload_len > self.caps.global_byte_cap;
                let would_exceed_global_count = state.total_count + 1 > self.caps.global_count_cap;
                let would_exceed_per_key = key_len + 1 > self.caps.per_key_count_cap;
                if !(would_exceed_global_bytes || would_exceed_global_count || would_exceed_per_key)
                {
                    break;
                }
                match state.pop_oldest() {
                    Some(victim) => evicted.push(victim),
                    None => break,
                }
            }
            state
                .by_key
                .entry(key)
                .or_default()
                .push_back(message.clone());
            state.global_order.push_back(key);
            state.total_count += 1;
            state.total_bytes += payload_len;
        }
        for victim in evicted {
            warn!(message_id = %victim.message_id(), "evicting oldest queued message to honor capacity cap");
            self.notify_evicted(victim, EvictionReason::CapacityExceeded);
        }
    }

    /// Pops and returns the oldest queued message for `key`, if any.
    #[instrument(skip(self), fields(key = %key))]
    pub fn dequeue(&self, key: ParticipantId) -> Option<Message> {
        let mut state = self.state.lock().expect("queue lock poisoned");
        let deque = state.by_key.get_mut(&key)?;
        let message = deque.pop_front()?;
        if deque.is_empty() {
            state.by_key.remove(&key);
        }
        state.total_count = state.total_count.saturating_sub(1);
        state.total_bytes = state
            .total_bytes
            .saturating_sub(message.payload().len() as u64);
        // The corresponding global_order slot for this key is lazily
        // dropped: it is skipped over the next time it reaches the front
        // of global_order during an eviction sweep, since by_key no longer
        // holds a message to pop for a stale slot referring to an empty or
        // already-drained key run. To keep global_order's length bounded we
        // eagerly drop one matching stale entry here if it is at the front.
        if state.global_order.front() == Some(&key) && !state.by_key.contains_key(&key) {
            state.global_order.pop_front();
        }
        Some(message)
    }

    /// Removes and returns every message currently queued for `key`, in
    /// FIFO order, without firing the eviction callback — used when a next
    /// hop becomes known (drain-then-redeliver) or is removed
    /// (drain-then-discard).
    #[instrument(skip(self), fields(key = %key))]
    pub fn drain(&self, key: ParticipantId) -> Vec<Message> {
        let mut state = self.state.lock().expect("queue lock poisoned");
        let Some(mut deque) = state.by_key.remove(&key) else {
            return Vec::new();
        };
        for message in &deque {
            state.total_count = state.total_count.saturating_sub(1);
            state.total_bytes = state
                .total_bytes
                .saturating_sub(message.payload().len() as u64);
        }
        state.global_order.retain(|k| *k != key);
        deque.drain(..).collect()
    }

    /// Removes every message whose decay time (its own expiry) has passed,
    /// firing the eviction callback for each.
    pub fn remove_expired(&self, now_ms: u64) {
        let mut evicted = Vec::new();
        {
            let mut state = self.state.lock().expect("queue lock poisoned");
            let keys: Vec<ParticipantId> = state.by_key.keys().copied().collect();
            for key in keys {
                if let Some(deque) = state.by_key.get_mut(&key) {
                    let mut remaining = VecDeque::with_capacity(deque.len());
                    while let Some(message) = deque.pop_front() {
                        if message.is_expired(now_ms) {
                            state.total_count = state.total_count.saturating_sub(1);
                            state.total_bytes = state
                                .total_bytes
                                .saturating_sub(message.payload().len() as u64);
                            evicted.push(message);
                        } else {
                            remaining.push_back(message);
                        }
                    }
                    if remaining.is_empty() {
                        state.by_key.remove(&key);
                    } else {
                        *deque = remaining;
                    }
                }
            }
            state.global_order.retain(|k| state.by_key.contains_key(k));
        }
        for message in evicted {
            self.notify_evicted(message, EvictionReason::Expired);
        }
    }

    /// Total queued message count across all recipients.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.state.lock().expect("queue lock poisoned").total_count
    }

    /// Queued message count for `key`.
    #[must_use]
    pub fn key_count(&self, key: ParticipantId) -> usize {
        self.state
            .lock()
            .expect("queue lock poisoned")
            .by_key
            .get(&key)
            .map_or(0, VecDeque::len)
    }
}
