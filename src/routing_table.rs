//! C1 — Routing Table.
//!
//! Grounded on `message_router::implementations::AgentRegistryImpl`'s
//! `DashMap`-backed O(1) lookup pattern, generalized to the routing-entry
//! shape and sticky/expiry rules of §4.1.

use dashmap::DashMap;
use tracing::instrument;

use crate::domain::{Address, ParticipantId, RoutingEntry};

/// Maps participant id → routing entry, enforcing the sticky/non-sticky
/// replacement rule and lazy expiry from §4.1.
#[derive(Debug, Default)]
pub struct RoutingTable {
    entries: DashMap<ParticipantId, RoutingEntry>,
}

impl RoutingTable {
    /// Creates an empty routing table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Installs or replaces a routing entry.
    ///
    /// A non-sticky `add` is ignored if a sticky entry already exists for
    /// `participant_id`. Otherwise the new entry replaces whatever was
    /// there (if anything).
    #[instrument(skip(self, address), fields(participant_id = %participant_id))]
    pub fn add(
        &self,
        participant_id: ParticipantId,
        address: Address,
        is_globally_visible: bool,
        expiry_ms: u64,
        is_sticky: bool,
    ) {
        if let Some(existing) = self.entries.get(&participant_id) {
            if existing.is_sticky() && !is_sticky {
                return;
            }
        }
        self.entries.insert(
            participant_id,
            RoutingEntry::new(address, is_globally_visible, expiry_ms, is_sticky),
        );
    }

    /// Looks up the entry for `participant_id`, treating an expired
    /// non-sticky entry as absent and evicting it.
    #[instrument(skip(self), fields(participant_id = %participant_id))]
    pub fn lookup(&self, participant_id: ParticipantId, now_ms: u64) -> Option<RoutingEntry> {
        let expired = self
            .entries
            .get(&participant_id)
            .is_some_and(|e| e.is_expired(now_ms));
        if expired {
            self.entries.remove(&participant_id);
            return None;
        }
        self.entries.get(&participant_id).map(|e| e.clone())
    }

    /// Returns the set of participant ids currently routed to `address`.
    #[must_use]
    pub fn lookup_participants_by_address(&self, address: &Address) -> Vec<ParticipantId> {
        self.entries
            .iter()
            .filter(|entry| entry.value().address() == address)
            .map(|entry| *entry.key())
            .collect()
    }

    /// True if a (possibly expired) entry exists for `participant_id`.
    #[must_use]
    pub fn contains(&self, participant_id: ParticipantId) -> bool {
        self.entries.contains_key(&participant_id)
    }

    /// Removes the entry for `participant_id`, a no-op if absent.
    #[instrument(skip(self), fields(participant_id = %participant_id))]
    pub fn remove(&self, participant_id: ParticipantId) {
        self.entries.remove(&participant_id);
    }

    /// Evicts every expired non-sticky entry; returns the evicted ids.
    pub fn evict_expired(&self, now_ms: u64) -> Vec<ParticipantId> {
        let expired: Vec<ParticipantId> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_expired(now_ms))
            .map(|entry| *entry.key())
            .collect();
        for id in &expired {
            self.entries.remove(id);
        }
        expired
    }
}
