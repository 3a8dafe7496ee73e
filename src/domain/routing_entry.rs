//! Routing table entry: address plus visibility/expiry/sticky metadata.

use serde::{Deserialize, Serialize};

use super::address::Address;

/// A routing table entry: `participantId -> (address, visibility, expiry, sticky)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingEntry {
    address: Address,
    is_globally_visible: bool,
    expiry_ms: u64,
    is_sticky: bool,
}

impl RoutingEntry {
    /// Builds a routing entry. Sticky entries ignore `expiry_ms` for
    /// eviction purposes (see [`RoutingEntry::is_expired`]) but still store
    /// the supplied value, since the table may later need to report it.
    #[must_use]
    pub fn new(address: Address, is_globally_visible: bool, expiry_ms: u64, is_sticky: bool) -> Self {
        Self {
            address,
            is_globally_visible,
            expiry_ms,
            is_sticky,
        }
    }

    /// The destination address.
    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Whether this entry is visible to the global directory.
    #[must_use]
    pub fn is_globally_visible(&self) -> bool {
        self.is_globally_visible
    }

    /// Whether this entry never expires and cannot be overwritten by a
    /// non-sticky `add`.
    #[must_use]
    pub fn is_sticky(&self) -> bool {
        self.is_sticky
    }

    /// The raw expiry timestamp, ms since epoch UTC.
    #[must_use]
    pub fn expiry_ms(&self) -> u64 {
        self.expiry_ms
    }

    /// Sticky entries never expire; non-sticky entries expire at
    /// `expiry_ms <= now_ms`.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        !self.is_sticky && self.expiry_ms <= now_ms
    }
}
