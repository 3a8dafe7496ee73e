//! C10 — Local Capabilities Directory.
//!
//! A local cache of provider registrations plus the global directory client
//! boundary and arbitration helper described in §4.10.

mod arbitration;
mod directory;
mod global_client;

pub use arbitration::{arbitrate, ArbitrationCandidate, ArbitrationResult, ArbitrationStrategy};
pub use directory::LocalCapabilitiesDirectory;
pub use global_client::{GlobalDirectoryClient, HttpGlobalDirectoryClient, InMemoryGlobalDirectoryClient};

use thiserror::Error;

use crate::persistence::{IniStoreError, JsonRecordStoreError};

/// Errors raised by the local capabilities directory.
#[derive(Debug, Error)]
pub enum LcdError {
    /// A global lookup did not complete within `discoveryTimeoutMs`.
    #[error("discovery timed out for domains {domains:?}, interface {interface_name}")]
    DiscoveryTimedOut {
        /// The domains that were searched.
        domains: Vec<String>,
        /// The interface name that was searched.
        interface_name: String,
    },
    /// An awaited global registration or lookup RPC failed.
    #[error("global directory request failed: {0}")]
    GlobalRegistrationFailed(String),
    /// The persisted cache could not be read or written.
    #[error(transparent)]
    Persistence(#[from] JsonRecordStoreError),
    /// The participant-id persistence file could not be read or written.
    #[error(transparent)]
    ParticipantIdPersistence(#[from] IniStoreError),
}
