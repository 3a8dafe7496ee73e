//! Multicast-receiver directory persistence file (§6b): maps a multicast
//! id to its comma-separated set of receiver participant ids, so local
//! fan-out registrations survive restarts.

use std::collections::HashSet;

use super::ini_store::{IniStore, IniStoreError};
use crate::domain::{MulticastId, ParticipantId};

/// Thin wrapper over [`IniStore`] storing receiver sets keyed by multicast
/// id.
pub struct MulticastReceiverStore {
    ini: IniStore,
}

impl MulticastReceiverStore {
    /// Loads the multicast-receiver directory file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IniStoreError`] if the file exists but cannot be parsed.
    pub fn load(path: std::path::PathBuf) -> Result<Self, IniStoreError> {
        Ok(Self {
            ini: IniStore::load(path)?,
        })
    }

    /// Returns the receiver set for `multicast_id`, if any entries exist.
    #[must_use]
    pub fn get(&self, multicast_id: &MulticastId) -> HashSet<ParticipantId> {
        self.ini
            .get(multicast_id.as_ref())
            .map(|raw| {
                raw.split(',')
                    .filter(|s| !s.is_empty())
                    .filter_map(|s| uuid::Uuid::parse_str(s).ok())
                    .map(ParticipantId::new)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Overwrites the receiver set for `multicast_id`.
    ///
    /// # Errors
    ///
    /// Returns [`IniStoreError`] if the write-replace fails.
    pub fn set(&self, multicast_id: &MulticastId, receivers: &HashSet<ParticipantId>) -> Result<(), IniStoreError> {
        let joined = receivers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.ini.set(multicast_id.as_ref().clone(), joined)
    }

    /// Removes the entry for `multicast_id` entirely.
    ///
    /// # Errors
    ///
    /// Returns [`IniStoreError`] if the write-replace fails.
    pub fn remove(&self, multicast_id: &MulticastId) -> Result<(), IniStoreError> {
        self.ini.remove(multicast_id.as_ref())
    }

    /// All persisted `(multicast_id, receivers)` pairs, as raw strings, for
    /// restart replay.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, String)> {
        self.ini.entries()
    }
}
