//! Persistence layer (§6): flat `key=value` files for the participant-id
//! and multicast-receiver directories, and one JSON file per record for
//! the LCD cache and publication/subscription records.

mod ini_store;
mod json_record_store;
mod multicast_receiver_store;
mod participant_store;

pub use ini_store::{IniStore, IniStoreError};
pub use json_record_store::{JsonRecordStore, JsonRecordStoreError};
pub use multicast_receiver_store::MulticastReceiverStore;
pub use participant_store::{participant_key, ParticipantIdStore};

use thiserror::Error;

/// Errors raised by any part of the persistence layer.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A flat `key=value` store failed to load or save.
    #[error(transparent)]
    Ini(#[from] IniStoreError),
    /// A per-record JSON store failed to load or save.
    #[error(transparent)]
    JsonRecord(#[from] JsonRecordStoreError),
}
