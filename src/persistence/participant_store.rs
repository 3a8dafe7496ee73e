//! Participant-id persistence file (§6a): maps
//! `joynr.participant.<domain>.<interface>.v<major>` to a participant id,
//! surviving restarts so a provider keeps the same id across process
//! lifetimes.

use super::ini_store::{IniStore, IniStoreError};
use crate::domain::capabilities::{Domain, InterfaceName, MajorVersion};
use crate::domain::ParticipantId;

/// Builds the persistence key for a `(domain, interface, majorVersion)`
/// triple, replacing slashes in the domain/interface names with dots per
/// the §6 key format.
#[must_use]
pub fn participant_key(domain: &Domain, interface_name: &InterfaceName, major_version: MajorVersion) -> String {
    format!(
        "joynr.participant.{}.{}.v{}",
        domain.as_ref().replace('/', "."),
        interface_name.as_ref().replace('/', "."),
        major_version
    )
}

/// Thin wrapper over [`IniStore`] that reads/writes [`ParticipantId`]
/// values.
pub struct ParticipantIdStore {
    ini: IniStore,
}

impl ParticipantIdStore {
    /// Loads the participant-id file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IniStoreError`] if the file exists but cannot be parsed.
    pub fn load(path: std::path::PathBuf) -> Result<Self, IniStoreError> {
        Ok(Self {
            ini: IniStore::load(path)?,
        })
    }

    /// Returns the persisted participant id for the given registration
    /// key, if any.
    #[must_use]
    pub fn get(&self, domain: &Domain, interface_name: &InterfaceName, major_version: MajorVersion) -> Option<ParticipantId> {
        self.ini
            .get(&participant_key(domain, interface_name, major_version))
            .and_then(|raw| uuid::Uuid::parse_str(&raw).ok())
            .map(ParticipantId::new)
    }

    /// Persists `participant_id` under the registration key, so future
    /// restarts reuse the same id.
    ///
    /// # Errors
    ///
    /// Returns [`IniStoreError`] if the write-replace fails.
    pub fn set(
        &self,
        domain: &Domain,
        interface_name: &InterfaceName,
        major_version: MajorVersion,
        participant_id: ParticipantId,
    ) -> Result<(), IniStoreError> {
        self.ini.set(
            participant_key(domain, interface_name, major_version),
            participant_id.to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn key_replaces_slashes_with_dots() {
        let domain = Domain::try_new("com/example/fleet").unwrap();
        let interface = InterfaceName::try_new("Vehicle/Status").unwrap();
        let key = participant_key(&domain, &interface, MajorVersion::new(2));
        assert_eq!(key, "joynr.participant.com.example.fleet.Vehicle.Status.v2");
    }

    #[test]
    fn round_trips_a_participant_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("participants.ini");
        let domain = Domain::try_new("calculator").unwrap();
        let interface = InterfaceName::try_new("Calculator").unwrap();
        let id = ParticipantId::generate();
        {
            let store = ParticipantIdStore::load(path.clone()).unwrap();
            store.set(&domain, &interface, MajorVersion::new(1), id).unwrap();
        }
        let reloaded = ParticipantIdStore::load(path).unwrap();
        assert_eq!(reloaded.get(&domain, &interface, MajorVersion::new(1)), Some(id));
    }
}
