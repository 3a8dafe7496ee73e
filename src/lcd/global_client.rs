//! External collaborator boundary (§10.5): the Global Directory Client.
//!
//! The core only depends on this trait; no wire protocol is prescribed, so
//! the production adapter is an opaque HTTP/JSON stub over `reqwest` and the
//! test double is purely in-memory.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::capabilities::{Domain, InterfaceName, LocalCapabilitiesEntry};
use crate::domain::{ClusterControllerId, ParticipantId};

/// The four RPCs a cluster controller issues against the global directory.
#[async_trait]
pub trait GlobalDirectoryClient: Send + Sync {
    /// Registers (or re-registers) `entry` globally.
    async fn add(&self, entry: LocalCapabilitiesEntry) -> Result<(), String>;

    /// Unregisters `participant_id` globally.
    async fn remove(&self, participant_id: ParticipantId) -> Result<(), String>;

    /// Looks up every global entry matching one of `domains` and
    /// `interface_name`.
    async fn lookup_by_domain(
        &self,
        domains: Vec<Domain>,
        interface_name: InterfaceName,
    ) -> Result<Vec<LocalCapabilitiesEntry>, String>;

    /// Looks up the global entry for `participant_id`, if registered.
    async fn lookup_by_participant(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Option<LocalCapabilitiesEntry>, String>;

    /// Sends a liveness beacon so entries registered by `cc_id` have their
    /// `lastSeenMs` refreshed directory-side.
    async fn touch(&self, cc_id: ClusterControllerId) -> Result<(), String>;
}

/// `reqwest`-backed adapter. The wire format is an internal implementation
/// detail of the global directory service; this adapter only needs to agree
/// with it, not with any spec prescribed here.
pub struct HttpGlobalDirectoryClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGlobalDirectoryClient {
    /// Builds a client targeting `base_url` (e.g. `https://directory.example:443`).
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl GlobalDirectoryClient for HttpGlobalDirectoryClient {
    async fn add(&self, entry: LocalCapabilitiesEntry) -> Result<(), String> {
        self.client
            .post(format!("{}/capabilities", self.base_url))
            .json(&entry)
            .send()
            .await
            .map_err(|err| err.to_string())?
            .error_for_status()
            .map_err(|err| err.to_string())?;
        Ok(())
    }

    async fn remove(&self, participant_id: ParticipantId) -> Result<(), String> {
        self.client
            .delete(format!("{}/capabilities/{participant_id}", self.base_url))
            .send()
            .await
            .map_err(|err| err.to_string())?
            .error_for_status()
            .map_err(|err| err.to_string())?;
        Ok(())
    }

    async fn lookup_by_domain(
        &self,
        domains: Vec<Domain>,
        interface_name: InterfaceName,
    ) -> Result<Vec<LocalCapabilitiesEntry>, String> {
        let domain_list = domains
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let response = self
            .client
            .get(format!("{}/capabilities", self.base_url))
            .query(&[("domains", domain_list.as_str()), ("interfaceName", interface_name.as_ref())])
            .send()
            .await
            .map_err(|err| err.to_string())?
            .error_for_status()
            .map_err(|err| err.to_string())?;
        response
            .json::<Vec<LocalCapabilitiesEntry>>()
            .await
            .map_err(|err| err.to_string())
    }

    async fn lookup_by_participant(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Option<LocalCapabilitiesEntry>, String> {
        let response = self
            .client
            .get(format!("{}/capabilities/{participant_id}", self.base_url))
            .send()
            .await
            .map_err(|err| err.to_string())?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        response
            .error_for_status()
            .map_err(|err| err.to_string())?
            .json::<LocalCapabilitiesEntry>()
            .await
            .map(Some)
            .map_err(|err| err.to_string())
    }

    async fn touch(&self, cc_id: ClusterControllerId) -> Result<(), String> {
        self.client
            .post(format!("{}/cluster-controllers/{cc_id}/touch", self.base_url))
            .send()
            .await
            .map_err(|err| err.to_string())?
            .error_for_status()
            .map_err(|err| err.to_string())?;
        Ok(())
    }
}

/// In-memory test double.
#[derive(Default)]
pub struct InMemoryGlobalDirectoryClient {
    entries: DashMap<ParticipantId, LocalCapabilitiesEntry>,
}

impl InMemoryGlobalDirectoryClient {
    /// Builds an empty in-memory directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GlobalDirectoryClient for InMemoryGlobalDirectoryClient {
    async fn add(&self, entry: LocalCapabilitiesEntry) -> Result<(), String> {
        self.entries.insert(entry.participant_id(), entry);
        Ok(())
    }

    async fn remove(&self, participant_id: ParticipantId) -> Result<(), String> {
        self.entries.remove(&participant_id);
        Ok(())
    }

    async fn lookup_by_domain(
        &self,
        domains: Vec<Domain>,
        interface_name: InterfaceName,
    ) -> Result<Vec<LocalCapabilitiesEntry>, String> {
        Ok(self
            .entries
            .iter()
            .filter(|e| domains.contains(e.value().domain()) && e.value().interface_name() == &interface_name)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn lookup_by_participant(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Option<LocalCapabilitiesEntry>, String> {
        Ok(self.entries.get(&participant_id).map(|e| e.value().clone()))
    }

    async fn touch(&self, _cc_id: ClusterControllerId) -> Result<(), String> {
        Ok(())
    }
}
