//! C10 — Local Capabilities Directory.
//!
//! Local cache of provider registrations, keyed by participant id and
//! indexed by `(domain, interface, majorVersion)`, backed by a global
//! directory client for scope-`GLOBAL` registrations and global lookups.
//! Concurrent global lookups for the same `(domains, interface)` pair are
//! coalesced into a single RPC (§4.10, §8 "LCD coalescing").

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::instrument;

use crate::domain::capabilities::{
    ArbitrationCandidate, Domain, DiscoveryScope, InterfaceName, LocalCapabilitiesEntry,
    MajorVersion, ProviderScope,
};
use crate::domain::ParticipantId;
use crate::persistence::{JsonRecordStore, ParticipantIdStore};

use super::global_client::GlobalDirectoryClient;
use super::LcdError;

type IndexKey = (Domain, InterfaceName, MajorVersion);
type WaiterKey = (Vec<String>, String);
type WaiterResult = Result<Vec<LocalCapabilitiesEntry>, String>;

/// The local capabilities cache plus its global-directory collaborator.
pub struct LocalCapabilitiesDirectory {
    entries: DashMap<ParticipantId, LocalCapabilitiesEntry>,
    by_interface: DashMap<IndexKey, HashSet<ParticipantId>>,
    records: Arc<JsonRecordStore<LocalCapabilitiesEntry>>,
    participant_ids: Arc<ParticipantIdStore>,
    global_client: Arc<dyn GlobalDirectoryClient>,
    cache_max_age_ms: u64,
    pending_global_lookups: DashMap<WaiterKey, Vec<oneshot::Sender<WaiterResult>>>,
}

impl LocalCapabilitiesDirectory {
    /// Builds a directory persisting entries under `record_dir`, replaying
    /// any previously-persisted entries that have not yet expired, and
    /// loading the participant-id persistence file at `participant_ids_path`
    /// (§6a) so local registrations can reuse a stable id across restarts.
    ///
    /// # Errors
    ///
    /// Returns [`LcdError`] if `record_dir` cannot be opened, a persisted
    /// record is malformed, or `participant_ids_path` cannot be read.
    pub fn open(
        record_dir: std::path::PathBuf,
        participant_ids_path: std::path::PathBuf,
        global_client: Arc<dyn GlobalDirectoryClient>,
        cache_max_age_ms: u64,
    ) -> Result<Arc<Self>, LcdError> {
        let records = Arc::new(JsonRecordStore::open(record_dir)?);
        let participant_ids = Arc::new(ParticipantIdStore::load(participant_ids_path)?);
        let directory = Arc::new(Self {
            entries: DashMap::new(),
            by_interface: DashMap::new(),
            records,
            participant_ids,
            global_client,
            cache_max_age_ms,
            pending_global_lookups: DashMap::new(),
        });
        let now = crate::domain::message::now_ms();
        for (_, entry) in directory.records.list()? {
            if entry.expiry_ms() > now {
                directory.insert_local(entry);
            }
        }
        Ok(directory)
    }

    /// Returns the participant id a local registration under
    /// `(domain, interface_name, major_version)` should use: a previously
    /// persisted id if one exists, so the provider's identity survives
    /// restarts (§6a), else `candidate` is persisted and returned.
    ///
    /// # Errors
    ///
    /// Returns [`LcdError`] if the participant-id file cannot be written.
    pub fn resolve_participant_id(
        &self,
        domain: &Domain,
        interface_name: &InterfaceName,
        major_version: MajorVersion,
        candidate: ParticipantId,
    ) -> Result<ParticipantId, LcdError> {
        if let Some(existing) = self.participant_ids.get(domain, interface_name, major_version) {
            return Ok(existing);
        }
        self.participant_ids.set(domain, interface_name, major_version, candidate)?;
        Ok(candidate)
    }

    fn insert_local(&self, entry: LocalCapabilitiesEntry) {
        let key = (
            entry.domain().clone(),
            entry.interface_name().clone(),
            entry.major_version(),
        );
        self.by_interface.entry(key).or_default().insert(entry.participant_id());
        self.entries.insert(entry.participant_id(), entry);
    }

    /// Registers `entry` locally, persists it, and (for [`ProviderScope::Global`])
    /// registers it with the global directory client. If `await_global_registration`
    /// is set, this call does not return until the global ack (or failure).
    ///
    /// # Errors
    ///
    /// Returns [`LcdError::Persistence`] if the write-replace fails, or
    /// [`LcdError::GlobalRegistrationFailed`] if `await_global_registration`
    /// is set and the global RPC fails.
    #[instrument(skip(self, entry), fields(participant_id = %entry.participant_id()))]
    pub async fn add(
        &self,
        entry: LocalCapabilitiesEntry,
        await_global_registration: bool,
    ) -> Result<(), LcdError> {
        self.records.put(&entry.participant_id().to_string(), &entry)?;
        self.insert_local(entry.clone());

        if entry.provider_qos().scope() == ProviderScope::Global {
            let client = Arc::clone(&self.global_client);
            if await_global_registration {
                client
                    .add(entry)
                    .await
                    .map_err(LcdError::GlobalRegistrationFailed)?;
            } else {
                tokio::spawn(async move {
                    if let Err(err) = client.add(entry).await {
                        tracing::warn!(error = %err, "global registration failed");
                    }
                });
            }
        }
        Ok(())
    }

    /// Removes `participant_id` from the local cache and, if present in the
    /// cache, unregisters it from the global directory.
    ///
    /// # Errors
    ///
    /// Returns [`LcdError::Persistence`] if the persisted record cannot be
    /// removed.
    #[instrument(skip(self), fields(participant_id = %participant_id))]
    pub async fn remove(&self, participant_id: ParticipantId) -> Result<(), LcdError> {
        let Some((_, entry)) = self.entries.remove(&participant_id) else {
            return Ok(());
        };
        let key = (
            entry.domain().clone(),
            entry.interface_name().clone(),
            entry.major_version(),
        );
        if let Some(mut ids) = self.by_interface.get_mut(&key) {
            ids.remove(&participant_id);
        }
        self.records.remove(&participant_id.to_string())?;
        if entry.provider_qos().scope() == ProviderScope::Global {
            if let Err(err) = self.global_client.remove(participant_id).await {
                tracing::warn!(error = %err, "global deregistration failed");
            }
        }
        Ok(())
    }

    fn local_matches(
        &self,
        domains: &[Domain],
        interface_name: &InterfaceName,
        provider_must_support_on_change: bool,
        now_ms: u64,
    ) -> Vec<ArbitrationCandidate> {
        let mut candidates = Vec::new();
        for domain in domains {
            // Major version is not part of the lookup filter (callers match
            // on domain/interface only, per §4.10), so scan every version
            // bucket sharing this (domain, interface) prefix.
            for entry in self
                .by_interface
                .iter()
                .filter(|e| &e.key().0 == domain && &e.key().1 == interface_name)
            {
                for participant_id in entry.value() {
                    let Some(cached) = self.entries.get(participant_id) else {
                        continue;
                    };
                    if cached.age_ms(now_ms) > self.cache_max_age_ms {
                        continue;
                    }
                    if provider_must_support_on_change && !cached.provider_qos().supports_on_change() {
                        continue;
                    }
                    candidates.push(ArbitrationCandidate {
                        entry: cached.value().clone(),
                        is_local: true,
                    });
                }
            }
        }
        candidates
    }

    /// Looks up providers for `domains`/`interface_name`, honoring `scope`
    /// and coalescing concurrent global lookups for the same key.
    ///
    /// # Errors
    ///
    /// Returns [`LcdError::DiscoveryTimedOut`] if a global lookup was
    /// required and did not complete within `discovery_timeout_ms`.
    #[instrument(skip(self), fields(interface_name = %interface_name))]
    pub async fn lookup(
        &self,
        domains: Vec<Domain>,
        interface_name: InterfaceName,
        scope: DiscoveryScope,
        provider_must_support_on_change: bool,
        discovery_timeout_ms: u64,
    ) -> Result<Vec<ArbitrationCandidate>, LcdError> {
        let now_ms = crate::domain::message::now_ms();
        let local = self.local_matches(&domains, &interface_name, provider_must_support_on_change, now_ms);

        match scope {
            DiscoveryScope::LocalOnly => Ok(local),
            DiscoveryScope::LocalThenGlobal => {
                if !local.is_empty() {
                    Ok(local)
                } else {
                    self.global_lookup_coalesced(domains, interface_name, discovery_timeout_ms).await
                }
            }
            DiscoveryScope::LocalAndGlobal => {
                let mut global = self
                    .global_lookup_coalesced(domains, interface_name, discovery_timeout_ms)
                    .await?;
                global.extend(local);
                Ok(global)
            }
            DiscoveryScope::GlobalOnly => {
                self.global_lookup_coalesced(domains, interface_name, discovery_timeout_ms).await
            }
        }
    }

    /// Looks up a single provider by participant id: local cache first, then
    /// the global directory if not found locally.
    ///
    /// # Errors
    ///
    /// Returns [`LcdError::GlobalRegistrationFailed`] if the global RPC
    /// fails once a local miss falls through to it.
    pub async fn lookup_by_participant(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Option<LocalCapabilitiesEntry>, LcdError> {
        if let Some(entry) = self.entries.get(&participant_id) {
            return Ok(Some(entry.value().clone()));
        }
        self.global_client
            .lookup_by_participant(participant_id)
            .await
            .map_err(LcdError::GlobalRegistrationFailed)
    }

    /// Performs (or joins) a global lookup for `(domains, interface_name)`.
    /// The first caller for a given key becomes the leader: it issues the
    /// RPC and fans its result out to every waiter that joined while it was
    /// in flight, itself included. Later callers for the same key simply
    /// await the leader's result on a oneshot channel — no detached task is
    /// needed since the leader's own call stack already awaits the RPC.
    async fn global_lookup_coalesced(
        &self,
        mut domains: Vec<Domain>,
        interface_name: InterfaceName,
        discovery_timeout_ms: u64,
    ) -> Result<Vec<ArbitrationCandidate>, LcdError> {
        domains.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));
        let key: WaiterKey = (
            domains.iter().map(ToString::to_string).collect(),
            interface_name.to_string(),
        );
        let (tx, rx) = oneshot::channel();
        let is_leader = {
            let mut waiters = self.pending_global_lookups.entry(key.clone()).or_default();
            waiters.push(tx);
            waiters.len() == 1
        };

        let result = if is_leader {
            let result: WaiterResult = match tokio::time::timeout(
                Duration::from_millis(discovery_timeout_ms),
                self.global_client.lookup_by_domain(domains, interface_name),
            )
            .await
            {
                Ok(inner) => inner,
                Err(_) => Err("global lookup timed out".to_string()),
            };
            if let Some((_, waiters)) = self.pending_global_lookups.remove(&key) {
                for waiter in waiters {
                    let _ = waiter.send(result.clone());
                }
            }
            result
        } else {
            rx.await.map_err(|_| "leader dropped its sender".to_string())?
        };

        let entries = result.map_err(|_| LcdError::DiscoveryTimedOut {
            domains: key.0.clone(),
            interface_name: key.1.clone(),
        })?;
        Ok(entries
            .into_iter()
            .map(|entry| ArbitrationCandidate { entry, is_local: false })
            .collect())
    }

    /// Number of entries currently cached locally.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the local cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capabilities::ProviderQos;
    use crate::domain::Address;
    use crate::lcd::global_client::InMemoryGlobalDirectoryClient;
    use tempfile::tempdir;

    fn entry(domain: &str, interface: &str, scope: ProviderScope) -> LocalCapabilitiesEntry {
        LocalCapabilitiesEntry::new(
            Domain::try_new(domain).unwrap(),
            InterfaceName::try_new(interface).unwrap(),
            MajorVersion::new(1),
            ParticipantId::generate(),
            ProviderQos::new(scope, 1, false),
            0,
            crate::domain::message::now_ms() + 60_000,
            "key-1".to_string(),
            Address::InProcess,
        )
    }

    #[tokio::test]
    async fn local_only_lookup_returns_cached_entry() {
        let dir = tempdir().unwrap();
        let directory = LocalCapabilitiesDirectory::open(
            dir.path().join("lcd"),
            dir.path().join("participant-ids.ini"),
            Arc::new(InMemoryGlobalDirectoryClient::new()),
            60_000,
        )
        .unwrap();
        let registered = entry("calculator", "Calculator", ProviderScope::Local);
        directory.add(registered.clone(), false).await.unwrap();

        let found = directory
            .lookup(
                vec![Domain::try_new("calculator").unwrap()],
                InterfaceName::try_new("Calculator").unwrap(),
                DiscoveryScope::LocalOnly,
                false,
                1_000,
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].is_local);
    }

    #[tokio::test]
    async fn remove_clears_local_and_persisted_state() {
        let dir = tempdir().unwrap();
        let directory = LocalCapabilitiesDirectory::open(
            dir.path().join("lcd"),
            dir.path().join("participant-ids.ini"),
            Arc::new(InMemoryGlobalDirectoryClient::new()),
            60_000,
        )
        .unwrap();
        let registered = entry("fleet", "Vehicle", ProviderScope::Local);
        let participant_id = registered.participant_id();
        directory.add(registered, false).await.unwrap();
        directory.remove(participant_id).await.unwrap();
        assert!(directory.is_empty());
    }

    #[tokio::test]
    async fn resolve_participant_id_is_stable_across_restarts() {
        let dir = tempdir().unwrap();
        let participant_ids_path = dir.path().join("participant-ids.ini");
        let domain = Domain::try_new("calculator").unwrap();
        let interface = InterfaceName::try_new("Calculator").unwrap();

        let first_id = {
            let directory = LocalCapabilitiesDirectory::open(
                dir.path().join("lcd"),
                participant_ids_path.clone(),
                Arc::new(InMemoryGlobalDirectoryClient::new()),
                60_000,
            )
            .unwrap();
            directory
                .resolve_participant_id(&domain, &interface, MajorVersion::new(1), ParticipantId::generate())
                .unwrap()
        };

        let directory = LocalCapabilitiesDirectory::open(
            dir.path().join("lcd"),
            participant_ids_path,
            Arc::new(InMemoryGlobalDirectoryClient::new()),
            60_000,
        )
        .unwrap();
        let second_id = directory
            .resolve_participant_id(&domain, &interface, MajorVersion::new(1), ParticipantId::generate())
            .unwrap();
        assert_eq!(first_id, second_id);
    }
}
