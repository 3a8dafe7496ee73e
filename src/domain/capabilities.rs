//! Local Capabilities Directory entry and arbitration data model.

use nutype::nutype;
use serde::{Deserialize, Serialize};

use super::address::Address;
use super::ids::ParticipantId;

/// Domain name a capability is registered under, e.g. `"calculator"`.
#[nutype(
    sanitize(trim),
    validate(len_char_min = 1, len_char_max = 255),
    derive(Clone, Debug, Eq, PartialEq, Hash, Display, Serialize, Deserialize)
)]
pub struct Domain(String);

/// Interface name, e.g. `"Calculator"`.
#[nutype(
    sanitize(trim),
    validate(len_char_min = 1, len_char_max = 255),
    derive(Clone, Debug, Eq, PartialEq, Hash, Display, Serialize, Deserialize)
)]
pub struct InterfaceName(String);

/// Major interface version.
#[nutype(derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Display, Serialize, Deserialize
))]
pub struct MajorVersion(u32);

/// Whether a provider registration is visible only to this cluster
/// controller or also published to the global directory.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ProviderScope {
    /// Registered only in this CC's local cache.
    Local,
    /// Registered locally and published to the global directory.
    Global,
}

/// Discovery scope requested by a consumer's `lookup` call.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum DiscoveryScope {
    /// Only consult the local cache.
    LocalOnly,
    /// Prefer local matches; fall back to a global lookup if empty.
    LocalThenGlobal,
    /// Perform a global lookup and merge with local matches.
    LocalAndGlobal,
    /// Only perform a global lookup.
    GlobalOnly,
}

/// Provider-side qos attached to a capability registration: scope plus
/// arbitration priority and on-change support.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderQos {
    scope: ProviderScope,
    priority: i64,
    supports_on_change: bool,
}

impl ProviderQos {
    /// Builds a provider qos.
    #[must_use]
    pub fn new(scope: ProviderScope, priority: i64, supports_on_change: bool) -> Self {
        Self {
            scope,
            priority,
            supports_on_change,
        }
    }

    /// The registration's scope.
    #[must_use]
    pub fn scope(&self) -> ProviderScope {
        self.scope
    }

    /// Arbitration priority; higher wins under the highest-priority
    /// strategy.
    #[must_use]
    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// Whether this provider supports on-change subscriptions.
    #[must_use]
    pub fn supports_on_change(&self) -> bool {
        self.supports_on_change
    }
}

/// A single provider registration in the local capabilities cache.
///
/// Uniqueness: `participant_id` is the primary key; many entries may share
/// the same `(domain, interface_name, major_version)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalCapabilitiesEntry {
    domain: Domain,
    interface_name: InterfaceName,
    major_version: MajorVersion,
    participant_id: ParticipantId,
    provider_qos: ProviderQos,
    last_seen_ms: u64,
    expiry_ms: u64,
    public_key_id: String,
    address: Address,
}

impl LocalCapabilitiesEntry {
    /// Builds a capabilities entry.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        domain: Domain,
        interface_name: InterfaceName,
        major_version: MajorVersion,
        participant_id: ParticipantId,
        provider_qos: ProviderQos,
        last_seen_ms: u64,
        expiry_ms: u64,
        public_key_id: String,
        address: Address,
    ) -> Self {
        Self {
            domain,
            interface_name,
            major_version,
            participant_id,
            provider_qos,
            last_seen_ms,
            expiry_ms,
            public_key_id,
            address,
        }
    }

    /// The registration's domain.
    #[must_use]
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// The registration's interface name.
    #[must_use]
    pub fn interface_name(&self) -> &InterfaceName {
        &self.interface_name
    }

    /// The registration's major version.
    #[must_use]
    pub fn major_version(&self) -> MajorVersion {
        self.major_version
    }

    /// The provider's participant id, the primary key of this entry.
    #[must_use]
    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    /// The provider qos.
    #[must_use]
    pub fn provider_qos(&self) -> &ProviderQos {
        &self.provider_qos
    }

    /// Timestamp of the last liveness refresh, ms since epoch UTC.
    #[must_use]
    pub fn last_seen_ms(&self) -> u64 {
        self.last_seen_ms
    }

    /// Absolute expiry, ms since epoch UTC.
    #[must_use]
    pub fn expiry_ms(&self) -> u64 {
        self.expiry_ms
    }

    /// Id of the public key used to verify messages from this provider.
    #[must_use]
    pub fn public_key_id(&self) -> &str {
        &self.public_key_id
    }

    /// The provider's transport address.
    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Age of this entry relative to `now_ms`, in milliseconds. Saturates
    /// at zero if `last_seen_ms` is in the future relative to `now_ms`.
    #[must_use]
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_seen_ms)
    }
}

/// Strategy used to select one provider among several candidates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ArbitrationStrategy {
    /// Select the candidate with the highest [`ProviderQos::priority`].
    HighestPriority,
    /// Select the candidate with the smallest `now - last_seen_ms` delta.
    LastSeen,
    /// Select candidates whose custom qos carries a matching keyword.
    Keyword {
        /// The keyword to match.
        keyword: String,
    },
    /// Select the candidate with a specific participant id, if present.
    FixedParticipant {
        /// The required participant id.
        participant_id: ParticipantId,
    },
}

/// A candidate entry annotated with whether it was served from the local
/// cache or a global lookup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArbitrationCandidate {
    /// The candidate entry.
    pub entry: LocalCapabilitiesEntry,
    /// `true` if this candidate came from the local cache.
    pub is_local: bool,
}

/// The outcome of applying an [`ArbitrationStrategy`] to a set of
/// candidates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArbitrationResult {
    /// The selected entries, in strategy-defined order (usually one, but a
    /// keyword match may select several).
    pub selected: Vec<ArbitrationCandidate>,
}

impl ArbitrationResult {
    /// Applies `strategy` to `candidates`, returning the selected subset.
    #[must_use]
    pub fn apply(
        strategy: &ArbitrationStrategy,
        mut candidates: Vec<ArbitrationCandidate>,
        now_ms: u64,
    ) -> Self {
        let selected = match strategy {
            ArbitrationStrategy::HighestPriority => candidates
                .into_iter()
                .max_by_key(|c| c.entry.provider_qos().priority())
                .into_iter()
                .collect(),
            ArbitrationStrategy::LastSeen => candidates
                .into_iter()
                .min_by_key(|c| c.entry.age_ms(now_ms))
                .into_iter()
                .collect(),
            ArbitrationStrategy::Keyword { keyword } => {
                candidates.retain(|c| c.entry.public_key_id().contains(keyword.as_str()));
                candidates
            }
            ArbitrationStrategy::FixedParticipant { participant_id } => candidates
                .into_iter()
                .filter(|c| c.entry.participant_id() == *participant_id)
                .collect(),
        };
        Self { selected }
    }
}
