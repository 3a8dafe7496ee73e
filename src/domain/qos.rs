//! Subscription qos variants and their bounds.
//!
//! Bounds resolve the open question in `SPEC_FULL.md` §9: minInterval's
//! floor is 0 ms, period's floor is 50 ms, publicationTtl is clamped to
//! `[100 ms, 30 d]`. Cross-field invariants (`minInterval <= maxInterval <=
//! alertAfterInterval`) are enforced in each variant's constructor rather
//! than left to callers, following the "make illegal states
//! unrepresentable" newtype discipline used throughout this crate.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const THIRTY_DAYS_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Lower bound between two on-change publications, `[0, 30 d]` ms.
#[nutype(
    validate(less_or_equal = 2_592_000_000),
    derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)
)]
pub struct MinIntervalMs(u64);

/// Upper bound before a keep-alive publication is forced, `[0, 30 d]` ms.
#[nutype(
    validate(less_or_equal = 2_592_000_000),
    derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)
)]
pub struct MaxIntervalMs(u64);

/// Periodic tick interval, `[50 ms, 30 d]`.
#[nutype(
    validate(greater_or_equal = 50, less_or_equal = 2_592_000_000),
    derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)
)]
pub struct PeriodMs(u64);

/// Missed-publication alert interval; `0` disables alerting, otherwise
/// `[0, 30 d]` ms (upper-bound relationship to period/maxInterval is
/// enforced by the owning qos variant's constructor).
#[nutype(
    validate(less_or_equal = 2_592_000_000),
    derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)
)]
pub struct AlertAfterIntervalMs(u64);

/// Time-to-live for a single publication message, `[100 ms, 30 d]`.
#[nutype(
    validate(greater_or_equal = 100, less_or_equal = 2_592_000_000),
    derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)
)]
pub struct PublicationTtlMs(u64);

/// Errors raised building a qos variant whose cross-field invariants do not
/// hold.
#[derive(Debug, Error)]
pub enum QosError {
    /// `minInterval` exceeded `maxInterval`.
    #[error("minInterval ({min_interval_ms} ms) must be <= maxInterval ({max_interval_ms} ms)")]
    MinExceedsMax {
        /// The offending minInterval, ms.
        min_interval_ms: u64,
        /// The offending maxInterval, ms.
        max_interval_ms: u64,
    },
    /// `maxInterval` (or `period`) exceeded `alertAfterInterval` while the
    /// alert was enabled.
    #[error(
        "alertAfterInterval ({alert_after_ms} ms) must be >= {bound_name} ({bound_ms} ms) when alerting is enabled"
    )]
    AlertBelowBound {
        /// The name of the bound that was violated (`maxInterval` or `period`).
        bound_name: &'static str,
        /// The bound's value, ms.
        bound_ms: u64,
        /// The offending alertAfterInterval, ms.
        alert_after_ms: u64,
    },
}

/// On-change subscription qos: publish only when the attribute changes, no
/// more often than `minInterval`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OnChangeQos {
    min_interval: MinIntervalMs,
    expiry_ms: u64,
    publication_ttl: PublicationTtlMs,
}

impl OnChangeQos {
    /// Builds an on-change qos. No cross-field invariant beyond each
    /// field's own range applies to this variant.
    #[must_use]
    pub fn new(min_interval: MinIntervalMs, expiry_ms: u64, publication_ttl: PublicationTtlMs) -> Self {
        Self {
            min_interval,
            expiry_ms,
            publication_ttl,
        }
    }

    /// The minimum interval between publications.
    #[must_use]
    pub fn min_interval(&self) -> MinIntervalMs {
        self.min_interval
    }

    /// Absolute expiry, ms since epoch UTC.
    #[must_use]
    pub fn expiry_ms(&self) -> u64 {
        self.expiry_ms
    }

    /// Per-publication message TTL.
    #[must_use]
    pub fn publication_ttl(&self) -> PublicationTtlMs {
        self.publication_ttl
    }
}

/// On-change subscription qos with a keep-alive upper bound: if nothing
/// changes within `maxInterval`, a publication is sent anyway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OnChangeWithKeepAliveQos {
    min_interval: MinIntervalMs,
    max_interval: MaxIntervalMs,
    alert_after_interval: AlertAfterIntervalMs,
    expiry_ms: u64,
    publication_ttl: PublicationTtlMs,
}

impl OnChangeWithKeepAliveQos {
    /// Builds an on-change-with-keep-alive qos, enforcing
    /// `minInterval <= maxInterval <= alertAfterInterval` (when alerting is
    /// enabled, i.e. `alertAfterInterval != 0`).
    ///
    /// # Errors
    ///
    /// Returns [`QosError`] if the ordering invariant does not hold.
    pub fn try_new(
        min_interval: MinIntervalMs,
        max_interval: MaxIntervalMs,
        alert_after_interval: AlertAfterIntervalMs,
        expiry_ms: u64,
        publication_ttl: PublicationTtlMs,
    ) -> Result<Self, QosError> {
        if min_interval.into_inner() > max_interval.into_inner() {
            return Err(QosError::MinExceedsMax {
                min_interval_ms: min_interval.into_inner(),
                max_interval_ms: max_interval.into_inner(),
            });
        }
        let alert = alert_after_interval.into_inner();
        if alert != 0 && alert < max_interval.into_inner() {
            return Err(QosError::AlertBelowBound {
                bound_name: "maxInterval",
                bound_ms: max_interval.into_inner(),
                alert_after_ms: alert,
            });
        }
        Ok(Self {
            min_interval,
            max_interval,
            alert_after_interval,
            expiry_ms,
            publication_ttl,
        })
    }

    /// The minimum interval between change-triggered publications.
    #[must_use]
    pub fn min_interval(&self) -> MinIntervalMs {
        self.min_interval
    }

    /// The keep-alive upper bound.
    #[must_use]
    pub fn max_interval(&self) -> MaxIntervalMs {
        self.max_interval
    }

    /// The missed-publication alert interval; `0` means disabled.
    #[must_use]
    pub fn alert_after_interval(&self) -> AlertAfterIntervalMs {
        self.alert_after_interval
    }

    /// Absolute expiry, ms since epoch UTC.
    #[must_use]
    pub fn expiry_ms(&self) -> u64 {
        self.expiry_ms
    }

    /// Per-publication message TTL.
    #[must_use]
    pub fn publication_ttl(&self) -> PublicationTtlMs {
        self.publication_ttl
    }
}

/// Periodic subscription qos: a tick every `period`, with optional missed
/// keep-alive alerting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodicQos {
    period: PeriodMs,
    alert_after_interval: AlertAfterIntervalMs,
    expiry_ms: u64,
    publication_ttl: PublicationTtlMs,
}

impl PeriodicQos {
    /// Builds a periodic qos, enforcing `alertAfterInterval == 0` (disabled)
    /// or `alertAfterInterval >= period` when enabled.
    ///
    /// # Errors
    ///
    /// Returns [`QosError`] if an enabled alert interval is shorter than the
    /// period.
    pub fn try_new(
        period: PeriodMs,
        alert_after_interval: AlertAfterIntervalMs,
        expiry_ms: u64,
        publication_ttl: PublicationTtlMs,
    ) -> Result<Self, QosError> {
        let alert = alert_after_interval.into_inner();
        if alert != 0 && alert < period.into_inner() {
            return Err(QosError::AlertBelowBound {
                bound_name: "period",
                bound_ms: period.into_inner(),
                alert_after_ms: alert,
            });
        }
        Ok(Self {
            period,
            alert_after_interval,
            expiry_ms,
            publication_ttl,
        })
    }

    /// The tick period.
    #[must_use]
    pub fn period(&self) -> PeriodMs {
        self.period
    }

    /// The missed-publication alert interval; `0` means disabled.
    #[must_use]
    pub fn alert_after_interval(&self) -> AlertAfterIntervalMs {
        self.alert_after_interval
    }

    /// Absolute expiry, ms since epoch UTC.
    #[must_use]
    pub fn expiry_ms(&self) -> u64 {
        self.expiry_ms
    }

    /// Per-publication message TTL.
    #[must_use]
    pub fn publication_ttl(&self) -> PublicationTtlMs {
        self.publication_ttl
    }
}

/// Any of the three unicast qos kinds, plus a multicast partition path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SubscriptionQos {
    /// See [`OnChangeQos`].
    OnChange(OnChangeQos),
    /// See [`OnChangeWithKeepAliveQos`].
    OnChangeWithKeepAlive(OnChangeWithKeepAliveQos),
    /// See [`PeriodicQos`].
    Periodic(PeriodicQos),
    /// A unicast qos plus a partition path, for multicast subscriptions.
    Multicast(MulticastQos),
}

impl SubscriptionQos {
    /// The absolute expiry shared by every qos variant.
    #[must_use]
    pub fn expiry_ms(&self) -> u64 {
        match self {
            Self::OnChange(q) => q.expiry_ms(),
            Self::OnChangeWithKeepAlive(q) => q.expiry_ms(),
            Self::Periodic(q) => q.expiry_ms(),
            Self::Multicast(q) => q.unicast.expiry_ms(),
        }
    }

    /// The missed-publication alert interval, if this variant schedules one.
    #[must_use]
    pub fn alert_after_interval_ms(&self) -> Option<u64> {
        match self {
            Self::OnChange(_) => None,
            Self::OnChangeWithKeepAlive(q) => Some(q.alert_after_interval().into_inner()),
            Self::Periodic(q) => Some(q.alert_after_interval().into_inner()),
            Self::Multicast(q) => q.unicast.alert_after_interval_ms(),
        }
    }
}

/// Multicast qos: a unicast qos plus an ordered partition path.
///
/// Partition segments must each match `[a-zA-Z0-9]+`, the single-level
/// wildcard `+`, or the multi-level wildcard `*` (only valid as the final
/// segment); validated by [`MulticastQos::try_new`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MulticastQos {
    unicast: Box<SubscriptionQos>,
    partitions: Vec<String>,
}

/// Raised when a multicast partition path does not match the grammar.
#[derive(Debug, Error)]
#[error("invalid multicast partition segment {segment:?} at index {index}")]
pub struct InvalidPartitionError {
    /// The offending segment.
    pub segment: String,
    /// Its position in the partition path.
    pub index: usize,
}

impl MulticastQos {
    /// Builds a multicast qos, validating every partition segment against
    /// the grammar (alphanumeric, `+`, or `*` only as the last segment).
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPartitionError`] for a malformed segment.
    pub fn try_new(
        unicast: SubscriptionQos,
        partitions: Vec<String>,
    ) -> Result<Self, InvalidPartitionError> {
        let last = partitions.len().saturating_sub(1);
        for (index, segment) in partitions.iter().enumerate() {
            let is_valid = if segment == "+" {
                true
            } else if segment == "*" {
                index == last
            } else {
                !segment.is_empty() && segment.chars().all(|c| c.is_ascii_alphanumeric())
            };
            if !is_valid {
                return Err(InvalidPartitionError {
                    segment: segment.clone(),
                    index,
                });
            }
        }
        Ok(Self {
            unicast: Box::new(unicast),
            partitions,
        })
    }

    /// The wrapped unicast qos.
    #[must_use]
    pub fn unicast(&self) -> &SubscriptionQos {
        &self.unicast
    }

    /// The ordered partition path.
    #[must_use]
    pub fn partitions(&self) -> &[String] {
        &self.partitions
    }
}

/// The maximum allowed value for any qos duration field, exposed for
/// validation callers that need the bound without importing `nutype`
/// internals.
#[must_use]
pub fn max_duration_ms() -> u64 {
    THIRTY_DAYS_MS
}
