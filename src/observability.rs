//! Logging initialization and structured lifecycle events.
//!
//! Tracing spans opened with `#[instrument]` at each component's
//! suspension points carry the bulk of the crate's observability; this
//! module only adds the startup wiring (`JOYNR_LOG_LEVEL` → `EnvFilter`)
//! and a small set of structured events for state transitions that are
//! worth recording independently of any one call's span (subscription
//! expiry, queue overflow, arbitration outcome) so a log pipeline can
//! alert on them without parsing span text.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::domain::{ParticipantId, SubscriptionId};

/// Maps a `JOYNR_LOG_LEVEL` value (§6) onto a `tracing` directive.
///
/// `FATAL` has no `tracing` equivalent and is mapped to `error`.
fn directive_for(log_level: &str) -> &'static str {
    match log_level.to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "WARN" => "warn",
        "ERROR" | "FATAL" => "error",
        "OFF" => "off",
        _ => "info",
    }
}

/// Initializes the global `tracing` subscriber.
///
/// `log_level` is the crate's configured default (see `CcConfig::log_level`)
/// and is used only when `RUST_LOG` is unset, via the
/// `EnvFilter::from_default_env().add_directive(...)` pattern.
///
/// # Errors
///
/// Returns an error if `log_level` does not parse into a directive, or if
/// a global subscriber has already been installed.
pub fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let directive = format!("ccmp={}", directive_for(log_level));
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).try_init().map_err(|err| anyhow::anyhow!(err))
}

/// A structured lifecycle event worth recording outside of a single span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CcEventKind {
    /// A message was dropped because its participant's queue was at `maxQueueMessageCount`.
    QueueOverflow {
        /// The participant whose queue rejected the message.
        participant_id: ParticipantId,
    },
    /// A subscription's publication window elapsed without any on-change
    /// publication, and the alert callback fired.
    SubscriptionMissedPublication {
        /// The subscription that missed its alert window.
        subscription_id: SubscriptionId,
    },
    /// A subscription expired and was removed by the publication manager.
    SubscriptionExpired {
        /// The subscription that expired.
        subscription_id: SubscriptionId,
    },
    /// Arbitration selected a provider for a discovery request.
    ArbitrationResolved {
        /// The interface that was being arbitrated.
        interface_name: String,
        /// The participant that was selected, if any candidate matched.
        selected: Option<ParticipantId>,
    },
    /// A global directory lookup timed out.
    DiscoveryTimedOut {
        /// The interface that could not be resolved in time.
        interface_name: String,
    },
}

/// A timestamped [`CcEventKind`], ready to log or forward to a collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CcEvent {
    /// Milliseconds since the Unix epoch, from [`crate::domain::message::now_ms`].
    pub timestamp_ms: u64,
    /// What happened.
    pub kind: CcEventKind,
}

impl CcEvent {
    /// Builds an event stamped with the current time.
    #[must_use]
    pub fn now(kind: CcEventKind) -> Self {
        Self { timestamp_ms: crate::domain::message::now_ms(), kind }
    }

    /// Emits this event as a structured `tracing` record at an appropriate
    /// level (overflow and timeouts warn, lifecycle transitions inform).
    pub fn emit(&self) {
        match &self.kind {
            CcEventKind::QueueOverflow { participant_id } => {
                tracing::warn!(%participant_id, timestamp_ms = self.timestamp_ms, "queue overflow");
            }
            CcEventKind::SubscriptionMissedPublication { subscription_id } => {
                tracing::warn!(%subscription_id, timestamp_ms = self.timestamp_ms, "missed publication alert");
            }
            CcEventKind::SubscriptionExpired { subscription_id } => {
                tracing::info!(%subscription_id, timestamp_ms = self.timestamp_ms, "subscription expired");
            }
            CcEventKind::ArbitrationResolved { interface_name, selected } => {
                tracing::info!(interface_name, ?selected, timestamp_ms = self.timestamp_ms, "arbitration resolved");
            }
            CcEventKind::DiscoveryTimedOut { interface_name } => {
                tracing::warn!(interface_name, timestamp_ms = self.timestamp_ms, "discovery timed out");
            }
        }
    }
}
