//! Arbitration helper (§4.10): applies a proxy-supplied strategy to the
//! candidates returned from a [`super::directory::LocalCapabilitiesDirectory::lookup`]
//! call. The selection logic itself lives on the domain type; this module
//! only re-exports it under the LCD's public surface.

pub use crate::domain::capabilities::{ArbitrationCandidate, ArbitrationResult, ArbitrationStrategy};

/// Applies `strategy` to `candidates`, returning the selected subset.
#[must_use]
pub fn arbitrate(
    strategy: &ArbitrationStrategy,
    candidates: Vec<ArbitrationCandidate>,
    now_ms: u64,
) -> ArbitrationResult {
    ArbitrationResult::apply(strategy, candidates, now_ms)
}
