//! Small formatting helpers shared across components.

use std::time::Duration;

/// Formats a duration as seconds with millisecond precision, for log
/// messages (backoff delays, TTL countdowns, cache ages).
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    format!("{:.3}s", duration.as_secs_f64())
}
