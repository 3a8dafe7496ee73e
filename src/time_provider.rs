//! Time abstraction layer for testable time-dependent operations.
//!
//! Every suspension point in the scheduler, publication manager, and LCD
//! goes through a [`TimeProvider`] instead of calling `tokio::time` or
//! `SystemTime` directly, so tests can skip delays without conditional
//! compilation.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::time::sleep as tokio_sleep;

/// Trait for providing time-related functionality.
#[async_trait]
pub trait TimeProvider: Send + Sync + std::fmt::Debug {
    /// Sleep for the specified duration.
    async fn sleep(&self, duration: Duration);

    /// Get the current wall-clock time.
    #[must_use]
    fn now(&self) -> SystemTime;

    /// Get the current instant for measuring elapsed time.
    #[must_use]
    fn instant(&self) -> Instant;

    /// Check if delays should be skipped (test providers only).
    #[must_use]
    fn should_skip_delays(&self) -> bool {
        false
    }
}

/// Real time provider for production use.
#[derive(Debug, Clone, Default)]
pub struct RealTimeProvider;

impl RealTimeProvider {
    /// Creates a new real time provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TimeProvider for RealTimeProvider {
    async fn sleep(&self, duration: Duration) {
        tokio_sleep(duration).await;
    }

    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }
}

/// Mock time provider for testing.
///
/// Skips sleeps past a minimal yield so tests exercise real scheduling
/// without waiting out real TTLs and backoff delays.
#[derive(Debug, Clone, Default)]
pub struct MockTimeProvider {
    skip_delays: bool,
}

impl MockTimeProvider {
    /// Creates a mock time provider that skips delays.
    #[must_use]
    pub fn new() -> Self {
        Self { skip_delays: true }
    }

    /// Creates a mock time provider that uses real delays, for integration
    /// tests that need to observe actual scheduling order.
    #[must_use]
    pub fn with_real_delays() -> Self {
        Self { skip_delays: false }
    }
}

#[async_trait]
impl TimeProvider for MockTimeProvider {
    async fn sleep(&self, duration: Duration) {
        if !self.skip_delays {
            tokio_sleep(duration).await;
        } else if duration > Duration::from_millis(1) {
            tokio_sleep(Duration::from_millis(1)).await;
        }
    }

    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    fn should_skip_delays(&self) -> bool {
        self.skip_delays
    }
}

/// Shared, type-erased time provider handle.
pub type SharedTimeProvider = Arc<dyn TimeProvider>;

/// Creates a production time provider.
#[must_use]
pub fn production_time_provider() -> SharedTimeProvider {
    Arc::new(RealTimeProvider::new())
}

/// Creates a test time provider that skips delays.
#[must_use]
pub fn test_time_provider() -> SharedTimeProvider {
    Arc::new(MockTimeProvider::new())
}

/// Creates a test time provider that uses real delays, for integration
/// tests that need to observe actual scheduling order.
#[must_use]
pub fn integration_test_time_provider() -> SharedTimeProvider {
    Arc::new(MockTimeProvider::with_real_delays())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_time_provider_skips_delays() {
        let provider = MockTimeProvider::new();
        let start = Instant::now();

        provider.sleep(Duration::from_secs(10)).await;

        let elapsed = start.elapsed();
        assert!(
            elapsed < Duration::from_millis(100),
            "mock sleep took too long: {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn real_time_provider_actually_sleeps() {
        let provider = RealTimeProvider::new();
        let start = Instant::now();

        provider.sleep(Duration::from_millis(50)).await;

        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(50),
            "real sleep was too short: {elapsed:?}"
        );
    }
}
