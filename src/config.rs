//! Cluster controller configuration.
//!
//! Grounded on `message_router::config::{RouterConfig, RouterConfigBuilder}`:
//! a flat struct of tunables, a builder with chained setters,
//! `development()` / `production()` / `testing()` presets, and a
//! `validate()` pass enforcing cross-field invariants. Settings-file values
//! (`SPEC_FULL.md` §6) are mapped onto the same fields before `validate()`
//! runs, so a malformed settings file and a malformed programmatic config
//! hit one validation path.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building or loading a [`CcConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field failed a validation rule.
    #[error("invalid configuration field `{field}`: {reason}")]
    Validation {
        /// The offending field name.
        field: &'static str,
        /// Why it is invalid.
        reason: String,
    },
    /// The settings file could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file could not be parsed.
    #[error("failed to parse settings file: {0}")]
    Parse(String),
}

/// All tunables named across §4-§6 of the message-plane specification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CcConfig {
    // Message Queue (C2)
    /// Global byte cap across all recipients.
    pub queue_global_byte_cap: u64,
    /// Global message-count cap across all recipients.
    pub queue_global_count_cap: u64,
    /// Per-recipient message-count cap.
    pub queue_per_key_count_cap: u64,

    // Message Router (C4)
    /// Maximum retry attempts before a transient transport failure becomes
    /// terminal.
    pub router_max_retries: u32,
    /// Base delay of the exponential backoff, ms.
    pub router_retry_backoff_base_ms: u64,
    /// Multiplicative factor applied to the backoff delay per retry.
    pub router_retry_backoff_factor: f64,
    /// Upper bound on the backoff delay, ms.
    pub router_retry_backoff_cap_ms: u64,

    // Delayed Scheduler / Thread Pool (C5)
    /// Worker thread count for the scheduler's execution pool.
    pub scheduler_worker_count: usize,

    // Reply Caller Directory (C7)
    /// Default TTL applied to a reply caller when the request did not
    /// specify one, ms.
    pub reply_default_ttl_ms: u64,

    // Local Capabilities Directory (C10)
    /// Maximum age of a local cache entry still considered fresh, ms.
    pub lcd_cache_max_age_ms: u64,
    /// Timeout for a global directory lookup, ms.
    pub lcd_discovery_timeout_ms: u64,
    /// Delay between global lookup retries, ms.
    pub lcd_retry_interval_ms: u64,

    // Persistence (§6)
    /// Participant-id persistence file path.
    pub participant_ids_persistence_file: PathBuf,
    /// Multicast-receiver-directory persistence file path.
    pub multicast_receiver_directory_persistence_file: PathBuf,
    /// Directory holding LCD cache and subscription record JSON files.
    pub record_store_dir: PathBuf,

    // Transport (§6)
    /// WebSocket non-TLS listen port, if any.
    pub ws_port: Option<u16>,
    /// WebSocket TLS listen port, if any.
    pub ws_tls_port: Option<u16>,
    /// MQTT broker URL.
    pub mqtt_broker_url: Option<String>,

    /// Tracing/log level, mapped from `JOYNR_LOG_LEVEL` or this field if the
    /// environment variable is absent.
    pub log_level: String,

    // Global Directory Client (C10, external collaborator)
    /// Base URL of the global capabilities directory HTTP endpoint. `None`
    /// runs the LCD against an in-memory test double, for local/dev setups
    /// with no global directory deployed.
    pub global_directory_base_url: Option<String>,
}

impl CcConfig {
    /// A preset tuned for local development: small caps, aggressive
    /// retries, in-memory-friendly persistence paths under a temp-like
    /// directory, verbose logging.
    #[must_use]
    pub fn development() -> Self {
        Self {
            queue_global_byte_cap: 16 * 1024 * 1024,
            queue_global_count_cap: 10_000,
            queue_per_key_count_cap: 1_000,
            router_max_retries: 5,
            router_retry_backoff_base_ms: 50,
            router_retry_backoff_factor: 2.0,
            router_retry_backoff_cap_ms: 5_000,
            scheduler_worker_count: 2,
            reply_default_ttl_ms: 30_000,
            lcd_cache_max_age_ms: 60_000,
            lcd_discovery_timeout_ms: 10_000,
            lcd_retry_interval_ms: 1_000,
            participant_ids_persistence_file: PathBuf::from("./data/dev/participant-ids.ini"),
            multicast_receiver_directory_persistence_file: PathBuf::from(
                "./data/dev/multicast-receivers.ini",
            ),
            record_store_dir: PathBuf::from("./data/dev/records"),
            ws_port: Some(4242),
            ws_tls_port: None,
            mqtt_broker_url: None,
            log_level: "DEBUG".to_string(),
            global_directory_base_url: None,
        }
    }

    /// A preset tuned for production: large caps, conservative backoff cap,
    /// durable persistence paths, quieter logging.
    #[must_use]
    pub fn production() -> Self {
        Self {
            queue_global_byte_cap: 512 * 1024 * 1024,
            queue_global_count_cap: 1_000_000,
            queue_per_key_count_cap: 10_000,
            router_max_retries: 3,
            router_retry_backoff_base_ms: 200,
            router_retry_backoff_factor: 2.0,
            router_retry_backoff_cap_ms: 30_000,
            scheduler_worker_count: num_cpus::get(),
            reply_default_ttl_ms: 60_000,
            lcd_cache_max_age_ms: 300_000,
            lcd_discovery_timeout_ms: 30_000,
            lcd_retry_interval_ms: 5_000,
            participant_ids_persistence_file: PathBuf::from(
                "./data/participant-ids.ini",
            ),
            multicast_receiver_directory_persistence_file: PathBuf::from(
                "./data/multicast-receivers.ini",
            ),
            record_store_dir: PathBuf::from("./data/records"),
            ws_port: Some(4242),
            ws_tls_port: Some(4243),
            mqtt_broker_url: Some("tcp://localhost:1883".to_string()),
            log_level: "INFO".to_string(),
            global_directory_base_url: Some("http://localhost:8080/discovery".to_string()),
        }
    }

    /// A preset for fast, deterministic tests: minimal resources, tracing
    /// disabled, paths meant to be overridden with a `tempfile` directory.
    #[must_use]
    pub fn testing() -> Self {
        Self {
            queue_global_byte_cap: 1024 * 1024,
            queue_global_count_cap: 100,
            queue_per_key_count_cap: 20,
            router_max_retries: 1,
            router_retry_backoff_base_ms: 1,
            router_retry_backoff_factor: 1.0,
            router_retry_backoff_cap_ms: 10,
            scheduler_worker_count: 1,
            reply_default_ttl_ms: 1_000,
            lcd_cache_max_age_ms: 1_000,
            lcd_discovery_timeout_ms: 500,
            lcd_retry_interval_ms: 50,
            participant_ids_persistence_file: PathBuf::from("participant-ids.ini"),
            multicast_receiver_directory_persistence_file: PathBuf::from(
                "multicast-receivers.ini",
            ),
            record_store_dir: PathBuf::from("records"),
            ws_port: None,
            ws_tls_port: None,
            mqtt_broker_url: None,
            log_level: "OFF".to_string(),
            global_directory_base_url: None,
        }
    }

    /// Starts a [`CcConfigBuilder`] seeded from the production preset.
    #[must_use]
    pub fn builder() -> CcConfigBuilder {
        CcConfigBuilder {
            config: Self::production(),
        }
    }

    /// Checks cross-field invariants not expressible in a single field's
    /// own type.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for the first violated
    /// invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_per_key_count_cap == 0 {
            return Err(ConfigError::Validation {
                field: "queue_per_key_count_cap",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.queue_per_key_count_cap > self.queue_global_count_cap {
            return Err(ConfigError::Validation {
                field: "queue_per_key_count_cap",
                reason: "must not exceed queue_global_count_cap".to_string(),
            });
        }
        if self.scheduler_worker_count == 0 {
            return Err(ConfigError::Validation {
                field: "scheduler_worker_count",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.router_retry_backoff_cap_ms < self.router_retry_backoff_base_ms {
            return Err(ConfigError::Validation {
                field: "router_retry_backoff_cap_ms",
                reason: "must be >= router_retry_backoff_base_ms".to_string(),
            });
        }
        if self.router_retry_backoff_factor < 1.0 {
            return Err(ConfigError::Validation {
                field: "router_retry_backoff_factor",
                reason: "must be >= 1.0".to_string(),
            });
        }
        if self.lcd_retry_interval_ms == 0 {
            return Err(ConfigError::Validation {
                field: "lcd_retry_interval_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.ws_tls_port.is_some() && self.ws_tls_port == self.ws_port {
            return Err(ConfigError::Validation {
                field: "ws_tls_port",
                reason: "must differ from ws_port".to_string(),
            });
        }
        Ok(())
    }
}

/// Chained builder over [`CcConfig`], following `RouterConfigBuilder`'s
/// shape.
pub struct CcConfigBuilder {
    config: CcConfig,
}

macro_rules! setter {
    ($name:ident, $field:ident, $ty:ty) => {
        /// Sets the corresponding configuration field.
        #[must_use]
        pub fn $name(mut self, value: $ty) -> Self {
            self.config.$field = value;
            self
        }
    };
}

impl CcConfigBuilder {
    setter!(queue_global_byte_cap, queue_global_byte_cap, u64);
    setter!(queue_global_count_cap, queue_global_count_cap, u64);
    setter!(queue_per_key_count_cap, queue_per_key_count_cap, u64);
    setter!(router_max_retries, router_max_retries, u32);
    setter!(router_retry_backoff_base_ms, router_retry_backoff_base_ms, u64);
    setter!(router_retry_backoff_factor, router_retry_backoff_factor, f64);
    setter!(router_retry_backoff_cap_ms, router_retry_backoff_cap_ms, u64);
    setter!(scheduler_worker_count, scheduler_worker_count, usize);
    setter!(reply_default_ttl_ms, reply_default_ttl_ms, u64);
    setter!(lcd_cache_max_age_ms, lcd_cache_max_age_ms, u64);
    setter!(lcd_discovery_timeout_ms, lcd_discovery_timeout_ms, u64);
    setter!(lcd_retry_interval_ms, lcd_retry_interval_ms, u64);
    setter!(participant_ids_persistence_file, participant_ids_persistence_file, PathBuf);
    setter!(
        multicast_receiver_directory_persistence_file,
        multicast_receiver_directory_persistence_file,
        PathBuf
    );
    setter!(record_store_dir, record_store_dir, PathBuf);
    setter!(ws_port, ws_port, Option<u16>);
    setter!(ws_tls_port, ws_tls_port, Option<u16>);
    setter!(mqtt_broker_url, mqtt_broker_url, Option<String>);
    setter!(log_level, log_level, String);
    setter!(global_directory_base_url, global_directory_base_url, Option<String>);

    /// Validates and returns the finished configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] from [`CcConfig::validate`].
    pub fn build(self) -> Result<CcConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_internally_valid() {
        CcConfig::development().validate().unwrap();
        CcConfig::production().validate().unwrap();
        CcConfig::testing().validate().unwrap();
    }

    #[test]
    fn builder_rejects_zero_worker_count() {
        let err = CcConfig::builder().scheduler_worker_count(0).build().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field: "scheduler_worker_count", .. }));
    }

    #[test]
    fn builder_rejects_per_key_cap_above_global_cap() {
        let err = CcConfig::builder()
            .queue_global_count_cap(10)
            .queue_per_key_count_cap(20)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field: "queue_per_key_count_cap", .. }));
    }

    #[test]
    fn builder_rejects_matching_ws_ports() {
        let err = CcConfig::builder()
            .ws_port(Some(4242))
            .ws_tls_port(Some(4242))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field: "ws_tls_port", .. }));
    }
}
