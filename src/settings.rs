//! Settings-file loading (§6): the `SettingsSource` external-collaborator
//! boundary named in §10.5.
//!
//! A settings file is a flat `key=value` map (the same shape as the
//! persistence layer's [`crate::persistence::IniStore`], reused here since
//! both are joynr-style `.ini` text). [`apply_to`] maps the well-known keys
//! onto a [`crate::config::CcConfigBuilder`] so a malformed settings file
//! and a malformed programmatic config hit the same `validate()` call.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use crate::config::{CcConfig, CcConfigBuilder, ConfigError};
use crate::persistence::IniStore;

/// Loads the settings key/value map from wherever it lives.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// Returns the current settings as a flat key/value map.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the underlying source cannot be read.
    async fn load(&self) -> Result<HashMap<String, String>, ConfigError>;
}

/// Production adapter: an `.ini`-style file on disk.
#[derive(Debug, Clone)]
pub struct FileSettingsSource {
    store: IniStore,
}

impl FileSettingsSource {
    /// Loads (or creates) the settings file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file exists but cannot be read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let store = IniStore::load(path.as_ref().to_path_buf())
            .map_err(|err| ConfigError::Io(std::io::Error::other(err)))?;
        Ok(Self { store })
    }
}

#[async_trait]
impl SettingsSource for FileSettingsSource {
    async fn load(&self) -> Result<HashMap<String, String>, ConfigError> {
        Ok(self.store.entries().into_iter().collect())
    }
}

/// Test double backed by an in-memory map, no filesystem access.
#[derive(Debug, Clone, Default)]
pub struct InMemorySettingsSource {
    values: HashMap<String, String>,
}

impl InMemorySettingsSource {
    /// Builds a settings source from a literal map.
    #[must_use]
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

#[async_trait]
impl SettingsSource for InMemorySettingsSource {
    async fn load(&self) -> Result<HashMap<String, String>, ConfigError> {
        Ok(self.values.clone())
    }
}

/// Applies recognized settings keys onto `builder`, then validates.
///
/// Unrecognized keys are ignored; a key present but unparsable for its
/// target type is a [`ConfigError::Parse`].
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] for a malformed value, or whatever
/// [`ConfigError`] `CcConfig::validate` raises for a cross-field violation.
pub fn apply_to(
    values: &HashMap<String, String>,
    mut builder: CcConfigBuilder,
) -> Result<CcConfig, ConfigError> {
    macro_rules! parse_into {
        ($key:expr, $setter:ident, $ty:ty) => {
            if let Some(raw) = values.get($key) {
                let parsed: $ty = raw
                    .parse()
                    .map_err(|_| ConfigError::Parse(format!("key `{}` has invalid value `{raw}`", $key)))?;
                builder = builder.$setter(parsed);
            }
        };
    }

    // Crate-specific tuning keys, not part of the original settings-file
    // vocabulary but following its dotted-path convention.
    parse_into!("cluster-controller/queue-global-byte-cap", queue_global_byte_cap, u64);
    parse_into!("cluster-controller/queue-global-count-cap", queue_global_count_cap, u64);
    parse_into!("cluster-controller/queue-per-key-count-cap", queue_per_key_count_cap, u64);
    parse_into!("cluster-controller/router-max-retries", router_max_retries, u32);
    parse_into!("cluster-controller/router-retry-backoff-base-ms", router_retry_backoff_base_ms, u64);
    parse_into!("cluster-controller/router-retry-backoff-factor", router_retry_backoff_factor, f64);
    parse_into!("cluster-controller/router-retry-backoff-cap-ms", router_retry_backoff_cap_ms, u64);
    parse_into!("cluster-controller/scheduler-worker-count", scheduler_worker_count, usize);
    parse_into!("cluster-controller/reply-default-ttl-ms", reply_default_ttl_ms, u64);
    parse_into!("cluster-controller/lcd-cache-max-age-ms", lcd_cache_max_age_ms, u64);
    parse_into!("cluster-controller/lcd-discovery-timeout-ms", lcd_discovery_timeout_ms, u64);
    parse_into!("cluster-controller/lcd-retry-interval-ms", lcd_retry_interval_ms, u64);

    // Keys named in §6 of the settings-file vocabulary.
    if let Some(raw) = values.get("cluster-controller/ws-port") {
        let port: u16 = raw
            .parse()
            .map_err(|_| ConfigError::Parse(format!("key `cluster-controller/ws-port` has invalid value `{raw}`")))?;
        builder = builder.ws_port(Some(port));
    }
    if let Some(raw) = values.get("cluster-controller/ws-tls-port") {
        let port: u16 = raw
            .parse()
            .map_err(|_| ConfigError::Parse(format!("key `cluster-controller/ws-tls-port` has invalid value `{raw}`")))?;
        builder = builder.ws_tls_port(Some(port));
    }
    if let Some(path) = values.get("lib-joynr/participant-ids-persistence-file") {
        builder = builder.participant_ids_persistence_file(path.into());
    }
    if let Some(path) = values.get("cluster-controller/multicast-receiver-directory-persistence-file") {
        builder = builder.multicast_receiver_directory_persistence_file(path.into());
    }
    if let Some(url) = values.get("messaging/broker-url") {
        builder = builder.mqtt_broker_url(Some(url.clone()));
    }
    if let Some(domain) = values.get("messaging/discovery-directories-domain") {
        builder = builder.global_directory_base_url(Some(domain.clone()));
    }
    if let Some(level) = values.get("JOYNR_LOG_LEVEL").or_else(|| values.get("log-level")) {
        builder = builder.log_level(level.clone());
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_source_round_trips() {
        let mut values = HashMap::new();
        values.insert("log-level".to_string(), "WARN".to_string());
        let source = InMemorySettingsSource::new(values);
        let loaded = source.load().await.unwrap();
        assert_eq!(loaded.get("log-level").unwrap(), "WARN");
    }

    #[test]
    fn apply_to_maps_known_keys() {
        let mut values = HashMap::new();
        values.insert("cluster-controller/scheduler-worker-count".to_string(), "4".to_string());
        values.insert("JOYNR_LOG_LEVEL".to_string(), "TRACE".to_string());

        let config = apply_to(&values, CcConfig::builder()).unwrap();
        assert_eq!(config.scheduler_worker_count, 4);
        assert_eq!(config.log_level, "TRACE");
    }

    #[test]
    fn apply_to_maps_joynr_settings_keys() {
        let mut values = HashMap::new();
        values.insert("cluster-controller/ws-port".to_string(), "4242".to_string());
        values.insert("messaging/broker-url".to_string(), "tcp://broker:1883".to_string());
        values.insert(
            "lib-joynr/participant-ids-persistence-file".to_string(),
            "/var/lib/ccmp/participant-ids.ini".to_string(),
        );

        let config = apply_to(&values, CcConfig::builder()).unwrap();
        assert_eq!(config.ws_port, Some(4242));
        assert_eq!(config.mqtt_broker_url.as_deref(), Some("tcp://broker:1883"));
        assert_eq!(
            config.participant_ids_persistence_file.to_str().unwrap(),
            "/var/lib/ccmp/participant-ids.ini"
        );
    }

    #[test]
    fn apply_to_rejects_malformed_value() {
        let mut values = HashMap::new();
        values.insert(
            "cluster-controller/scheduler-worker-count".to_string(),
            "not-a-number".to_string(),
        );

        let err = apply_to(&values, CcConfig::builder()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn apply_to_still_validates_cross_field_invariants() {
        let mut values = HashMap::new();
        values.insert("cluster-controller/scheduler-worker-count".to_string(), "0".to_string());

        let err = apply_to(&values, CcConfig::builder()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field: "scheduler_worker_count", .. }));
    }
}
