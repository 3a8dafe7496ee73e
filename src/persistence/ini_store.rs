//! Minimal INI-style `key=value` store with write-replace durability.
//!
//! Not a general INI parser: the formats in §6 are flat key/value pairs
//! with no sections, so a one-line-per-entry format is all either
//! persisted file needs. In spirit it follows a read-once-at-startup,
//! hold-in-memory, write-through-on-change settings pattern rather than
//! any specific file format, since nothing else in this codebase persists
//! through flat files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use thiserror::Error;

/// Errors raised loading or saving an [`IniStore`].
#[derive(Debug, Error)]
pub enum IniStoreError {
    /// Underlying file I/O failed.
    #[error("ini store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A line did not match `key=value`.
    #[error("malformed ini line: {0:?}")]
    MalformedLine(String),
}

/// A flat `key=value` file, held in memory and rewritten atomically on
/// every change.
pub struct IniStore {
    path: PathBuf,
    entries: DashMap<String, String>,
}

impl IniStore {
    /// Loads `path` if it exists, or starts empty if it does not.
    ///
    /// # Errors
    ///
    /// Returns [`IniStoreError`] if the file exists but cannot be read or
    /// contains a malformed line.
    pub fn load(path: PathBuf) -> Result<Self, IniStoreError> {
        let entries = DashMap::new();
        if path.exists() {
            let contents = fs::read_to_string(&path)?;
            for line in contents.lines() {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                    continue;
                }
                let (key, value) = trimmed
                    .split_once('=')
                    .ok_or_else(|| IniStoreError::MalformedLine(trimmed.to_string()))?;
                entries.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Ok(Self { path, entries })
    }

    /// Returns the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.clone())
    }

    /// Sets `key` to `value` and persists the whole store to disk.
    ///
    /// # Errors
    ///
    /// Returns [`IniStoreError`] if the write-replace fails.
    pub fn set(&self, key: String, value: String) -> Result<(), IniStoreError> {
        self.entries.insert(key, value);
        self.save()
    }

    /// Removes `key` and persists the whole store to disk. A no-op (but
    /// still durable) if `key` is absent.
    ///
    /// # Errors
    ///
    /// Returns [`IniStoreError`] if the write-replace fails.
    pub fn remove(&self, key: &str) -> Result<(), IniStoreError> {
        self.entries.remove(key);
        self.save()
    }

    /// All entries, for iteration (e.g. rebuilding the multicast receiver
    /// directory on restart).
    #[must_use]
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    fn save(&self) -> Result<(), IniStoreError> {
        let ordered: BTreeMap<String, String> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let mut contents = String::new();
        for (key, value) in ordered {
            contents.push_str(&key);
            contents.push('=');
            contents.push_str(&value);
            contents.push('\n');
        }
        write_replace(&self.path, &contents)
    }
}

/// Writes `contents` to `path` via a temp-file-then-rename so a crash mid
/// write never leaves a truncated file.
pub(crate) fn write_replace(path: &Path, contents: &str) -> Result<(), IniStoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.ini");
        {
            let store = IniStore::load(path.clone()).unwrap();
            store.set("a.b.c".to_string(), "value-1".to_string()).unwrap();
        }
        let reloaded = IniStore::load(path).unwrap();
        assert_eq!(reloaded.get("a.b.c"), Some("value-1".to_string()));
    }

    #[test]
    fn remove_is_durable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.ini");
        let store = IniStore::load(path.clone()).unwrap();
        store.set("k".to_string(), "v".to_string()).unwrap();
        store.remove("k").unwrap();
        let reloaded = IniStore::load(path).unwrap();
        assert_eq!(reloaded.get("k"), None);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = IniStore::load(dir.path().join("absent.ini")).unwrap();
        assert!(store.entries().is_empty());
    }
}
