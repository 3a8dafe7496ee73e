//! One-JSON-file-per-record store, used for the LCD cache and for
//! publication/subscription records (§6c).

use std::fs;
use std::marker::PhantomData;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::ini_store::write_replace;

/// Errors raised reading or writing a [`JsonRecordStore`].
#[derive(Debug, Error)]
pub enum JsonRecordStoreError {
    /// Underlying file I/O failed.
    #[error("record store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The record's JSON was malformed.
    #[error("record JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stores one JSON file per record under a directory, keyed by an
/// arbitrary string id.
pub struct JsonRecordStore<T> {
    dir: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> JsonRecordStore<T> {
    /// Opens (creating if necessary) a record store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`JsonRecordStoreError`] if `dir` cannot be created.
    pub fn open(dir: PathBuf) -> Result<Self, JsonRecordStoreError> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            _marker: PhantomData,
        })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_id(id)))
    }

    /// Writes (or overwrites) the record for `id`, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`JsonRecordStoreError`] on serialization or I/O failure.
    pub fn put(&self, id: &str, value: &T) -> Result<(), JsonRecordStoreError> {
        let json = serde_json::to_string_pretty(value)?;
        write_replace(&self.path_for(id), &json).map_err(|err| match err {
            super::ini_store::IniStoreError::Io(io) => JsonRecordStoreError::Io(io),
            super::ini_store::IniStoreError::MalformedLine(_) => unreachable!(
                "write_replace never returns MalformedLine; it only writes"
            ),
        })
    }

    /// Reads the record for `id`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`JsonRecordStoreError`] if the file exists but is malformed.
    pub fn get(&self, id: &str) -> Result<Option<T>, JsonRecordStoreError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Deletes the record for `id`, a no-op if absent.
    ///
    /// # Errors
    ///
    /// Returns [`JsonRecordStoreError`] if the delete fails for a reason
    /// other than the file already being absent.
    pub fn remove(&self, id: &str) -> Result<(), JsonRecordStoreError> {
        let path = self.path_for(id);
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Lists every `(id, record)` pair currently stored, used to replay
    /// persisted state on restart.
    ///
    /// # Errors
    ///
    /// Returns [`JsonRecordStoreError`] if the directory cannot be read or
    /// a record is malformed.
    pub fn list(&self) -> Result<Vec<(String, T)>, JsonRecordStoreError> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let contents = fs::read_to_string(&path)?;
            records.push((stem.to_string(), serde_json::from_str(&contents)?));
        }
        Ok(records)
    }
}

fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn put_get_remove_round_trip() {
        let dir = tempdir().unwrap();
        let store: JsonRecordStore<Sample> = JsonRecordStore::open(dir.path().to_path_buf()).unwrap();
        store.put("rec-1", &Sample { value: 42 }).unwrap();
        assert_eq!(store.get("rec-1").unwrap(), Some(Sample { value: 42 }));
        store.remove("rec-1").unwrap();
        assert_eq!(store.get("rec-1").unwrap(), None);
    }

    #[test]
    fn list_returns_every_record() {
        let dir = tempdir().unwrap();
        let store: JsonRecordStore<Sample> = JsonRecordStore::open(dir.path().to_path_buf()).unwrap();
        store.put("a", &Sample { value: 1 }).unwrap();
        store.put("b", &Sample { value: 2 }).unwrap();
        let mut records = store.list().unwrap();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(records, vec![
            ("a".to_string(), Sample { value: 1 }),
            ("b".to_string(), Sample { value: 2 }),
        ]);
    }
}
