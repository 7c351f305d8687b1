use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::app_dirs::AppDirs;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode value for key `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode store {path}: {source}")]
    EncodeFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable key-value storage for small typed values (levels, preferences).
///
/// Reads never fail: a missing or unreadable value is simply absent, and the
/// caller falls back to its defaults.
pub trait KeyValueStore {
    fn get_raw(&self, key: &str) -> Option<Value>;
    fn set_raw(&mut self, key: &str, value: Value) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;

    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T>
    where
        Self: Sized,
    {
        let raw = self.get_raw(key)?;
        match serde_json::from_value(raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, %err, "Ignoring undecodable stored value");
                None
            }
        }
    }

    fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StoreError>
    where
        Self: Sized,
    {
        let raw = serde_json::to_value(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.set_raw(key, raw)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get_raw(&self, key: &str) -> Option<Value> {
        (**self).get_raw(key)
    }

    fn set_raw(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        (**self).set_raw(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// Store kept entirely in memory; used by tests and throwaway sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_raw(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set_raw(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.values.remove(key);
        Ok(())
    }
}

/// Store backed by a single pretty-printed JSON object on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::with_path(AppDirs::store_path())
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        let path = p.as_ref().to_path_buf();
        let values = Self::read(&path);
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(path: &Path) -> Map<String, Value> {
        let Ok(bytes) = fs::read(path) else {
            return Map::new();
        };
        match serde_json::from_slice::<Map<String, Value>>(&bytes) {
            Ok(values) => values,
            Err(err) => {
                warn!(path = %path.display(), %err, "Store file is corrupt, starting empty");
                Map::new()
            }
        }
    }

    /// Encode before touching the disk, so a failed encode leaves the old file.
    fn flush(&self) -> Result<(), StoreError> {
        let data =
            serde_json::to_vec_pretty(&self.values).map_err(|source| StoreError::EncodeFile {
                path: self.path.clone(),
                source,
            })?;
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&self.path, data).map_err(io_err)
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for FileStore {
    fn get_raw(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set_raw(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memory_store_typed_roundtrip() {
        let mut store = MemoryStore::new();
        store.set("answer", &42u32).unwrap();
        assert_eq!(store.get::<u32>("answer"), Some(42));
        assert_eq!(store.get::<u32>("missing"), None);
    }

    #[test]
    fn wrong_type_reads_as_absent() {
        let mut store = MemoryStore::new();
        store.set("name", &"schulte").unwrap();
        assert_eq!(store.get::<u32>("name"), None);
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let mut store = FileStore::with_path(&path);
        store.set("values", &vec![1, 2, 3]).unwrap();
        assert!(path.exists());

        let reopened = FileStore::with_path(&path);
        assert_eq!(reopened.get::<Vec<i32>>("values"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn file_store_remove() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let mut store = FileStore::with_path(&path);
        store.set("a", &true).unwrap();
        store.remove("a").unwrap();

        let reopened = FileStore::with_path(&path);
        assert_eq!(reopened.get::<bool>("a"), None);
    }

    #[test]
    fn failed_write_is_reported_and_keeps_values() {
        let dir = tempdir().unwrap();
        // a directory cannot be overwritten with the store contents
        let mut store = FileStore::with_path(dir.path());
        let err = store.set("a", &1u8).unwrap_err();
        assert!(matches!(err, StoreError::Io { ref path, .. } if path == dir.path()));
        assert_eq!(store.get::<u8>("a"), Some(1));
    }

    #[test]
    fn unencodable_value_is_an_error() {
        use std::collections::BTreeMap;

        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let mut store = FileStore::with_path(&path);
        store.set("kept", &true).unwrap();

        let mut bad = BTreeMap::new();
        bad.insert(vec![1u8], 1u8);
        let err = store.set("bad", &bad).unwrap_err();
        assert!(matches!(err, StoreError::Encode { ref key, .. } if key == "bad"));

        let reopened = FileStore::with_path(&path);
        assert_eq!(reopened.get::<bool>("kept"), Some(true));
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, b"{ not json").unwrap();

        let store = FileStore::with_path(&path);
        assert_eq!(store.get_raw("levels"), None);
    }
}
