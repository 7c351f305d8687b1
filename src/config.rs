use serde::{Deserialize, Serialize};

use crate::store::{KeyValueStore, StoreError};

const CONFIG_KEY: &str = "config";

/// Player preferences kept next to level progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Highlight the cell holding the next number.
    pub hint_needed: bool,
    pub dark_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hint_needed: true,
            dark_mode: true,
        }
    }
}

impl Config {
    pub fn load<S: KeyValueStore>(store: &S) -> Self {
        store.get(CONFIG_KEY).unwrap_or_default()
    }

    pub fn save<S: KeyValueStore>(&self, store: &mut S) -> Result<(), StoreError> {
        store.set(CONFIG_KEY, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MemoryStore};
    use tempfile::tempdir;

    #[test]
    fn missing_config_is_default() {
        let store = MemoryStore::new();
        assert_eq!(Config::load(&store), Config::default());
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let mut store = FileStore::with_path(&path);
        let cfg = Config {
            hint_needed: false,
            dark_mode: false,
        };
        cfg.save(&mut store).unwrap();

        let loaded = Config::load(&FileStore::with_path(&path));
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let mut store = MemoryStore::new();
        store
            .set_raw(CONFIG_KEY, serde_json::json!({ "hint_needed": false }))
            .unwrap();
        let cfg = Config::load(&store);
        assert!(!cfg.hint_needed);
        assert!(cfg.dark_mode);
    }
}
