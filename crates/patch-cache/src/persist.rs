//! Durable backing store for cache layers.
//!
//! One sled database holds one tree per layer. Keys and values are CBOR. Each
//! tree carries a version record; opening a layer with a different version
//! drops everything it held.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::CacheError;

/// Reserved key of the version record. Cache keys are structs, whose CBOR
/// encoding never starts with a zero byte.
const VERSION_KEY: &[u8] = b"\0version";

/// Persistent store shared by all layers of one service.
#[derive(Clone)]
pub struct PersistentStore {
    db: sled::Db,
}

impl PersistentStore {
    /// Open or create a store at the given path.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// A store that lives only as long as the process.
    pub fn temporary() -> Result<Self, CacheError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Open the tree of one layer, clearing it when it was written with a
    /// different version.
    pub fn layer(&self, name: &'static str, version: u32) -> Result<LayerStore, CacheError> {
        let tree = self.db.open_tree(name)?;
        let expected = version.to_be_bytes();
        match tree.get(VERSION_KEY)? {
            Some(found) if found.as_ref() == &expected[..] => {}
            found => {
                if found.is_some() || tree.len() > 0 {
                    info!(layer = name, version, "resetting persisted cache layer");
                }
                tree.clear()?;
                tree.insert(VERSION_KEY, &expected[..])?;
            }
        }
        Ok(LayerStore { name, tree })
    }

    pub fn flush(&self) -> Result<(), CacheError> {
        self.db.flush()?;
        Ok(())
    }
}

/// The persisted entries of one layer.
#[derive(Clone)]
pub struct LayerStore {
    name: &'static str,
    tree: sled::Tree,
}

impl LayerStore {
    /// Look up an entry. Unreadable entries are removed and reported as
    /// absent.
    pub fn get<K: Serialize, V: DeserializeOwned>(&self, key: &K) -> Option<V> {
        let key = encode(key).ok()?;
        let bytes = match self.tree.get(&key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(layer = self.name, error = %e, "persisted cache read failed");
                return None;
            }
        };
        match ciborium::from_reader(bytes.as_ref()) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(layer = self.name, error = %e, "dropping undecodable persisted entry");
                let _ = self.tree.remove(&key);
                None
            }
        }
    }

    /// Store an entry. Failures are logged and otherwise ignored.
    pub fn put<K: Serialize, V: Serialize>(&self, key: &K, value: &V) {
        let result = encode(key).and_then(|key| {
            let value = encode(value)?;
            self.tree.insert(key, value)?;
            Ok(())
        });
        if let Err(e) = result {
            warn!(layer = self.name, error = %e, "failed to persist cache entry");
        }
    }

    pub fn remove<K: Serialize>(&self, key: &K) {
        if let Ok(key) = encode(key) {
            if let Err(e) = self.tree.remove(key) {
                warn!(layer = self.name, error = %e, "failed to remove persisted entry");
            }
        }
    }

    /// Number of entries, excluding the version record.
    pub fn len(&self) -> usize {
        self.tree.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CacheError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| CacheError::Serialization(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PersistentStore::open(dir.path()).unwrap();
            let layer = store.layer("numbers", 1).unwrap();
            layer.put(&("a", 1u32), &vec![1u64, 2, 3]);
            store.flush().unwrap();
        }
        let store = PersistentStore::open(dir.path()).unwrap();
        let layer = store.layer("numbers", 1).unwrap();
        assert_eq!(layer.get::<_, Vec<u64>>(&("a", 1u32)), Some(vec![1, 2, 3]));
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn version_change_clears_layer() {
        let store = PersistentStore::temporary().unwrap();
        let layer = store.layer("numbers", 1).unwrap();
        layer.put(&"k", &7u32);
        assert_eq!(layer.get::<_, u32>(&"k"), Some(7));

        let layer = store.layer("numbers", 2).unwrap();
        assert!(layer.is_empty());
        assert_eq!(layer.get::<_, u32>(&"k"), None);
    }

    #[test]
    fn undecodable_entry_is_removed() {
        let store = PersistentStore::temporary().unwrap();
        let layer = store.layer("strings", 1).unwrap();
        layer.put(&"k", &"not a number");
        assert_eq!(layer.get::<_, u32>(&"k"), None);
        assert!(layer.is_empty());
    }
}
