//! Key-value store abstraction for on-device persistence.
//!
//! The engine does not mandate a storage backend; everything it persists goes
//! through this interface. Keys are namespaced strings, values opaque bytes.

use std::collections::BTreeMap;
use std::sync::RwLock;

use gatecheck_common::Result;

/// On-device key-value storage.
///
/// All operations are synchronous: check-in operations must never suspend on
/// I/O. Implementations provide their own interior mutability.
pub trait KeyValueStore: Send + Sync {
    /// Get the value for a key, if present.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Insert or replace the value for a key.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Delete a key. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Delete all entries whose key starts with `prefix`; returns the count.
    fn delete_prefix(&self, prefix: &str) -> Result<usize>;
}

/// In-memory store.
///
/// Useful for tests and ephemeral sessions. All data is lost on drop.
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let mut entries = self.entries.write().unwrap();
        let keys: Vec<String> = entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            entries.remove(key);
        }
        Ok(keys.len())
    }
}
