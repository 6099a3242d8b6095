//! In-memory key-value storage.

use crate::error::Result;
use crate::providers::{KeyValueStorage, StorageWrite};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Storage that lives as long as the process.
///
/// Counts writes per key, which lets tests check how often a value was
/// actually stored.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, String>,
    writes: HashMap<String, usize>,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls for `key`.
    #[must_use]
    pub fn writes(&self, key: &str) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.writes.get(key).copied().unwrap_or(0)
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.is_empty()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.insert(key.to_string(), value.to_string());
        *inner.writes.entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.remove(key);
        Ok(())
    }

    fn apply(&self, writes: &[StorageWrite<'_>]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for write in writes {
            match *write {
                StorageWrite::Set(key, value) => {
                    inner.entries.insert(key.to_string(), value.to_string());
                    *inner.writes.entry(key.to_string()).or_insert(0) += 1;
                },
                StorageWrite::Remove(key) => {
                    inner.entries.remove(key);
                },
            }
        }
        Ok(())
    }
}
