//! File-backed key-value storage.
//!
//! The whole store is one JSON object. Every write replaces the file by
//! writing a sibling temp file and renaming it over the original, so a
//! crash leaves either the old or the new contents.
//!
//! # Example
//!
//! ```no_run
//! use bookclub_auth::stores::FileStorage;
//!
//! let storage = FileStorage::open("/var/lib/bookclub/session.json")?;
//! # Ok::<(), bookclub_auth::AuthError>(())
//! ```

use crate::error::{AuthError, Result};
use crate::providers::{KeyValueStorage, StorageWrite};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Durable storage in a single JSON file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the file exists but cannot be read
    /// or is not a JSON object of strings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                AuthError::Storage(format!("Corrupt storage file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(AuthError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            },
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Opened file storage");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| AuthError::Storage(format!("Failed to encode storage: {e}")))?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| AuthError::Storage(format!("Failed to create {}: {e}", dir.display())))?;
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| AuthError::Storage(format!("Failed to write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            AuthError::Storage(format!("Failed to replace {}: {e}", self.path.display()))
        })
    }

    fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = entries.clone();
        if !change(&mut next) {
            return Ok(());
        }
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string()).as_deref() != Some(value)
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| entries.remove(key).is_some())
    }

    /// All changes land in one file replacement, or none do.
    fn apply(&self, writes: &[StorageWrite<'_>]) -> Result<()> {
        self.update(|entries| {
            writes.iter().fold(false, |changed, write| {
                let changed_now = match *write {
                    StorageWrite::Set(key, value) => {
                        entries.insert(key.to_string(), value.to_string()).as_deref()
                            != Some(value)
                    },
                    StorageWrite::Remove(key) => entries.remove(key).is_some(),
                };
                changed || changed_now
            })
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = FileStorage::open(&path).unwrap();
        storage.set("auth_token", "a.b.c").unwrap();
        storage.set("auth_user", r#"{"username":"ana"}"#).unwrap();
        drop(storage);

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("auth_token").unwrap().as_deref(), Some("a.b.c"));
        assert!(reopened.get("missing").unwrap().is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("s.json")).unwrap();

        storage.set("k", "v").unwrap();
        storage.remove("k").unwrap();
        storage.remove("k").unwrap();
        assert!(storage.get("k").unwrap().is_none());
    }

    #[test]
    fn missing_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("nested/dir/s.json")).unwrap();
        storage.set("k", "v").unwrap();
        assert!(storage.path().exists());
    }

    #[test]
    fn batch_lands_in_one_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        let storage = FileStorage::open(&path).unwrap();
        storage.set("gone", "soon").unwrap();

        storage
            .apply(&[
                StorageWrite::Set("a", "1"),
                StorageWrite::Set("b", "2"),
                StorageWrite::Remove("gone"),
            ])
            .unwrap();

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(reopened.get("b").unwrap().as_deref(), Some("2"));
        assert!(reopened.get("gone").unwrap().is_none());
    }

    #[test]
    fn failed_batch_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        let storage = FileStorage::open(&path).unwrap();
        storage.set("a", "1").unwrap();

        // The temp file cannot be created where a directory sits.
        std::fs::create_dir(path.with_extension("tmp")).unwrap();
        let result = storage.apply(&[StorageWrite::Set("a", "2"), StorageWrite::Set("b", "3")]);

        assert!(matches!(result, Err(AuthError::Storage(_))));
        assert_eq!(storage.get("a").unwrap().as_deref(), Some("1"));
        assert!(storage.get("b").unwrap().is_none());
        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("a").unwrap().as_deref(), Some("1"));
        assert!(reopened.get("b").unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(FileStorage::open(&path), Err(AuthError::Storage(_))));
    }
}
