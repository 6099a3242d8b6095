//! Storage implementations for the session store.
//!
//! - **File** - JSON file, survives restarts
//! - **Memory** - process lifetime only; also the test double

pub mod file;
pub mod memory;

// Re-exports
pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::providers::KeyValueStorage;
use std::sync::Arc;

/// Storage chosen by `config.storage_path`: a [`FileStorage`] when a path
/// is set, otherwise a [`MemoryStorage`].
///
/// # Errors
///
/// Returns [`AuthError::Storage`](crate::AuthError::Storage) if the file
/// exists but cannot be read.
pub fn open_configured(config: &ClientConfig) -> Result<Arc<dyn KeyValueStorage>> {
    match &config.storage_path {
        Some(path) => Ok(Arc::new(FileStorage::open(path)?)),
        None => {
            tracing::debug!("No storage path configured, keeping the session in memory");
            Ok(Arc::new(MemoryStorage::new()))
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn configured_path_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let config = ClientConfig::default().with_storage_path(&path);

        open_configured(&config).unwrap().set("auth_token", "a.b.c").unwrap();

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("auth_token").unwrap().as_deref(), Some("a.b.c"));
    }

    #[test]
    fn no_path_keeps_it_in_memory() {
        let storage = open_configured(&ClientConfig::default()).unwrap();
        storage.set("k", "v").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v"));
    }
}
