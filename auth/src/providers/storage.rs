//! Durable key-value storage trait.

use crate::error::Result;
use std::sync::Arc;

/// One change in a [`KeyValueStorage::apply`] batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageWrite<'a> {
    /// Store a value under a key.
    Set(&'a str, &'a str),
    /// Remove a key.
    Remove(&'a str),
}

/// Durable client storage.
///
/// Synchronous on purpose: the session store reads and writes it inside a
/// single critical section, never across an `.await`.
pub trait KeyValueStorage: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`](crate::AuthError::Storage) if the
    /// backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`](crate::AuthError::Storage) if the
    /// write did not reach the backend.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`](crate::AuthError::Storage) if the
    /// backend cannot be written.
    fn remove(&self, key: &str) -> Result<()>;

    /// Apply several changes in order.
    ///
    /// The default runs them one by one and stops at the first failure.
    /// Backends that can commit a batch as one unit override this so a
    /// failure leaves none of the changes behind.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`](crate::AuthError::Storage) if a
    /// change did not reach the backend.
    fn apply(&self, writes: &[StorageWrite<'_>]) -> Result<()> {
        for write in writes {
            match *write {
                StorageWrite::Set(key, value) => self.set(key, value)?,
                StorageWrite::Remove(key) => self.remove(key)?,
            }
        }
        Ok(())
    }
}

impl<T: KeyValueStorage + ?Sized> KeyValueStorage for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn apply(&self, writes: &[StorageWrite<'_>]) -> Result<()> {
        (**self).apply(writes)
    }
}
