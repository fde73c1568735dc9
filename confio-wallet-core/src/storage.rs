//! The platform secure-storage boundary.
//!
//! Platform implementations should use hardware-backed storage where
//! available (iOS Keychain with `kSecAttrAccessibleWhenUnlockedThisDeviceOnly`,
//! Android Keystore-wrapped files, a cloud block store for backup-eligible
//! variants). The core consumes only this store/retrieve/delete contract.
//!
//! All three operations may fail with [`WalletError::StorageUnavailable`];
//! the session treats that as non-fatal for reads (falls back to
//! re-derivation) and degrades to no-cache operation when writes fail.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::WalletError;

/// On-device secure storage for wrapped seed blobs.
#[async_trait]
pub trait SecureStorage: Send + Sync {
    /// Persists `bytes` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::StorageUnavailable`] if the platform denies
    /// access.
    async fn store(&self, key: &str, bytes: &[u8]) -> Result<(), WalletError>;

    /// Retrieves the value for `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::StorageUnavailable`] if the platform denies
    /// access.
    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, WalletError>;

    /// Deletes the value for `key`. Deleting an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::StorageUnavailable`] if the platform denies
    /// access.
    async fn delete(&self, key: &str) -> Result<(), WalletError>;
}

/// In-memory secure storage backed by a `HashMap`.
///
/// Used in tests and as the degraded backend when no platform store is
/// available; contents do not survive the process.
#[derive(Default)]
pub struct MemorySecureStorage {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySecureStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    ///
    /// # Panics
    ///
    /// Panics if the storage lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().expect("storage lock poisoned").len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SecureStorage for MemorySecureStorage {
    async fn store(&self, key: &str, bytes: &[u8]) -> Result<(), WalletError> {
        self.entries
            .write()
            .expect("storage lock poisoned")
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, WalletError> {
        Ok(self
            .entries
            .read()
            .expect("storage lock poisoned")
            .get(key)
            .cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), WalletError> {
        self.entries
            .write()
            .expect("storage lock poisoned")
            .remove(key);
        Ok(())
    }
}
