//! Persistence seam for wrapped key material.
//!
//! The engine never stores a plaintext key.  What it does persist is the
//! *wrapped* material a locked session needs to unlock again without a
//! server round-trip.  Where those strings end up (OS keychain, a
//! database, a file) is the embedding application's choice.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::{Result, VaultCryptError};

/// The slots the engine reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Email,
    KdfConfig,
    LocalVerifier,
    WrappedDataKey,
    PublicKey,
    WrappedPrivateKey,
    WrappedOrganizationKeys,
}

impl StorageKey {
    /// Stable slot name for backends keyed by string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::KdfConfig => "kdfConfig",
            Self::LocalVerifier => "localVerifier",
            Self::WrappedDataKey => "wrappedDataKey",
            Self::PublicKey => "publicKey",
            Self::WrappedPrivateKey => "wrappedPrivateKey",
            Self::WrappedOrganizationKeys => "wrappedOrganizationKeys",
        }
    }
}

/// String-valued storage for wrapped key material.
pub trait SecureStorage: Send + Sync {
    fn get(&self, key: StorageKey) -> Result<Option<String>>;
    fn set(&self, key: StorageKey, value: String) -> Result<()>;
    fn remove(&self, key: StorageKey) -> Result<()>;
}

/// In-process storage, used by tests and by embedders that keep nothing on disk.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: Mutex<HashMap<StorageKey, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SecureStorage for MemoryStorage {
    fn get(&self, key: StorageKey) -> Result<Option<String>> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| VaultCryptError::Storage("storage lock poisoned".into()))?;
        Ok(slots.get(&key).cloned())
    }

    fn set(&self, key: StorageKey, value: String) -> Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| VaultCryptError::Storage("storage lock poisoned".into()))?;
        slots.insert(key, value);
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| VaultCryptError::Storage("storage lock poisoned".into()))?;
        slots.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let storage = MemoryStorage::new();
        assert!(storage.get(StorageKey::Email).unwrap().is_none());

        storage.set(StorageKey::Email, "a@b.c".into()).unwrap();
        assert_eq!(storage.get(StorageKey::Email).unwrap().as_deref(), Some("a@b.c"));
        assert_eq!(storage.len(), 1);

        storage.remove(StorageKey::Email).unwrap();
        assert!(storage.is_empty());
    }
}
