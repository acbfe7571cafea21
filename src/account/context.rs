//! In-memory key state for one logged-in account.
//!
//! `AccountKeyContext` is the mutable per-session state owned by
//! `KeyHierarchyService`.  `KeyRing` is the immutable snapshot handed to
//! entity decryption and to the bulk-decrypt worker: it holds only the
//! unwrapped data key and organization keys, never the master key.

use std::collections::HashMap;

use crate::crypto::{AsymmetricKeyPair, EncryptedField, KdfConfig, PrivateKey, SymmetricKey};
use crate::errors::{Result, VaultCryptError};

/// Per-session key slots.
///
/// Plaintext slots (`master_key`, `data_key`, `private_key`,
/// `organization_keys`) are dropped on lock.  Wrapped slots survive a lock
/// and are only cleared on logout.
#[derive(Default)]
pub struct AccountKeyContext {
    pub email: Option<String>,
    pub kdf: Option<KdfConfig>,
    pub master_key: Option<SymmetricKey>,
    pub local_verifier: Option<String>,
    pub wrapped_data_key: Option<EncryptedField>,
    pub data_key: Option<SymmetricKey>,
    pub key_pair: Option<AsymmetricKeyPair>,
    pub private_key: Option<PrivateKey>,
    pub wrapped_organization_keys: HashMap<String, EncryptedField>,
    pub organization_keys: HashMap<String, SymmetricKey>,
}

impl AccountKeyContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session is unlocked once its data key is in memory.
    pub fn is_unlocked(&self) -> bool {
        self.data_key.is_some()
    }

    /// Snapshot the keys needed to decrypt vault items.
    pub fn key_ring(&self) -> KeyRing {
        KeyRing {
            data_key: self.data_key.clone(),
            organization_keys: self.organization_keys.clone(),
        }
    }
}

/// Read-only key-resolution surface.
#[derive(Clone, Default)]
pub struct KeyRing {
    data_key: Option<SymmetricKey>,
    organization_keys: HashMap<String, SymmetricKey>,
}

impl KeyRing {
    /// An empty ring.  Every lookup fails with `KeyUnavailable`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_key(mut self, key: SymmetricKey) -> Self {
        self.data_key = Some(key);
        self
    }

    pub fn with_organization_key(mut self, org_id: impl Into<String>, key: SymmetricKey) -> Self {
        self.organization_keys.insert(org_id.into(), key);
        self
    }

    pub fn data_key(&self) -> Option<&SymmetricKey> {
        self.data_key.as_ref()
    }

    pub fn organization_key(&self, org_id: &str) -> Option<&SymmetricKey> {
        self.organization_keys.get(org_id)
    }

    /// Every cached organization key, in no particular order.
    pub fn organization_keys(&self) -> impl Iterator<Item = (&str, &SymmetricKey)> {
        self.organization_keys.iter().map(|(id, key)| (id.as_str(), key))
    }

    pub fn organization_count(&self) -> usize {
        self.organization_keys.len()
    }

    /// Resolve the key for an item owned by `org_id` (or personally, if `None`).
    ///
    /// An organization item never falls back to the personal data key.
    pub fn resolve(&self, org_id: Option<&str>) -> Result<&SymmetricKey> {
        match org_id {
            Some(id) => self
                .organization_keys
                .get(id)
                .ok_or_else(|| VaultCryptError::KeyUnavailable(format!("organization {id}"))),
            None => self
                .data_key
                .as_ref()
                .ok_or_else(|| VaultCryptError::KeyUnavailable("account data key (locked)".into())),
        }
    }
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing")
            .field("has_data_key", &self.data_key.is_some())
            .field("organizations", &self.organization_keys.len())
            .finish()
    }
}
