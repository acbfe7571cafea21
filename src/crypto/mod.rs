//! Cryptographic primitives for vaultcrypt.
//!
//! This module provides:
//! - The wire codec for a single encrypted field (`encrypted_field`)
//! - AES-256-CBC + HMAC-SHA256 field and buffer encryption (`encryption`)
//! - Symmetric key containers and master-key stretching (`keys`)
//! - PBKDF2 / Argon2id master key and verifier derivation (`kdf`)
//! - X25519 keypairs and organization key wrapping (`asymmetric`)

pub mod asymmetric;
pub mod encrypted_field;
pub mod encryption;
pub mod kdf;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{EncryptedField, SymmetricKey, encrypt_field, ...};
pub use asymmetric::{
    generate_key_pair, unwrap_organization_key, wrap_organization_key, AsymmetricKeyPair,
    PrivateKey,
};
pub use encrypted_field::{AlgorithmTag, EncryptedField, FieldDefect, FieldParts};
pub use encryption::{decrypt_buffer, decrypt_field, encrypt_buffer, encrypt_field};
pub use kdf::{derive_master_key, derive_server_verifier, KdfAlgorithm, KdfConfig};
pub use keys::{stretch_master_key, SymmetricKey, COMBINED_KEY_LEN};

use crate::errors::Result;

/// Wrap `key` under `wrapping_key` as an encrypted field.
pub fn wrap_key(key: &SymmetricKey, wrapping_key: &SymmetricKey) -> Result<EncryptedField> {
    encrypt_field(wrapping_key, key.as_bytes())
}

/// Unwrap a key previously wrapped with [`wrap_key`].
pub fn unwrap_key(field: &EncryptedField, wrapping_key: &SymmetricKey) -> Result<SymmetricKey> {
    let mut raw = decrypt_field(field, wrapping_key)?;
    let key = SymmetricKey::from_bytes(&raw);
    zeroize::Zeroize::zeroize(&mut raw);
    key
}

/// Generate a fresh data key (64 random bytes, enc + mac).
pub fn generate_data_key() -> SymmetricKey {
    SymmetricKey::generate()
}
