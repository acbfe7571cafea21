//! Symmetric key containers.
//!
//! A `SymmetricKey` is split deterministically from its raw bytes:
//! - 64 bytes: first half encrypts, second half authenticates (tag 2).
//! - 32 bytes: the whole key encrypts, no authentication key (tag 0).
//!
//! The password-derived master key is 32 bytes and is never used to
//! encrypt directly.  It is first *stretched* with HKDF-SHA256 expand
//! into a 64-byte key so that everything it wraps carries a MAC.

use std::fmt;

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::encrypted_field::AlgorithmTag;
use crate::errors::{Result, VaultCryptError};

/// Length of an encryption or authentication sub-key (256 bits).
pub const SUBKEY_LEN: usize = 32;

/// Length of a combined encryption + authentication key.
pub const COMBINED_KEY_LEN: usize = 64;

/// A symmetric key and the two sub-keys split from it.
///
/// Raw bytes are wiped from memory when the key is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    raw: Vec<u8>,
    #[zeroize(skip)]
    algorithm: AlgorithmTag,
}

impl SymmetricKey {
    /// Build a key from raw bytes (32 or 64 bytes).
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let algorithm = match raw.len() {
            COMBINED_KEY_LEN => AlgorithmTag::AesCbc256HmacSha256B64,
            SUBKEY_LEN => AlgorithmTag::AesCbc256B64,
            other => {
                return Err(VaultCryptError::InvalidKey(format!(
                    "symmetric key must be {SUBKEY_LEN} or {COMBINED_KEY_LEN} bytes, got {other}"
                )))
            }
        };
        Ok(Self {
            raw: raw.to_vec(),
            algorithm,
        })
    }

    /// Generate a fresh random 64-byte key.
    pub fn generate() -> Self {
        let mut raw = vec![0u8; COMBINED_KEY_LEN];
        rand::rng().fill_bytes(&mut raw);
        Self {
            raw,
            algorithm: AlgorithmTag::AesCbc256HmacSha256B64,
        }
    }

    /// The symmetric algorithm this key encrypts with.
    pub fn algorithm(&self) -> AlgorithmTag {
        self.algorithm
    }

    /// The full raw key (used only when wrapping this key under another).
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// The AES key.
    pub fn encryption_key(&self) -> &[u8] {
        &self.raw[..SUBKEY_LEN]
    }

    /// The HMAC key, if this key authenticates.
    pub fn authentication_key(&self) -> Option<&[u8]> {
        if self.raw.len() == COMBINED_KEY_LEN {
            Some(&self.raw[SUBKEY_LEN..])
        } else {
            None
        }
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.raw.ct_eq(&other.raw).into()
    }
}

impl Eq for SymmetricKey {}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Stretch a 32-byte master key into a 64-byte enc + mac key.
///
/// `enc = HKDF-Expand(master, "enc", 32)`, `mac = HKDF-Expand(master, "mac", 32)`.
/// The master key is used directly as the PRK; it already came out of a KDF.
pub fn stretch_master_key(master_key: &SymmetricKey) -> Result<SymmetricKey> {
    let mut combined = [0u8; COMBINED_KEY_LEN];
    let (enc, mac) = combined.split_at_mut(SUBKEY_LEN);
    hkdf_expand(master_key.as_bytes(), b"enc", enc)?;
    hkdf_expand(master_key.as_bytes(), b"mac", mac)?;

    let key = SymmetricKey::from_bytes(&combined);
    combined.zeroize();
    key
}

fn hkdf_expand(prk: &[u8], info: &[u8], out: &mut [u8]) -> Result<()> {
    let hk = Hkdf::<Sha256>::from_prk(prk)
        .map_err(|e| VaultCryptError::KeyDerivationFailed(format!("HKDF PRK rejected: {e}")))?;
    hk.expand(info, out)
        .map_err(|e| VaultCryptError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))
}

// ── Tests ────────────────────────────────────────────────────────────
