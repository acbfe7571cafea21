//! Password-based key derivation.
//!
//! Two account-scoped algorithms are supported, both persisted server-side
//! alongside the account so every device re-derives the same master key:
//!
//! - **PBKDF2-HMAC-SHA256**, salted with the normalized account email.
//! - **Argon2id**, salted with SHA-256 of the normalized account email.
//!
//! On top of the master key two one-way verifiers are derived with a
//! single (server) or double (local) PBKDF2 round using the password as
//! salt.  Neither verifier can be turned back into the master key.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use super::keys::SymmetricKey;
use crate::errors::{Result, VaultCryptError};

/// Length of the derived master key in bytes (256 bits).
const KEY_LEN: usize = 32;

/// Minimum PBKDF2 iteration count accepted from an account profile.
pub const MIN_PBKDF2_ITERATIONS: u32 = 5_000;

/// Minimum Argon2id iterations.
pub const MIN_ARGON2_ITERATIONS: u32 = 2;

/// Minimum Argon2id memory in MiB.
pub const MIN_ARGON2_MEMORY_MIB: u32 = 16;

/// Maximum Argon2id lanes.
pub const MAX_ARGON2_PARALLELISM: u32 = 16;

/// KDF algorithm identifier, numbered as the account profile stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KdfAlgorithm {
    Pbkdf2Sha256,
    Argon2id,
}

/// Account-scoped KDF configuration.
///
/// `memory_mib` and `parallelism` are only meaningful for Argon2id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfConfig {
    pub algorithm: KdfAlgorithm,
    pub iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mib: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<u32>,
}

impl KdfConfig {
    pub fn pbkdf2(iterations: u32) -> Self {
        Self {
            algorithm: KdfAlgorithm::Pbkdf2Sha256,
            iterations,
            memory_mib: None,
            parallelism: None,
        }
    }

    pub fn argon2id(iterations: u32, memory_mib: u32, parallelism: u32) -> Self {
        Self {
            algorithm: KdfAlgorithm::Argon2id,
            iterations,
            memory_mib: Some(memory_mib),
            parallelism: Some(parallelism),
        }
    }

    /// Reject configurations weak enough to be dangerous.
    pub fn validate(&self) -> Result<()> {
        match self.algorithm {
            KdfAlgorithm::Pbkdf2Sha256 => {
                if self.iterations < MIN_PBKDF2_ITERATIONS {
                    return Err(VaultCryptError::KeyDerivationFailed(format!(
                        "PBKDF2 iterations must be at least {MIN_PBKDF2_ITERATIONS} (got {})",
                        self.iterations
                    )));
                }
            }
            KdfAlgorithm::Argon2id => {
                if self.iterations < MIN_ARGON2_ITERATIONS {
                    return Err(VaultCryptError::KeyDerivationFailed(format!(
                        "Argon2 iterations must be at least {MIN_ARGON2_ITERATIONS} (got {})",
                        self.iterations
                    )));
                }
                let memory = self.memory_mib.unwrap_or(0);
                if memory < MIN_ARGON2_MEMORY_MIB {
                    return Err(VaultCryptError::KeyDerivationFailed(format!(
                        "Argon2 memory must be at least {MIN_ARGON2_MEMORY_MIB} MiB (got {memory})"
                    )));
                }
                let lanes = self.parallelism.unwrap_or(0);
                if !(1..=MAX_ARGON2_PARALLELISM).contains(&lanes) {
                    return Err(VaultCryptError::KeyDerivationFailed(format!(
                        "Argon2 parallelism must be between 1 and {MAX_ARGON2_PARALLELISM} (got {lanes})"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self::pbkdf2(600_000)
    }
}

/// Which verifier to derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierPurpose {
    /// Sent to the server at login.
    Server,
    /// Kept on the device so a locked session can unlock offline.
    Local,
}

impl VerifierPurpose {
    fn rounds(self) -> u32 {
        match self {
            Self::Server => 1,
            Self::Local => 2,
        }
    }
}

/// Trim and lowercase an account email before using it as salt.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Derive the 32-byte master key from a password.
///
/// The same password, email and config always produce the same key.
pub fn derive_master_key(password: &[u8], email: &str, kdf: &KdfConfig) -> Result<SymmetricKey> {
    kdf.validate()?;
    let salt = normalize_email(email);

    let mut out = [0u8; KEY_LEN];
    match kdf.algorithm {
        KdfAlgorithm::Pbkdf2Sha256 => {
            pbkdf2::pbkdf2_hmac::<Sha256>(password, salt.as_bytes(), kdf.iterations, &mut out);
        }
        KdfAlgorithm::Argon2id => {
            let salt_hash = Sha256::digest(salt.as_bytes());
            let memory_kib = kdf.memory_mib.unwrap_or(MIN_ARGON2_MEMORY_MIB) * 1024;
            let params = Params::new(
                memory_kib,
                kdf.iterations,
                kdf.parallelism.unwrap_or(1),
                Some(KEY_LEN),
            )
            .map_err(|e| {
                VaultCryptError::KeyDerivationFailed(format!("invalid Argon2 params: {e}"))
            })?;

            Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                .hash_password_into(password, &salt_hash, &mut out)
                .map_err(|e| {
                    VaultCryptError::KeyDerivationFailed(format!("Argon2id hashing failed: {e}"))
                })?;
        }
    }

    let key = SymmetricKey::from_bytes(&out);
    out.zeroize();
    key
}

/// Derive a one-way verifier that proves knowledge of the password.
///
/// `PBKDF2-SHA256(password = master_key, salt = password, rounds)`, base64.
pub fn derive_verifier(password: &[u8], master_key: &SymmetricKey, purpose: VerifierPurpose) -> String {
    let mut out = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(master_key.as_bytes(), password, purpose.rounds(), &mut out);
    let encoded = BASE64.encode(out);
    out.zeroize();
    encoded
}

/// The verifier sent to the server at login.
pub fn derive_server_verifier(password: &[u8], master_key: &SymmetricKey) -> String {
    derive_verifier(password, master_key, VerifierPurpose::Server)
}

/// Compare two verifiers in constant time.
pub fn verifiers_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

// ── Tests ────────────────────────────────────────────────────────────
