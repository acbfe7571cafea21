//! Account keypair and asymmetric key wrapping.
//!
//! Uses X25519 key exchange + XSalsa20-Poly1305.  Every seal generates a
//! throwaway ephemeral keypair, so the wire blob is self-contained:
//!
//! ```text
//! [ ephemeral public key: 32 | nonce: 24 | ciphertext + poly1305 tag ]
//! ```
//!
//! Organization keys arrive sealed this way, one copy per member, under
//! that member's public key.

use crypto_box::aead::Aead;
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use rand::RngCore;
use zeroize::Zeroize;

use super::encrypted_field::{AlgorithmTag, EncryptedField};
use super::encryption::{decrypt_field, encrypt_field};
use super::keys::SymmetricKey;
use crate::errors::{Result, VaultCryptError};

/// Size of an X25519 public or secret key.
pub const X25519_KEY_LEN: usize = 32;

/// Size of the XSalsa20 nonce.
const NONCE_LEN: usize = 24;

/// A public key and its private half, wrapped at rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsymmetricKeyPair {
    pub public_key: Vec<u8>,
    pub wrapped_private_key: EncryptedField,
}

impl AsymmetricKeyPair {
    /// Unwrap the private key with the key it was wrapped under.
    pub fn unwrap_private_key(&self, wrapping_key: &SymmetricKey) -> Result<PrivateKey> {
        let mut bytes = decrypt_field(&self.wrapped_private_key, wrapping_key)?;
        let key = PrivateKey::from_bytes(&bytes);
        bytes.zeroize();
        key
    }
}

/// An unwrapped X25519 private key.  Zeroized on drop by `crypto_box`.
#[derive(Clone)]
pub struct PrivateKey {
    secret: SecretKey,
}

impl PrivateKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut raw: [u8; X25519_KEY_LEN] = bytes.try_into().map_err(|_| {
            VaultCryptError::InvalidKey(format!(
                "private key must be {X25519_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        let secret = SecretKey::from(raw);
        raw.zeroize();
        Ok(Self { secret })
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.secret.public_key().as_bytes().to_vec()
    }

    fn to_bytes(&self) -> [u8; X25519_KEY_LEN] {
        self.secret.to_bytes()
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey").finish_non_exhaustive()
    }
}

/// Generate a new keypair and wrap its private half under `wrapping_key`.
///
/// Returns the storable pair and the unwrapped private key for immediate use.
pub fn generate_key_pair(wrapping_key: &SymmetricKey) -> Result<(AsymmetricKeyPair, PrivateKey)> {
    let mut raw = [0u8; X25519_KEY_LEN];
    rand::rng().fill_bytes(&mut raw);
    let private = PrivateKey::from_bytes(&raw)?;
    raw.zeroize();

    let mut secret_bytes = private.to_bytes();
    let wrapped = encrypt_field(wrapping_key, &secret_bytes);
    secret_bytes.zeroize();

    let pair = AsymmetricKeyPair {
        public_key: private.public_key_bytes(),
        wrapped_private_key: wrapped?,
    };
    Ok((pair, private))
}

fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey> {
    let raw: [u8; X25519_KEY_LEN] = bytes.try_into().map_err(|_| {
        VaultCryptError::InvalidKey(format!(
            "public key must be {X25519_KEY_LEN} bytes, got {}",
            bytes.len()
        ))
    })?;
    Ok(PublicKey::from(raw))
}

/// Seal `plaintext` to a recipient public key.
pub fn seal(plaintext: &[u8], recipient_public_key: &[u8]) -> Result<EncryptedField> {
    let recipient = public_key_from_bytes(recipient_public_key)?;

    let mut eph_raw = [0u8; X25519_KEY_LEN];
    rand::rng().fill_bytes(&mut eph_raw);
    let ephemeral = SecretKey::from(eph_raw);
    eph_raw.zeroize();

    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);

    let ciphertext = SalsaBox::new(&recipient, &ephemeral)
        .encrypt(crypto_box::Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| VaultCryptError::EncryptionFailed(format!("seal failed: {e}")))?;

    let mut blob = Vec::with_capacity(X25519_KEY_LEN + NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(ephemeral.public_key().as_bytes());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);

    Ok(EncryptedField::new(
        AlgorithmTag::X25519SealedBoxB64,
        None,
        blob,
        None,
    ))
}

/// The blob of a sealed field, once its tag and length check out.
fn sealed_blob(field: &EncryptedField) -> Result<&[u8]> {
    let parts = field.parts()?;
    if parts.algorithm != AlgorithmTag::X25519SealedBoxB64 {
        return Err(VaultCryptError::KeyUnavailable(format!(
            "field uses symmetric algorithm {}",
            parts.algorithm
        )));
    }
    if parts.data.len() <= X25519_KEY_LEN + NONCE_LEN {
        return Err(VaultCryptError::MalformedField(
            "sealed blob is too short".into(),
        ));
    }
    Ok(&parts.data)
}

/// Check that `field` is a sealed box that could be opened, without a key.
pub fn check_sealed(field: &EncryptedField) -> Result<()> {
    sealed_blob(field).map(|_| ())
}

/// Open a sealed field with the recipient's private key.
pub fn open(field: &EncryptedField, private_key: &PrivateKey) -> Result<Vec<u8>> {
    let blob = sealed_blob(field)?;
    let header = X25519_KEY_LEN + NONCE_LEN;

    let ephemeral = public_key_from_bytes(&blob[..X25519_KEY_LEN])?;
    let nonce = &blob[X25519_KEY_LEN..header];

    SalsaBox::new(&ephemeral, &private_key.secret)
        .decrypt(crypto_box::Nonce::from_slice(nonce), &blob[header..])
        .map_err(|_| VaultCryptError::IntegrityFailure)
}

/// Unwrap an organization key delivered sealed to this member.
pub fn unwrap_organization_key(
    wrapped_org_key: &EncryptedField,
    private_key: &PrivateKey,
) -> Result<SymmetricKey> {
    let mut raw = open(wrapped_org_key, private_key)?;
    let key = SymmetricKey::from_bytes(&raw);
    raw.zeroize();
    key
}

/// Seal an organization key to a member (used by admins and in tests).
pub fn wrap_organization_key(org_key: &SymmetricKey, member_public_key: &[u8]) -> Result<EncryptedField> {
    seal(org_key.as_bytes(), member_public_key)
}

// ── Tests ────────────────────────────────────────────────────────────
