//! AES-256-CBC with HMAC-SHA256 encrypt-then-MAC.
//!
//! Each call to `encrypt_field` generates a fresh random 16-byte IV.  When
//! the key carries an authentication sub-key the MAC is computed over
//! `iv || ciphertext` and checked in constant time before any decryption.
//!
//! Binary payloads (attachment files) use a compact buffer layout instead
//! of the text encoding:
//!   [ 1-byte tag | 16-byte iv | 32-byte mac | ciphertext ]

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use super::encrypted_field::{AlgorithmTag, EncryptedField};
use super::keys::SymmetricKey;
use crate::errors::{Result, VaultCryptError};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Size of the AES-CBC IV in bytes.
pub const IV_LEN: usize = 16;

/// Size of the HMAC-SHA256 tag in bytes.
pub const MAC_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Raw primitives
// ---------------------------------------------------------------------------

/// AES-256-CBC encrypt with PKCS#7 padding under an explicit IV.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv)
        .map_err(|e| VaultCryptError::EncryptionFailed(format!("invalid key or iv length: {e}")))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// AES-256-CBC decrypt and strip PKCS#7 padding.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|_| VaultCryptError::MalformedField(format!("iv must be {IV_LEN} bytes")))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| VaultCryptError::IntegrityFailure)
}

fn compute_mac(mac_key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(mac_key)
        .map_err(|e| VaultCryptError::InvalidKey(format!("invalid HMAC key: {e}")))?;
    mac.update(iv);
    mac.update(ciphertext);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time MAC check via `hmac::Mac::verify_slice`.
fn verify_mac(mac_key: &[u8], iv: &[u8], ciphertext: &[u8], expected: &[u8]) -> Result<()> {
    let mut mac = Hmac::<Sha256>::new_from_slice(mac_key)
        .map_err(|e| VaultCryptError::InvalidKey(format!("invalid HMAC key: {e}")))?;
    mac.update(iv);
    mac.update(ciphertext);
    mac.verify_slice(expected)
        .map_err(|_| VaultCryptError::IntegrityFailure)
}

fn random_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);
    iv
}

// ---------------------------------------------------------------------------
// Field encryption
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` under `key`, producing a wire-ready field.
///
/// The algorithm follows the key: a 64-byte key yields tag 2, a 32-byte
/// key yields tag 0.
pub fn encrypt_field(key: &SymmetricKey, plaintext: &[u8]) -> Result<EncryptedField> {
    let iv = random_iv();
    let ciphertext = aes_cbc_encrypt(key.encryption_key(), &iv, plaintext)?;

    let mac = match key.authentication_key() {
        Some(mac_key) => Some(compute_mac(mac_key, &iv, &ciphertext)?),
        None => None,
    };

    Ok(EncryptedField::new(
        key.algorithm(),
        Some(iv.to_vec()),
        ciphertext,
        mac,
    ))
}

/// Decrypt a symmetric field.
///
/// Fails with `IntegrityFailure` when the key does not match the field's
/// algorithm or the MAC does not verify.
pub fn decrypt_field(field: &EncryptedField, key: &SymmetricKey) -> Result<Vec<u8>> {
    let parts = field.parts()?;

    if parts.algorithm.is_asymmetric() {
        return Err(VaultCryptError::KeyUnavailable(
            "asymmetric field needs a private key".into(),
        ));
    }
    if parts.algorithm != key.algorithm() {
        return Err(VaultCryptError::IntegrityFailure);
    }

    // Both symmetric shapes carry an iv; the codec guarantees it.
    let iv = parts
        .iv
        .as_deref()
        .ok_or_else(|| VaultCryptError::MalformedField("missing iv".into()))?;

    if let (Some(mac_key), Some(mac)) = (key.authentication_key(), parts.mac.as_deref()) {
        verify_mac(mac_key, iv, &parts.data, mac)?;
    }

    aes_cbc_decrypt(key.encryption_key(), iv, &parts.data)
}

/// Decrypt a symmetric field and interpret the plaintext as UTF-8.
pub fn decrypt_field_to_string(field: &EncryptedField, key: &SymmetricKey) -> Result<String> {
    let bytes = decrypt_field(field, key)?;
    String::from_utf8(bytes).map_err(|e| {
        let mut bad = e.into_bytes();
        zeroize::Zeroize::zeroize(&mut bad);
        VaultCryptError::Serialization("decrypted value is not valid UTF-8".into())
    })
}

impl EncryptedField {
    /// Decrypt this field with a symmetric key.
    pub fn decrypt(&self, key: &SymmetricKey) -> Result<Vec<u8>> {
        decrypt_field(self, key)
    }

    /// Decrypt this field to a UTF-8 string.
    pub fn decrypt_to_string(&self, key: &SymmetricKey) -> Result<String> {
        decrypt_field_to_string(self, key)
    }
}

// ---------------------------------------------------------------------------
// Binary buffers
// ---------------------------------------------------------------------------

/// Encrypt a binary payload into `[tag | iv | mac | ciphertext]`.
///
/// Only authenticated keys are accepted; file payloads are never stored
/// without a MAC.
pub fn encrypt_buffer(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mac_key = key.authentication_key().ok_or_else(|| {
        VaultCryptError::InvalidKey("buffer encryption requires an authenticated key".into())
    })?;

    let iv = random_iv();
    let ciphertext = aes_cbc_encrypt(key.encryption_key(), &iv, plaintext)?;
    let mac = compute_mac(mac_key, &iv, &ciphertext)?;

    let mut out = Vec::with_capacity(1 + IV_LEN + MAC_LEN + ciphertext.len());
    out.push(AlgorithmTag::AesCbc256HmacSha256B64.as_u8());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&mac);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a buffer produced by `encrypt_buffer`.
pub fn decrypt_buffer(key: &SymmetricKey, buffer: &[u8]) -> Result<Vec<u8>> {
    let header_len = 1 + IV_LEN + MAC_LEN;
    if buffer.len() <= header_len {
        return Err(VaultCryptError::MalformedField(
            "encrypted buffer is too short".into(),
        ));
    }

    let tag = AlgorithmTag::try_from(buffer[0])?;
    if tag != AlgorithmTag::AesCbc256HmacSha256B64 {
        return Err(VaultCryptError::UnsupportedAlgorithm(tag.as_u8()));
    }

    let mac_key = key
        .authentication_key()
        .ok_or(VaultCryptError::IntegrityFailure)?;

    let iv = &buffer[1..1 + IV_LEN];
    let mac = &buffer[1 + IV_LEN..header_len];
    let ciphertext = &buffer[header_len..];

    verify_mac(mac_key, iv, ciphertext, mac)?;
    aes_cbc_decrypt(key.encryption_key(), iv, ciphertext)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    fn static_bytes(n: u8) -> Vec<u8> {
        (0..n).collect()
    }

    #[test]
    fn cbc_matches_known_vector() {
        let key = static_bytes(32);
        let iv = static_bytes(16);

        let ct = aes_cbc_encrypt(&key, &iv, b"EncryptMe!").unwrap();
        assert_eq!(BASE64.encode(&ct), "ByUF8vhyX4ddU9gcooznwA==");

        let pt = aes_cbc_decrypt(&key, &iv, &ct).unwrap();
        assert_eq!(pt, b"EncryptMe!");
    }

    #[test]
    fn field_round_trip_with_mac() {
        let key = SymmetricKey::generate();
        let field = encrypt_field(&key, b"hunter2").unwrap();
        assert_eq!(field.algorithm(), Some(AlgorithmTag::AesCbc256HmacSha256B64));
        assert_eq!(field.decrypt_to_string(&key).unwrap(), "hunter2");
    }

    #[test]
    fn field_round_trip_without_mac() {
        let key = SymmetricKey::from_bytes(&[3u8; 32]).unwrap();
        let field = encrypt_field(&key, b"no mac here").unwrap();
        assert_eq!(field.algorithm(), Some(AlgorithmTag::AesCbc256B64));
        assert!(field.mac().is_none());
        assert_eq!(field.decrypt(&key).unwrap(), b"no mac here");
    }

    #[test]
    fn wrong_key_fails_integrity() {
        let field = encrypt_field(&SymmetricKey::generate(), b"secret").unwrap();
        let result = field.decrypt(&SymmetricKey::generate());
        assert!(matches!(result, Err(VaultCryptError::IntegrityFailure)));
    }

    #[test]
    fn key_algorithm_mismatch_fails_integrity() {
        let field = encrypt_field(&SymmetricKey::generate(), b"secret").unwrap();
        let short = SymmetricKey::from_bytes(&[1u8; 32]).unwrap();
        assert!(matches!(
            field.decrypt(&short),
            Err(VaultCryptError::IntegrityFailure)
        ));
    }

    #[test]
    fn tampered_mac_is_detected() {
        let key = SymmetricKey::generate();
        let field = encrypt_field(&key, b"payload").unwrap();
        let mut mac = field.mac().unwrap().to_vec();
        mac[0] ^= 0xFF;
        let tampered = EncryptedField::new(
            field.algorithm().unwrap(),
            field.iv().map(<[u8]>::to_vec),
            field.data().unwrap().to_vec(),
            Some(mac),
        );
        assert!(matches!(
            tampered.decrypt(&key),
            Err(VaultCryptError::IntegrityFailure)
        ));
    }

    #[test]
    fn malformed_field_refuses_to_decrypt() {
        let field = EncryptedField::from_wire("2.onlyone");
        assert!(matches!(
            field.decrypt(&SymmetricKey::generate()),
            Err(VaultCryptError::MalformedField(_))
        ));
    }

    #[test]
    fn buffer_round_trip() {
        let key = SymmetricKey::generate();
        let data = vec![0xA5u8; 1000];
        let buf = encrypt_buffer(&key, &data).unwrap();
        assert_eq!(buf[0], 2);
        assert_eq!(decrypt_buffer(&key, &buf).unwrap(), data);
    }

    #[test]
    fn truncated_buffer_fails() {
        let key = SymmetricKey::generate();
        assert!(decrypt_buffer(&key, &[2u8; 20]).is_err());
    }
}
