//! Ephemeral share keys for Sends.
//!
//! Every Send gets 16 random bytes of key material that have nothing to do
//! with the account's keys.  The content key is stretched from that
//! material with HKDF-SHA256, and the material itself travels in the
//! fragment of the share link:
//!
//! ```text
//! https://send.example.com/#/send/<access_id>/<base64url(material)>
//! ```
//!
//! The fragment never reaches the server, so the link is both necessary
//! and sufficient to read the content.  An optional password is hashed
//! with the material as salt; the server uses the hash only to decide
//! whether to hand out the ciphertext.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::{SymmetricKey, COMBINED_KEY_LEN};
use crate::errors::{Result, VaultCryptError};
use crate::models::{Send, SendView};

/// Length of the random material embedded in a share link.
pub const SHARE_KEY_MATERIAL_LEN: usize = 16;

/// PBKDF2 rounds for the optional Send password.
pub const SEND_PASSWORD_ITERATIONS: u32 = 100_000;

const SEND_KEY_SALT: &[u8] = b"vaultcrypt-send";
const SEND_KEY_INFO: &[u8] = b"send";
const LINK_MARKER: &str = "#/send/";

/// The per-Send key: link material plus the content key stretched from it.
#[derive(Clone)]
pub struct ShareKey {
    material: Zeroizing<Vec<u8>>,
    key: SymmetricKey,
}

impl ShareKey {
    /// Generate fresh material.
    pub fn generate() -> Result<Self> {
        let mut material = Zeroizing::new(vec![0u8; SHARE_KEY_MATERIAL_LEN]);
        rand::rng().fill_bytes(&mut material);
        let key = stretch_material(&material)?;
        Ok(Self { material, key })
    }

    /// Rebuild from material received in a link or unwrapped from a Send.
    pub fn from_material(material: &[u8]) -> Result<Self> {
        let key = stretch_material(material)?;
        Ok(Self {
            material: Zeroizing::new(material.to_vec()),
            key,
        })
    }

    /// Rebuild from the base64url fragment of a share link.
    pub fn from_url_fragment(fragment: &str) -> Result<Self> {
        let mut material = URL_SAFE_NO_PAD.decode(fragment.trim()).map_err(|e| {
            VaultCryptError::InvalidKey(format!("share link key is not base64url: {e}"))
        })?;
        let key = Self::from_material(&material);
        material.zeroize();
        key
    }

    pub fn material(&self) -> &[u8] {
        &self.material
    }

    /// The symmetric key all Send content is encrypted under.
    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    /// Base64url (no padding) encoding of the material.
    pub fn url_fragment(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.material.as_slice())
    }

    /// Hash a Send password for the server.
    ///
    /// `base64(PBKDF2-SHA256(password, salt = material, 100 000))`.
    pub fn hash_password(&self, password: &str) -> String {
        let mut out = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(
            password.as_bytes(),
            &self.material,
            SEND_PASSWORD_ITERATIONS,
            &mut out,
        );
        let encoded = BASE64.encode(out);
        out.zeroize();
        encoded
    }
}

impl std::fmt::Debug for ShareKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareKey").finish_non_exhaustive()
    }
}

fn stretch_material(material: &[u8]) -> Result<SymmetricKey> {
    if material.len() != SHARE_KEY_MATERIAL_LEN {
        return Err(VaultCryptError::InvalidKey(format!(
            "share key material must be {SHARE_KEY_MATERIAL_LEN} bytes, got {}",
            material.len()
        )));
    }
    let hk = Hkdf::<Sha256>::new(Some(SEND_KEY_SALT), material);
    let mut okm = [0u8; COMBINED_KEY_LEN];
    hk.expand(SEND_KEY_INFO, &mut okm)
        .map_err(|e| VaultCryptError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;
    let key = SymmetricKey::from_bytes(&okm);
    okm.zeroize();
    key
}

// ---------------------------------------------------------------------------
// Creating and opening shares
// ---------------------------------------------------------------------------

/// Encrypt `content` under a brand-new share key.
///
/// When `data_key` is given (signed-in sender) the share key material is
/// also wrapped under it so the sender can reopen the Send later.
/// Anonymous senders keep the returned key only long enough to build the
/// link.
pub fn create_share(
    content: &SendView,
    password: Option<&str>,
    data_key: Option<&SymmetricKey>,
) -> Result<(Send, ShareKey)> {
    let share_key = ShareKey::generate()?;
    let mut view = content.clone();
    view.password = password
        .filter(|p| !p.is_empty())
        .map(|p| share_key.hash_password(p));

    let send = Send::encrypt(&view, &share_key, data_key)?;
    debug!(
        send_type = ?send.send_type,
        password = send.password.is_some(),
        owned = data_key.is_some(),
        "send created"
    );
    Ok((send, share_key))
}

/// Build the distributable link for a Send.
pub fn share_link(base_url: &str, access_id: &str, key: &ShareKey) -> String {
    format!(
        "{}/{LINK_MARKER}{access_id}/{}",
        base_url.trim_end_matches('/'),
        key.url_fragment()
    )
}

/// Split a share link into its access id and key.
pub fn parse_share_link(link: &str) -> Result<(String, ShareKey)> {
    let malformed = || VaultCryptError::InvalidKey(format!("not a share link: {link}"));

    let idx = link.find(LINK_MARKER).ok_or_else(malformed)?;
    let rest = &link[idx + LINK_MARKER.len()..];
    let mut parts = rest.trim_end_matches('/').split('/');
    let access_id = parts.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;
    let fragment = parts.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;
    if parts.next().is_some() {
        return Err(malformed());
    }

    Ok((access_id.to_string(), ShareKey::from_url_fragment(fragment)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_deterministically_stretches() {
        let material = [7u8; SHARE_KEY_MATERIAL_LEN];
        let a = ShareKey::from_material(&material).unwrap();
        let b = ShareKey::from_material(&material).unwrap();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().as_bytes().len(), COMBINED_KEY_LEN);
        assert_ne!(a.key(), ShareKey::generate().unwrap().key());
    }

    #[test]
    fn wrong_material_length_is_rejected() {
        assert!(matches!(
            ShareKey::from_material(&[0u8; 15]),
            Err(VaultCryptError::InvalidKey(_))
        ));
    }

    #[test]
    fn link_round_trip() {
        let key = ShareKey::generate().unwrap();
        let link = share_link("https://send.example.com/", "abc123", &key);
        assert!(link.starts_with("https://send.example.com/#/send/abc123/"));
        assert!(!link.contains('='));

        let (access_id, parsed) = parse_share_link(&link).unwrap();
        assert_eq!(access_id, "abc123");
        assert_eq!(parsed.material(), key.material());
    }

    #[test]
    fn bad_links_are_rejected() {
        for link in [
            "https://send.example.com/",
            "https://send.example.com/#/send/abc",
            "https://send.example.com/#/send//AAAA",
            "https://send.example.com/#/send/abc/!!!",
            "https://send.example.com/#/send/abc/AAAA/extra",
        ] {
            assert!(parse_share_link(link).is_err(), "{link}");
        }
    }

    #[test]
    fn password_hash_depends_on_material() {
        let a = ShareKey::from_material(&[1u8; 16]).unwrap();
        let b = ShareKey::from_material(&[2u8; 16]).unwrap();
        assert_eq!(a.hash_password("pw"), a.hash_password("pw"));
        assert_ne!(a.hash_password("pw"), b.hash_password("pw"));
    }
}
