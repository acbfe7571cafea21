//! File attachments on a cipher.
//!
//! The file name is encrypted under the cipher's key.  The file bytes are
//! encrypted under a per-attachment key, which travels wrapped under the
//! cipher's key in the `key` member.  Attachments uploaded before
//! per-attachment keys existed have no `key`; their bytes are encrypted
//! directly under the cipher's key, so they cannot survive a data-key
//! rotation.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::encodable::{decrypt_fields, encrypt_fields, reencrypt_fields, to_domain, to_persisted};
use super::serde_helpers::key_opt;
use crate::crypto::{self, decrypt_buffer, encrypt_buffer, EncryptedField, SymmetricKey};
use crate::errors::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachmentData {
    pub id: Option<String>,
    pub url: Option<String>,
    pub file_name: Option<String>,
    pub key: Option<String>,
    pub size: Option<String>,
    pub size_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attachment {
    pub id: Option<String>,
    pub url: Option<String>,
    pub file_name: Option<EncryptedField>,
    pub key: Option<EncryptedField>,
    pub size: Option<String>,
    pub size_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachmentView {
    pub id: Option<String>,
    pub url: Option<String>,
    pub file_name: Option<String>,
    #[serde(with = "key_opt", skip_serializing_if = "Option::is_none")]
    pub key: Option<SymmetricKey>,
    pub size: Option<String>,
    pub size_name: Option<String>,
}

crate::encodable!(
    Attachment, AttachmentData, AttachmentView,
    encrypted: [file_name],
    plain: [id, url, size, size_name],
);

impl Attachment {
    pub fn from_data(data: &AttachmentData) -> Self {
        let mut attachment: Attachment = to_domain(data);
        attachment.key = data.key.as_deref().map(EncryptedField::from_wire);
        attachment
    }

    pub fn to_data(&self) -> AttachmentData {
        let mut data = to_persisted(self);
        data.key = self.key.as_ref().map(EncryptedField::to_wire);
        data
    }

    /// An attachment without its own key uses the pre-rotation scheme.
    pub fn is_legacy(&self) -> bool {
        self.key.is_none()
    }

    /// Decrypt under the cipher's key.
    ///
    /// A per-attachment key that does not unwrap is left unset (and
    /// logged); the file name still decrypts on its own.
    pub async fn decrypt(&self, cipher_key: &SymmetricKey) -> AttachmentView {
        let mut view = decrypt_fields(self, cipher_key).await;
        view.key = match &self.key {
            Some(wrapped) => match crypto::unwrap_key(wrapped, cipher_key) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(attachment = ?self.id, kind = e.kind(), "attachment key did not unwrap");
                    None
                }
            },
            None => None,
        };
        view
    }

    pub fn encrypt(view: &AttachmentView, cipher_key: &SymmetricKey) -> Result<Self> {
        let mut attachment: Attachment = encrypt_fields(view, cipher_key)?;
        attachment.key = view
            .key
            .as_ref()
            .map(|key| crypto::wrap_key(key, cipher_key))
            .transpose()?;
        Ok(attachment)
    }

    /// Move the file name and the wrapped attachment key to `new_key`.
    ///
    /// The attachment key itself is unchanged, so the stored file bytes
    /// stay valid.
    pub fn reencrypt(&self, old_key: &SymmetricKey, new_key: &SymmetricKey) -> Result<Self> {
        let mut attachment = reencrypt_fields(self, old_key, new_key)?;
        attachment.key = self
            .key
            .as_ref()
            .map(|wrapped| {
                let key = crypto::unwrap_key(wrapped, old_key)?;
                crypto::wrap_key(&key, new_key)
            })
            .transpose()?;
        Ok(attachment)
    }
}

impl AttachmentView {
    /// Give a new attachment its own random key.
    pub fn with_generated_key(mut self) -> Self {
        self.key = Some(SymmetricKey::generate());
        self
    }

    /// Encrypt file contents for upload.
    pub fn encrypt_file(&self, cipher_key: &SymmetricKey, contents: &[u8]) -> Result<Vec<u8>> {
        encrypt_buffer(self.key.as_ref().unwrap_or(cipher_key), contents)
    }

    /// Decrypt downloaded file contents.
    ///
    /// Uses the attachment's own key, or the cipher's key for legacy
    /// attachments.
    pub fn decrypt_file(&self, cipher_key: &SymmetricKey, buffer: &[u8]) -> Result<Vec<u8>> {
        decrypt_buffer(self.key.as_ref().unwrap_or(cipher_key), buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn per_attachment_key_protects_file() {
        let cipher_key = SymmetricKey::generate();
        let view = AttachmentView {
            id: Some("att-1".into()),
            file_name: Some("passport.pdf".into()),
            size: Some("1024".into()),
            ..Default::default()
        }
        .with_generated_key();

        let blob = view.encrypt_file(&cipher_key, b"%PDF-1.7").unwrap();
        let attachment = Attachment::encrypt(&view, &cipher_key).unwrap();
        assert!(!attachment.is_legacy());

        let restored = Attachment::from_data(&attachment.to_data())
            .decrypt(&cipher_key)
            .await;
        assert_eq!(restored, view);
        assert_eq!(restored.decrypt_file(&cipher_key, &blob).unwrap(), b"%PDF-1.7");

        // The cipher key alone cannot open the file.
        assert!(decrypt_buffer(&cipher_key, &blob).is_err());
    }

    #[tokio::test]
    async fn reencrypt_keeps_file_key() {
        let old = SymmetricKey::generate();
        let new = SymmetricKey::generate();
        let view = AttachmentView {
            file_name: Some("a.txt".into()),
            ..Default::default()
        }
        .with_generated_key();
        let blob = view.encrypt_file(&old, b"hello").unwrap();

        let moved = Attachment::encrypt(&view, &old)
            .unwrap()
            .reencrypt(&old, &new)
            .unwrap();
        let restored = moved.decrypt(&new).await;
        assert_eq!(restored.file_name.as_deref(), Some("a.txt"));
        assert_eq!(restored.decrypt_file(&new, &blob).unwrap(), b"hello");
    }

    #[test]
    fn missing_key_is_legacy() {
        let data: AttachmentData =
            serde_json::from_str(r#"{"id":"x","fileName":"2.AAAA|AAAA|AAAA"}"#).unwrap();
        assert!(Attachment::from_data(&data).is_legacy());
    }
}
