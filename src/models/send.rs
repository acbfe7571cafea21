//! Sends: standalone shares with their own key.
//!
//! All Send content is encrypted under a [`ShareKey`], never under an
//! account key.  A signed-in sender additionally stores the share key
//! material in the `key` member, wrapped under the account data key; an
//! anonymous Send has no `key` and can only be opened from its link.
//!
//! `SendAccess` is the recipient's view of a Send as returned by the
//! access endpoint.  It decrypts with nothing but the link key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use zeroize::Zeroize;

use super::encodable::{decrypt_fields, encrypt_fields, reencrypt_field, to_domain, to_persisted};
use super::enums::SendType;
use super::serde_helpers::base64_opt;
use crate::account::KeyRing;
use crate::crypto::{decrypt_field, encrypt_field, EncryptedField, SymmetricKey};
use crate::errors::{Result, VaultCryptError};
use crate::share::ShareKey;

// ---------------------------------------------------------------------------
// Text and file payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendTextData {
    pub text: Option<String>,
    pub hidden: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendText {
    pub text: Option<EncryptedField>,
    pub hidden: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendTextView {
    pub text: Option<String>,
    pub hidden: bool,
}

crate::encodable!(SendText, SendTextData, SendTextView, encrypted: [text], plain: [hidden]);
crate::flat_codec!(SendText, SendTextData, SendTextView);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendFileData {
    pub id: Option<String>,
    pub file_name: Option<String>,
    pub size: Option<String>,
    pub size_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendFile {
    pub id: Option<String>,
    pub file_name: Option<EncryptedField>,
    pub size: Option<String>,
    pub size_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendFileView {
    pub id: Option<String>,
    pub file_name: Option<String>,
    pub size: Option<String>,
    pub size_name: Option<String>,
}

crate::encodable!(
    SendFile, SendFileData, SendFileView,
    encrypted: [file_name],
    plain: [id, size, size_name],
);
crate::flat_codec!(SendFile, SendFileData, SendFileView);

// ---------------------------------------------------------------------------
// Send
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendData {
    pub id: Option<String>,
    pub access_id: Option<String>,
    #[serde(rename = "type")]
    pub send_type: SendType,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub text: Option<SendTextData>,
    pub file: Option<SendFileData>,
    pub key: Option<String>,
    pub max_access_count: Option<u32>,
    pub access_count: u32,
    pub revision_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub deletion_date: Option<DateTime<Utc>>,
    /// Server-side password hash, never the password itself.
    pub password: Option<String>,
    pub disabled: bool,
    pub hide_email: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Send {
    pub id: Option<String>,
    pub access_id: Option<String>,
    pub send_type: SendType,
    pub name: Option<EncryptedField>,
    pub notes: Option<EncryptedField>,
    pub text: Option<SendText>,
    pub file: Option<SendFile>,
    /// Share key material wrapped under the sender's data key.
    pub key: Option<EncryptedField>,
    pub max_access_count: Option<u32>,
    pub access_count: u32,
    pub revision_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub deletion_date: Option<DateTime<Utc>>,
    pub password: Option<String>,
    pub disabled: bool,
    pub hide_email: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendView {
    pub id: Option<String>,
    pub access_id: Option<String>,
    #[serde(rename = "type")]
    pub send_type: SendType,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub text: Option<SendTextView>,
    pub file: Option<SendFileView>,
    /// Share key material.
    #[serde(with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub key: Option<Vec<u8>>,
    pub max_access_count: Option<u32>,
    pub access_count: u32,
    pub revision_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub deletion_date: Option<DateTime<Utc>>,
    pub password: Option<String>,
    pub disabled: bool,
    pub hide_email: bool,
}

crate::encodable!(
    Send, SendData, SendView,
    encrypted: [name, notes],
    plain: [
        id,
        access_id,
        send_type,
        max_access_count,
        access_count,
        revision_date,
        expiration_date,
        deletion_date,
        password,
        disabled,
        hide_email,
    ],
);

impl Send {
    pub fn from_data(data: &SendData) -> Self {
        let mut send: Send = to_domain(data);
        send.text = data.text.as_ref().map(SendText::from_data);
        send.file = data.file.as_ref().map(SendFile::from_data);
        send.key = data.key.as_deref().map(EncryptedField::from_wire);
        send
    }

    pub fn to_data(&self) -> SendData {
        let mut data = to_persisted(self);
        data.text = self.text.as_ref().map(SendText::to_data);
        data.file = self.file.as_ref().map(SendFile::to_data);
        data.key = self.key.as_ref().map(EncryptedField::to_wire);
        data
    }

    /// Recover the share key from the wrapped material.
    pub fn share_key(&self, data_key: &SymmetricKey) -> Result<ShareKey> {
        let wrapped = self.key.as_ref().ok_or_else(|| {
            VaultCryptError::KeyUnavailable("send key (anonymous send has no stored key)".into())
        })?;
        let mut material = decrypt_field(wrapped, data_key)?;
        let key = ShareKey::from_material(&material);
        material.zeroize();
        key
    }

    /// Decrypt as the owner, via the data key in `ring`.
    pub async fn decrypt(&self, ring: &KeyRing) -> Result<SendView> {
        let data_key = ring.resolve(None)?;
        let share_key = self.share_key(data_key)?;
        Ok(self.decrypt_with_share_key(&share_key).await)
    }

    /// Decrypt with the share key alone.
    pub async fn decrypt_with_share_key(&self, share_key: &ShareKey) -> SendView {
        let key = share_key.key();
        let text = async {
            match &self.text {
                Some(t) => Some(t.decrypt(key).await),
                None => None,
            }
        };
        let file = async {
            match &self.file {
                Some(f) => Some(f.decrypt(key).await),
                None => None,
            }
        };
        let (mut view, text, file) = futures::join!(decrypt_fields(self, key), text, file);
        view.text = text;
        view.file = file;
        view.key = Some(share_key.material().to_vec());
        view
    }

    /// Encrypt content under `share_key`, wrapping the key material under
    /// `data_key` when the sender is signed in.
    pub fn encrypt(
        view: &SendView,
        share_key: &ShareKey,
        data_key: Option<&SymmetricKey>,
    ) -> Result<Self> {
        let key = share_key.key();
        let mut send: Send = encrypt_fields(view, key)?;
        send.text = view.text.as_ref().map(|t| SendText::encrypt(t, key)).transpose()?;
        send.file = view.file.as_ref().map(|f| SendFile::encrypt(f, key)).transpose()?;
        send.key = data_key
            .map(|dk| encrypt_field(dk, share_key.material()))
            .transpose()?;
        Ok(send)
    }

    /// Move the wrapped share key from `old_key` to `new_key`.
    ///
    /// Content stays under the share key and is not touched.
    pub fn rewrap_key(&self, old_key: &SymmetricKey, new_key: &SymmetricKey) -> Result<Self> {
        let mut send = self.clone();
        send.key = self
            .key
            .as_ref()
            .map(|wrapped| reencrypt_field(wrapped, old_key, new_key))
            .transpose()?;
        Ok(send)
    }
}

impl SendView {
    /// Base64url form of the share key material, as used in links.
    pub fn url_key(&self) -> Option<String> {
        let material = self.key.as_deref()?;
        match ShareKey::from_material(material) {
            Ok(key) => Some(key.url_fragment()),
            Err(e) => {
                warn!(kind = e.kind(), "send view carries unusable key material");
                None
            }
        }
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Whether the Send can no longer be opened at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|d| d <= now)
            || self.max_access_count.is_some_and(|max| self.access_count >= max)
    }
}

// ---------------------------------------------------------------------------
// SendAccess
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendAccessData {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub send_type: SendType,
    pub name: Option<String>,
    pub text: Option<SendTextData>,
    pub file: Option<SendFileData>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub creator_identifier: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendAccess {
    pub id: Option<String>,
    pub send_type: SendType,
    pub name: Option<EncryptedField>,
    pub text: Option<SendText>,
    pub file: Option<SendFile>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub creator_identifier: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendAccessView {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub send_type: SendType,
    pub name: Option<String>,
    pub text: Option<SendTextView>,
    pub file: Option<SendFileView>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub creator_identifier: Option<String>,
}

crate::encodable!(
    SendAccess, SendAccessData, SendAccessView,
    encrypted: [name],
    plain: [id, send_type, expiration_date, creator_identifier],
);

impl SendAccess {
    pub fn from_data(data: &SendAccessData) -> Self {
        let mut access: SendAccess = to_domain(data);
        access.text = data.text.as_ref().map(SendText::from_data);
        access.file = data.file.as_ref().map(SendFile::from_data);
        access
    }

    pub fn to_data(&self) -> SendAccessData {
        let mut data = to_persisted(self);
        data.text = self.text.as_ref().map(SendText::to_data);
        data.file = self.file.as_ref().map(SendFile::to_data);
        data
    }

    /// The recipient-facing projection of a Send.
    pub fn from_send(send: &Send) -> Self {
        Self {
            id: send.access_id.clone(),
            send_type: send.send_type,
            name: send.name.clone(),
            text: send.text.clone(),
            file: send.file.clone(),
            expiration_date: send.expiration_date,
            creator_identifier: None,
        }
    }

    /// Decrypt with the key from the share link.  No account key involved.
    pub async fn decrypt(&self, share_key: &ShareKey) -> SendAccessView {
        let key = share_key.key();
        let mut view = decrypt_fields(self, key).await;
        if let Some(text) = &self.text {
            view.text = Some(text.decrypt(key).await);
        }
        if let Some(file) = &self.file {
            view.file = Some(file.decrypt(key).await);
        }
        view
    }
}
