//! Vault items.
//!
//! A cipher is a tagged union: `cipher_type` selects exactly one of
//! `login`, `secure_note`, `card` or `identity`.  Custom fields,
//! attachments and password history are independent arrays carried by
//! every type.
//!
//! Decryption resolves one key for the whole item from the [`KeyRing`]
//! (organization key when `organization_id` is set, otherwise the account
//! data key), then decrypts the shared members, the matching sub-object
//! and the three arrays.  Fields that fail become the sentinel; a key that
//! cannot be resolved fails the item.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::attachment::{Attachment, AttachmentData, AttachmentView};
use super::card::{Card, CardData, CardView};
use super::encodable::{
    decrypt_fields, encrypt_fields, fields_well_formed, reencrypt_fields, to_domain, to_persisted,
};
use super::enums::{CipherRepromptType, CipherType};
use super::field::{Field, FieldData, FieldView};
use super::identity::{Identity, IdentityData, IdentityView};
use super::login::{Login, LoginData, LoginView};
use super::password_history::{PasswordHistory, PasswordHistoryData, PasswordHistoryView};
use super::secure_note::{SecureNote, SecureNoteData, SecureNoteView};
use crate::account::KeyRing;
use crate::crypto::{EncryptedField, SymmetricKey};
use crate::errors::Result;

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CipherData {
    pub id: Option<String>,
    pub organization_id: Option<String>,
    pub folder_id: Option<String>,
    #[serde(rename = "type")]
    pub cipher_type: CipherType,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub login: Option<LoginData>,
    pub secure_note: Option<SecureNoteData>,
    pub card: Option<CardData>,
    pub identity: Option<IdentityData>,
    pub fields: Option<Vec<FieldData>>,
    pub attachments: Option<Vec<AttachmentData>>,
    pub password_history: Option<Vec<PasswordHistoryData>>,
    pub favorite: bool,
    pub edit: bool,
    pub view_password: bool,
    pub organization_use_totp: bool,
    pub revision_date: Option<DateTime<Utc>>,
    pub deleted_date: Option<DateTime<Utc>>,
    pub reprompt: CipherRepromptType,
    pub collection_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cipher {
    pub id: Option<String>,
    pub organization_id: Option<String>,
    pub folder_id: Option<String>,
    pub cipher_type: CipherType,
    pub name: Option<EncryptedField>,
    pub notes: Option<EncryptedField>,
    pub login: Option<Login>,
    pub secure_note: Option<SecureNote>,
    pub card: Option<Card>,
    pub identity: Option<Identity>,
    pub fields: Option<Vec<Field>>,
    pub attachments: Option<Vec<Attachment>>,
    pub password_history: Option<Vec<PasswordHistory>>,
    pub favorite: bool,
    pub edit: bool,
    pub view_password: bool,
    pub organization_use_totp: bool,
    pub revision_date: Option<DateTime<Utc>>,
    pub deleted_date: Option<DateTime<Utc>>,
    pub reprompt: CipherRepromptType,
    pub collection_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CipherView {
    pub id: Option<String>,
    pub organization_id: Option<String>,
    pub folder_id: Option<String>,
    #[serde(rename = "type")]
    pub cipher_type: CipherType,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub login: Option<LoginView>,
    pub secure_note: Option<SecureNoteView>,
    pub card: Option<CardView>,
    pub identity: Option<IdentityView>,
    pub fields: Option<Vec<FieldView>>,
    pub attachments: Option<Vec<AttachmentView>>,
    pub password_history: Option<Vec<PasswordHistoryView>>,
    pub favorite: bool,
    pub edit: bool,
    pub view_password: bool,
    pub organization_use_totp: bool,
    pub revision_date: Option<DateTime<Utc>>,
    pub deleted_date: Option<DateTime<Utc>>,
    pub reprompt: CipherRepromptType,
    pub collection_ids: Vec<String>,
}

crate::encodable!(
    Cipher, CipherData, CipherView,
    encrypted: [name, notes],
    plain: [
        id,
        organization_id,
        folder_id,
        cipher_type,
        favorite,
        edit,
        view_password,
        organization_use_totp,
        revision_date,
        deleted_date,
        reprompt,
        collection_ids,
    ],
);

fn map_vec<T, U>(items: &Option<Vec<T>>, f: impl FnMut(&T) -> U) -> Option<Vec<U>> {
    items.as_ref().map(|v| v.iter().map(f).collect())
}

fn try_map_vec<T, U>(
    items: &Option<Vec<T>>,
    f: impl FnMut(&T) -> Result<U>,
) -> Result<Option<Vec<U>>> {
    items
        .as_ref()
        .map(|v| v.iter().map(f).collect::<Result<Vec<_>>>())
        .transpose()
}

// ---------------------------------------------------------------------------
// Persisted <-> Encrypted-domain
// ---------------------------------------------------------------------------

impl Cipher {
    pub fn from_data(data: &CipherData) -> Self {
        let mut cipher: Cipher = to_domain(data);
        cipher.login = data.login.as_ref().map(Login::from_data);
        cipher.secure_note = data.secure_note.as_ref().map(SecureNote::from_data);
        cipher.card = data.card.as_ref().map(Card::from_data);
        cipher.identity = data.identity.as_ref().map(Identity::from_data);
        cipher.fields = map_vec(&data.fields, Field::from_data);
        cipher.attachments = map_vec(&data.attachments, Attachment::from_data);
        cipher.password_history = map_vec(&data.password_history, PasswordHistory::from_data);
        cipher
    }

    pub fn to_data(&self) -> CipherData {
        let mut data = to_persisted(self);
        data.login = self.login.as_ref().map(Login::to_data);
        data.secure_note = self.secure_note.as_ref().map(SecureNote::to_data);
        data.card = self.card.as_ref().map(Card::to_data);
        data.identity = self.identity.as_ref().map(Identity::to_data);
        data.fields = map_vec(&self.fields, Field::to_data);
        data.attachments = map_vec(&self.attachments, Attachment::to_data);
        data.password_history = map_vec(&self.password_history, PasswordHistory::to_data);
        data
    }

    /// Whether the item belongs to an organization rather than the account.
    pub fn is_organization_owned(&self) -> bool {
        self.organization_id.is_some()
    }

    /// Whether any attachment predates per-attachment keys.
    pub fn has_legacy_attachments(&self) -> bool {
        self.attachments
            .as_ref()
            .is_some_and(|a| a.iter().any(Attachment::is_legacy))
    }

    /// Whether every encrypted member, nested ones included, parsed cleanly.
    pub fn is_well_formed(&self) -> bool {
        fn all<T>(items: &Option<Vec<T>>, ok: impl Fn(&T) -> bool) -> bool {
            items.as_ref().map_or(true, |v| v.iter().all(ok))
        }

        fields_well_formed(self)
            && self.login.as_ref().map_or(true, |l| {
                fields_well_formed(l) && all(&l.uris, fields_well_formed)
            })
            && self.card.as_ref().map_or(true, fields_well_formed)
            && self.identity.as_ref().map_or(true, fields_well_formed)
            && all(&self.fields, fields_well_formed)
            && all(&self.attachments, |a| {
                fields_well_formed(a) && a.key.as_ref().map_or(true, EncryptedField::is_valid)
            })
            && all(&self.password_history, fields_well_formed)
    }

    // -----------------------------------------------------------------------
    // Encrypted-domain -> Plaintext-view
    // -----------------------------------------------------------------------

    /// Decrypt with the key this item is scoped to.
    pub async fn decrypt(&self, ring: &KeyRing) -> Result<CipherView> {
        let key = ring.resolve(self.organization_id.as_deref())?;
        Ok(self.decrypt_with_key(key).await)
    }

    /// Decrypt with an explicit key.  Never fails; undecryptable members
    /// become the sentinel.
    pub async fn decrypt_with_key(&self, key: &SymmetricKey) -> CipherView {
        let mut view = decrypt_fields(self, key).await;
        self.decrypt_variant(key, &mut view).await;

        let fields = async {
            match &self.fields {
                Some(v) => Some(join_all(v.iter().map(|f| f.decrypt(key))).await),
                None => None,
            }
        };
        let attachments = async {
            match &self.attachments {
                Some(v) => Some(join_all(v.iter().map(|a| a.decrypt(key))).await),
                None => None,
            }
        };
        let history = async {
            match &self.password_history {
                Some(v) => Some(join_all(v.iter().map(|h| h.decrypt(key))).await),
                None => None,
            }
        };
        let (fields, attachments, history) = futures::join!(fields, attachments, history);
        view.fields = fields;
        view.attachments = attachments;
        view.password_history = history;
        view
    }

    /// Dispatch to the one sub-decoder selected by `cipher_type`.
    async fn decrypt_variant(&self, key: &SymmetricKey, view: &mut CipherView) {
        match self.cipher_type {
            CipherType::Login => {
                if let Some(login) = &self.login {
                    view.login = Some(login.decrypt(key).await);
                }
            }
            CipherType::SecureNote => {
                if let Some(note) = &self.secure_note {
                    view.secure_note = Some(note.decrypt(key).await);
                }
            }
            CipherType::Card => {
                if let Some(card) = &self.card {
                    view.card = Some(card.decrypt(key).await);
                }
            }
            CipherType::Identity => {
                if let Some(identity) = &self.identity {
                    view.identity = Some(identity.decrypt(key).await);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Plaintext-view -> Encrypted-domain
    // -----------------------------------------------------------------------

    /// Encrypt with the key the view is scoped to.
    pub fn encrypt(view: &CipherView, ring: &KeyRing) -> Result<Self> {
        let key = ring.resolve(view.organization_id.as_deref())?;
        Self::encrypt_with_key(view, key)
    }

    pub fn encrypt_with_key(view: &CipherView, key: &SymmetricKey) -> Result<Self> {
        let mut cipher: Cipher = encrypt_fields(view, key)?;
        match view.cipher_type {
            CipherType::Login => {
                cipher.login = view.login.as_ref().map(|l| Login::encrypt(l, key)).transpose()?;
            }
            CipherType::SecureNote => {
                cipher.secure_note = view
                    .secure_note
                    .as_ref()
                    .map(|n| SecureNote::encrypt(n, key))
                    .transpose()?;
            }
            CipherType::Card => {
                cipher.card = view.card.as_ref().map(|c| Card::encrypt(c, key)).transpose()?;
            }
            CipherType::Identity => {
                cipher.identity = view
                    .identity
                    .as_ref()
                    .map(|i| Identity::encrypt(i, key))
                    .transpose()?;
            }
        }
        cipher.fields = try_map_vec(&view.fields, |f| Field::encrypt(f, key))?;
        cipher.attachments = try_map_vec(&view.attachments, |a| Attachment::encrypt(a, key))?;
        cipher.password_history =
            try_map_vec(&view.password_history, |h| PasswordHistory::encrypt(h, key))?;
        Ok(cipher)
    }

    // -----------------------------------------------------------------------
    // Re-keying
    // -----------------------------------------------------------------------

    /// Re-encrypt every encrypted member from `old_key` to `new_key`.
    ///
    /// Strict: any member that does not decrypt under `old_key` fails the
    /// whole item.
    pub fn reencrypt(&self, old_key: &SymmetricKey, new_key: &SymmetricKey) -> Result<Self> {
        let mut cipher = reencrypt_fields(self, old_key, new_key)?;
        cipher.login = self
            .login
            .as_ref()
            .map(|l| l.reencrypt(old_key, new_key))
            .transpose()?;
        cipher.card = self
            .card
            .as_ref()
            .map(|c| c.reencrypt(old_key, new_key))
            .transpose()?;
        cipher.identity = self
            .identity
            .as_ref()
            .map(|i| i.reencrypt(old_key, new_key))
            .transpose()?;
        cipher.fields = try_map_vec(&self.fields, |f| f.reencrypt(old_key, new_key))?;
        cipher.attachments = try_map_vec(&self.attachments, |a| a.reencrypt(old_key, new_key))?;
        cipher.password_history =
            try_map_vec(&self.password_history, |h| h.reencrypt(old_key, new_key))?;
        debug!(id = ?self.id, "cipher re-encrypted");
        Ok(cipher)
    }
}

impl CipherView {
    /// Secondary line for list display, taken from the active sub-object.
    pub fn subtitle(&self) -> Option<String> {
        match self.cipher_type {
            CipherType::Login => self.login.as_ref().and_then(LoginView::subtitle),
            CipherType::Card => self.card.as_ref().and_then(CardView::subtitle),
            CipherType::Identity => self.identity.as_ref().and_then(IdentityView::subtitle),
            CipherType::SecureNote => None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_date.is_some()
    }

    pub fn has_attachments(&self) -> bool {
        self.attachments.as_ref().is_some_and(|a| !a.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn login_view() -> CipherView {
        CipherView {
            id: Some("c1".into()),
            cipher_type: CipherType::Login,
            name: Some("Mail".into()),
            login: Some(LoginView {
                username: Some("alice".into()),
                password: Some("pw".into()),
                ..Default::default()
            }),
            fields: Some(vec![FieldView {
                name: Some("pin".into()),
                value: Some("1234".into()),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn login_cipher_round_trips_through_json() {
        let key = SymmetricKey::generate();
        let ring = KeyRing::new().with_data_key(key);
        let view = login_view();

        let json = serde_json::to_string(&Cipher::encrypt(&view, &ring).unwrap().to_data()).unwrap();
        assert!(json.contains("\"type\":1"));
        assert!(!json.contains("alice"));

        let data: CipherData = serde_json::from_str(&json).unwrap();
        let restored = Cipher::from_data(&data).decrypt(&ring).await.unwrap();
        assert_eq!(restored, view);
        assert_eq!(restored.subtitle().as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn only_the_selected_variant_is_decrypted() {
        let key = SymmetricKey::generate();
        let mut cipher = Cipher::encrypt_with_key(&login_view(), &key).unwrap();
        // A stray card sub-object must be ignored for a login.
        cipher.card = Some(
            Card::encrypt(
                &CardView {
                    number: Some("4111".into()),
                    ..Default::default()
                },
                &key,
            )
            .unwrap(),
        );

        let view = cipher.decrypt_with_key(&key).await;
        assert!(view.login.is_some());
        assert!(view.card.is_none());
        assert!(view.identity.is_none());
        assert!(view.secure_note.is_none());
    }

    #[test]
    fn malformed_nested_member_is_detected() {
        let key = SymmetricKey::generate();
        let mut cipher = Cipher::encrypt_with_key(&login_view(), &key).unwrap();
        assert!(cipher.is_well_formed());

        if let Some(fields) = cipher.fields.as_mut() {
            fields[0].value = Some(EncryptedField::from_wire("9.AAAA"));
        }
        assert!(!cipher.is_well_formed());
    }

    #[test]
    fn legacy_attachment_detection() {
        let mut cipher = Cipher::default();
        assert!(!cipher.has_legacy_attachments());
        cipher.attachments = Some(vec![Attachment::default()]);
        assert!(cipher.has_legacy_attachments());
    }
}
