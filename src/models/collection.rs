//! Organization collections.  Encrypted under the owning organization's key.

use serde::{Deserialize, Serialize};

use super::encodable::{decrypt_fields, encrypt_fields, to_domain, to_persisted};
use crate::account::KeyRing;
use crate::crypto::EncryptedField;
use crate::errors::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectionData {
    pub id: Option<String>,
    pub organization_id: String,
    pub name: Option<String>,
    pub external_id: Option<String>,
    pub read_only: bool,
    pub hide_passwords: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    pub id: Option<String>,
    pub organization_id: String,
    pub name: Option<EncryptedField>,
    pub external_id: Option<String>,
    pub read_only: bool,
    pub hide_passwords: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectionView {
    pub id: Option<String>,
    pub organization_id: String,
    pub name: Option<String>,
    pub external_id: Option<String>,
    pub read_only: bool,
    pub hide_passwords: bool,
}

crate::encodable!(
    Collection, CollectionData, CollectionView,
    encrypted: [name],
    plain: [id, organization_id, external_id, read_only, hide_passwords],
);

impl Collection {
    pub fn from_data(data: &CollectionData) -> Self {
        to_domain(data)
    }

    pub fn to_data(&self) -> CollectionData {
        to_persisted(self)
    }

    /// Decrypt with the owning organization's key.
    ///
    /// Fails with `KeyUnavailable` if this member has no key for it.
    pub async fn decrypt(&self, ring: &KeyRing) -> Result<CollectionView> {
        let key = ring.resolve(Some(&self.organization_id))?;
        Ok(decrypt_fields(self, key).await)
    }

    pub fn encrypt(view: &CollectionView, ring: &KeyRing) -> Result<Self> {
        let key = ring.resolve(Some(&view.organization_id))?;
        encrypt_fields(view, key)
    }
}
