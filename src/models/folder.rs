//! Personal folders.  Always encrypted under the account data key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::EncryptedField;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderData {
    pub id: Option<String>,
    pub name: Option<String>,
    pub revision_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Folder {
    pub id: Option<String>,
    pub name: Option<EncryptedField>,
    pub revision_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderView {
    pub id: Option<String>,
    pub name: Option<String>,
    pub revision_date: Option<DateTime<Utc>>,
}

crate::encodable!(Folder, FolderData, FolderView, encrypted: [name], plain: [id, revision_date]);
crate::flat_codec!(Folder, FolderData, FolderView);
