//! Secure notes.  The note body lives in the cipher's shared `notes`
//! member, so the sub-object only carries its type.

use serde::{Deserialize, Serialize};

use super::enums::SecureNoteType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecureNoteData {
    #[serde(rename = "type")]
    pub note_type: SecureNoteType,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecureNote {
    pub note_type: SecureNoteType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecureNoteView {
    #[serde(rename = "type")]
    pub note_type: SecureNoteType,
}

crate::encodable!(
    SecureNote, SecureNoteData, SecureNoteView,
    encrypted: [],
    plain: [note_type],
);
crate::flat_codec!(SecureNote, SecureNoteData, SecureNoteView);
