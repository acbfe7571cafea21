//! Vault entities in their three shapes.
//!
//! Every entity has a persisted `*Data` type (server JSON), an
//! encrypted-domain type, and a plaintext `*View`.  The generic traversal
//! in [`encodable`] drives the conversions between them.

pub mod attachment;
pub mod card;
pub mod cipher;
pub mod collection;
pub mod encodable;
pub mod enums;
pub mod field;
pub mod folder;
pub mod identity;
pub mod login;
pub mod password_history;
pub mod secure_note;
pub mod send;

mod serde_helpers;

pub use attachment::{Attachment, AttachmentData, AttachmentView};
pub use card::{Card, CardData, CardView};
pub use cipher::{Cipher, CipherData, CipherView};
pub use collection::{Collection, CollectionData, CollectionView};
pub use encodable::{Encodable, FieldSpec, DECRYPT_ERROR};
pub use enums::{
    CipherRepromptType, CipherType, FieldType, SecureNoteType, SendType, UriMatchType,
};
pub use field::{Field, FieldData, FieldView};
pub use folder::{Folder, FolderData, FolderView};
pub use identity::{Identity, IdentityData, IdentityView};
pub use login::{Login, LoginData, LoginUri, LoginUriData, LoginUriView, LoginView};
pub use password_history::{PasswordHistory, PasswordHistoryData, PasswordHistoryView};
pub use secure_note::{SecureNote, SecureNoteData, SecureNoteView};
pub use send::{
    Send, SendAccess, SendAccessData, SendAccessView, SendData, SendFile, SendFileData,
    SendFileView, SendText, SendTextData, SendTextView, SendView,
};
