//! Previous passwords of a login.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::EncryptedField;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PasswordHistoryData {
    pub password: Option<String>,
    pub last_used_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PasswordHistory {
    pub password: Option<EncryptedField>,
    pub last_used_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PasswordHistoryView {
    pub password: Option<String>,
    pub last_used_date: Option<DateTime<Utc>>,
}

crate::encodable!(
    PasswordHistory, PasswordHistoryData, PasswordHistoryView,
    encrypted: [password],
    plain: [last_used_date],
);
crate::flat_codec!(PasswordHistory, PasswordHistoryData, PasswordHistoryView);
