//! User-defined custom fields attached to a cipher.

use serde::{Deserialize, Serialize};

use super::enums::FieldType;
use crate::crypto::EncryptedField;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldData {
    pub name: Option<String>,
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// For `FieldType::Linked`, the id of the login/card/identity member
    /// this field mirrors.
    pub linked_id: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Field {
    pub name: Option<EncryptedField>,
    pub value: Option<EncryptedField>,
    pub field_type: FieldType,
    pub linked_id: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldView {
    pub name: Option<String>,
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub linked_id: Option<u32>,
}

crate::encodable!(
    Field, FieldData, FieldView,
    encrypted: [name, value],
    plain: [field_type, linked_id],
);
crate::flat_codec!(Field, FieldData, FieldView);

impl FieldView {
    /// Value to display: hidden fields are masked, booleans normalized.
    pub fn display_value(&self) -> Option<String> {
        let value = self.value.as_deref()?;
        Some(match self.field_type {
            FieldType::Hidden => "•".repeat(value.chars().count()),
            FieldType::Boolean => value.eq_ignore_ascii_case("true").to_string(),
            FieldType::Text | FieldType::Linked => value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_value_by_type() {
        let mut view = FieldView {
            value: Some("abc".into()),
            field_type: FieldType::Hidden,
            ..Default::default()
        };
        assert_eq!(view.display_value().as_deref(), Some("•••"));

        view.field_type = FieldType::Boolean;
        view.value = Some("TRUE".into());
        assert_eq!(view.display_value().as_deref(), Some("true"));
    }

    #[test]
    fn linked_field_json_shape() {
        let data: FieldData =
            serde_json::from_str(r#"{"name":"2.AAAA|AAAA|AAAA","type":3,"linkedId":100}"#).unwrap();
        assert_eq!(data.field_type, FieldType::Linked);
        assert_eq!(data.linked_id, Some(100));
        assert!(Field::from_data(&data).name.is_some());
    }
}
