//! Identity items (names, addresses, document numbers).

use serde::{Deserialize, Serialize};

use crate::crypto::EncryptedField;

/// Declare the three identity shapes from one member list.
macro_rules! identity_shapes {
    ($($member:ident),* $(,)?) => {
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase", default)]
        pub struct IdentityData {
            $(pub $member: Option<String>,)*
        }

        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct Identity {
            $(pub $member: Option<EncryptedField>,)*
        }

        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase", default)]
        pub struct IdentityView {
            $(pub $member: Option<String>,)*
        }

        crate::encodable!(
            Identity, IdentityData, IdentityView,
            encrypted: [$($member),*],
            plain: [],
        );
    };
}

identity_shapes!(
    title,
    first_name,
    middle_name,
    last_name,
    address1,
    address2,
    address3,
    city,
    state,
    postal_code,
    country,
    company,
    email,
    phone,
    ssn,
    username,
    passport_number,
    license_number,
);

crate::flat_codec!(Identity, IdentityData, IdentityView);

impl IdentityView {
    /// Title, first, middle and last name joined with spaces.
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [
            &self.title,
            &self.first_name,
            &self.middle_name,
            &self.last_name,
        ]
        .into_iter()
        .filter_map(|p| p.as_deref())
        .filter(|p| !p.is_empty())
        .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    /// First and last name, falling back to whichever exists.
    pub fn subtitle(&self) -> Option<String> {
        let first = self.first_name.as_deref().filter(|s| !s.is_empty());
        let last = self.last_name.as_deref().filter(|s| !s.is_empty());
        match (first, last) {
            (Some(f), Some(l)) => Some(format!("{f} {l}")),
            (Some(one), None) | (None, Some(one)) => Some(one.to_string()),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SymmetricKey;
    use crate::models::encodable::Encodable;

    #[test]
    fn every_member_is_encrypted() {
        assert_eq!(Identity::fields().len(), 18);
    }

    #[test]
    fn names() {
        let view = IdentityView {
            title: Some("Dr".into()),
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            middle_name: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(view.full_name().as_deref(), Some("Dr Ada Lovelace"));
        assert_eq!(view.subtitle().as_deref(), Some("Ada Lovelace"));
        assert_eq!(IdentityView::default().full_name(), None);
    }

    #[tokio::test]
    async fn identity_round_trips() {
        let key = SymmetricKey::generate();
        let view = IdentityView {
            first_name: Some("Ada".into()),
            ssn: Some("000-00-0000".into()),
            passport_number: Some("X1".into()),
            ..Default::default()
        };
        let identity = Identity::encrypt(&view, &key).unwrap();
        assert_eq!(identity.decrypt(&key).await, view);
    }
}
