//! One generic traversal for every vault entity.
//!
//! Each entity exists in three parallel shapes:
//!
//! - **Persisted** (`*Data`): serde structs exchanged with the server and
//!   storage.  Sensitive members are opaque wire strings.
//! - **Encrypted-domain** (the bare type name): sensitive members are
//!   [`EncryptedField`]s, everything else is plain.
//! - **Plaintext-view** (`*View`): sensitive members are plain strings.
//!
//! An entity describes its sensitive members once, as a static table of
//! [`FieldSpec`]s, and its plain members (ids, dates, enums, flags) as a
//! list that is copied verbatim between shapes.  The [`encodable!`] macro
//! generates both from a short declaration.  Nested objects and arrays are
//! not in the table; composite entities handle those themselves and call
//! back into these functions for each part.
//!
//! Decryption is field-isolated: every sensitive member decrypts in its own
//! future, all futures are joined, and a member that fails resolves to
//! [`DECRYPT_ERROR`] instead of failing its siblings.

use futures::future::join_all;
use tracing::warn;
use zeroize::Zeroize;

use crate::crypto::{decrypt_field, encrypt_field, EncryptedField, SymmetricKey};
use crate::errors::Result;

/// Value assigned to a view member whose ciphertext could not be decrypted.
pub const DECRYPT_ERROR: &str = "[error: cannot decrypt]";

/// Accessors for one sensitive member across the three shapes.
pub struct FieldSpec<E: Encodable> {
    pub name: &'static str,
    pub get_data: fn(&E::Data) -> Option<&str>,
    pub set_data: fn(&mut E::Data, Option<String>),
    pub get_domain: fn(&E) -> Option<&EncryptedField>,
    pub set_domain: fn(&mut E, Option<EncryptedField>),
    pub get_view: fn(&E::View) -> Option<&str>,
    pub set_view: fn(&mut E::View, Option<String>),
}

/// An encrypted-domain entity with a field-mapping table.
pub trait Encodable: Default + Sized + 'static {
    type Data: Default;
    type View: Default;

    /// The sensitive members of this entity.
    fn fields() -> &'static [FieldSpec<Self>];

    /// Copy the plain members out of a persisted record.
    fn plain_from_data(data: &Self::Data) -> Self;

    /// Copy the plain members into a persisted record.
    fn plain_to_data(&self) -> Self::Data;

    /// Copy the plain members into a view.
    fn plain_to_view(&self) -> Self::View;

    /// Copy the plain members out of a view.
    fn plain_from_view(view: &Self::View) -> Self;
}

/// Persisted → Encrypted-domain.
///
/// Plain members are copied through; every sensitive member is wrapped
/// as a leniently parsed [`EncryptedField`], so a malformed value stays
/// attached to its record instead of rejecting it.
pub fn to_domain<E: Encodable>(data: &E::Data) -> E {
    let mut domain = E::plain_from_data(data);
    for spec in E::fields() {
        let value = (spec.get_data)(data).map(EncryptedField::from_wire);
        (spec.set_domain)(&mut domain, value);
    }
    domain
}

/// Encrypted-domain → Persisted.
pub fn to_persisted<E: Encodable>(domain: &E) -> E::Data {
    let mut data = domain.plain_to_data();
    for spec in E::fields() {
        let value = (spec.get_domain)(domain).map(EncryptedField::to_wire);
        (spec.set_data)(&mut data, value);
    }
    data
}

/// Encrypted-domain → Plaintext-view under `key`.
///
/// Never fails: a member that cannot be decrypted becomes [`DECRYPT_ERROR`].
pub async fn decrypt_fields<E: Encodable>(domain: &E, key: &SymmetricKey) -> E::View {
    let outcomes = join_all(E::fields().iter().map(|spec| async move {
        let value = match (spec.get_domain)(domain) {
            Some(field) => Some(decrypt_member(spec.name, field, key).await),
            None => None,
        };
        (spec, value)
    }))
    .await;

    let mut view = domain.plain_to_view();
    for (spec, value) in outcomes {
        (spec.set_view)(&mut view, value);
    }
    view
}

/// Plaintext-view → Encrypted-domain under `key`.
///
/// Encryption failures are escalated: a partially encrypted record must
/// never be produced.
pub fn encrypt_fields<E: Encodable>(view: &E::View, key: &SymmetricKey) -> Result<E> {
    let mut domain = E::plain_from_view(view);
    for spec in E::fields() {
        let value = match (spec.get_view)(view) {
            Some(text) => Some(encrypt_field(key, text.as_bytes())?),
            None => None,
        };
        (spec.set_domain)(&mut domain, value);
    }
    Ok(domain)
}

/// Whether every populated sensitive member parsed cleanly.
pub fn fields_well_formed<E: Encodable>(domain: &E) -> bool {
    E::fields()
        .iter()
        .filter_map(|spec| (spec.get_domain)(domain))
        .all(EncryptedField::is_valid)
}

/// Move every sensitive member from `old_key` to `new_key`.
///
/// Unlike [`decrypt_fields`] this is strict: the first member that does
/// not decrypt aborts the whole entity, so a sentinel can never be
/// re-encrypted as if it were the user's data.
pub fn reencrypt_fields<E: Encodable + Clone>(
    domain: &E,
    old_key: &SymmetricKey,
    new_key: &SymmetricKey,
) -> Result<E> {
    let mut out = domain.clone();
    for spec in E::fields() {
        let value = match (spec.get_domain)(domain) {
            Some(field) => Some(reencrypt_field(field, old_key, new_key)?),
            None => None,
        };
        (spec.set_domain)(&mut out, value);
    }
    Ok(out)
}

/// Decrypt one field under `old_key` and encrypt the plaintext under `new_key`.
pub fn reencrypt_field(
    field: &EncryptedField,
    old_key: &SymmetricKey,
    new_key: &SymmetricKey,
) -> Result<EncryptedField> {
    let mut plaintext = decrypt_field(field, old_key)?;
    let out = encrypt_field(new_key, &plaintext);
    plaintext.zeroize();
    out
}

/// Decrypt one member, turning any failure into the sentinel.
pub(crate) async fn decrypt_member(name: &str, field: &EncryptedField, key: &SymmetricKey) -> String {
    match field.decrypt_to_string(key) {
        Ok(text) => text,
        Err(e) => {
            warn!(field = name, kind = e.kind(), "field did not decrypt");
            DECRYPT_ERROR.to_string()
        }
    }
}

/// Implement [`Encodable`] for a three-shape entity.
///
/// ```ignore
/// encodable! {
///     Folder, FolderData, FolderView,
///     encrypted: [name],
///     plain: [id, revision_date],
/// }
/// ```
///
/// Encrypted members are `Option<String>` in data and view and
/// `Option<EncryptedField>` in the domain.  Plain members have the same
/// type in all three.
#[macro_export]
macro_rules! encodable {
    (
        $domain:ident, $data:ident, $view:ident,
        encrypted: [$($enc:ident),* $(,)?],
        plain: [$($plain:ident),* $(,)?] $(,)?
    ) => {
        impl $crate::models::encodable::Encodable for $domain {
            type Data = $data;
            type View = $view;

            fn fields() -> &'static [$crate::models::encodable::FieldSpec<Self>] {
                const FIELDS: &[$crate::models::encodable::FieldSpec<$domain>] = &[
                    $(
                        $crate::models::encodable::FieldSpec {
                            name: stringify!($enc),
                            get_data: |d| d.$enc.as_deref(),
                            set_data: |d, v| d.$enc = v,
                            get_domain: |e| e.$enc.as_ref(),
                            set_domain: |e, v| e.$enc = v,
                            get_view: |v| v.$enc.as_deref(),
                            set_view: |v, s| v.$enc = s,
                        },
                    )*
                ];
                FIELDS
            }

            #[allow(clippy::needless_update, unused_variables)]
            fn plain_from_data(data: &$data) -> Self {
                Self {
                    $($plain: data.$plain.clone(),)*
                    ..Default::default()
                }
            }

            #[allow(clippy::needless_update, unused_variables)]
            fn plain_to_data(&self) -> $data {
                $data {
                    $($plain: self.$plain.clone(),)*
                    ..Default::default()
                }
            }

            #[allow(clippy::needless_update, unused_variables)]
            fn plain_to_view(&self) -> $view {
                $view {
                    $($plain: self.$plain.clone(),)*
                    ..Default::default()
                }
            }

            #[allow(clippy::needless_update, unused_variables)]
            fn plain_from_view(view: &$view) -> Self {
                Self {
                    $($plain: view.$plain.clone(),)*
                    ..Default::default()
                }
            }
        }
    };
}

/// Give a flat entity (no nested parts) the standard codec methods.
#[macro_export]
macro_rules! flat_codec {
    ($domain:ident, $data:ident, $view:ident) => {
        impl $domain {
            /// Persisted → Encrypted-domain.
            pub fn from_data(data: &$data) -> Self {
                $crate::models::encodable::to_domain(data)
            }

            /// Encrypted-domain → Persisted.
            pub fn to_data(&self) -> $data {
                $crate::models::encodable::to_persisted(self)
            }

            /// Encrypted-domain → Plaintext-view.
            pub async fn decrypt(&self, key: &$crate::crypto::SymmetricKey) -> $view {
                $crate::models::encodable::decrypt_fields(self, key).await
            }

            /// Plaintext-view → Encrypted-domain.
            pub fn encrypt(
                view: &$view,
                key: &$crate::crypto::SymmetricKey,
            ) -> $crate::errors::Result<Self> {
                $crate::models::encodable::encrypt_fields(view, key)
            }

            /// Whether every populated sensitive member parsed cleanly.
            pub fn is_well_formed(&self) -> bool {
                $crate::models::encodable::fields_well_formed(self)
            }

            /// Re-encrypt every sensitive member under `new_key`.
            pub fn reencrypt(
                &self,
                old_key: &$crate::crypto::SymmetricKey,
                new_key: &$crate::crypto::SymmetricKey,
            ) -> $crate::errors::Result<Self> {
                $crate::models::encodable::reencrypt_fields(self, old_key, new_key)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct SampleData {
        id: Option<String>,
        secret: Option<String>,
        other: Option<String>,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Sample {
        id: Option<String>,
        secret: Option<EncryptedField>,
        other: Option<EncryptedField>,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct SampleView {
        id: Option<String>,
        secret: Option<String>,
        other: Option<String>,
    }

    encodable!(Sample, SampleData, SampleView, encrypted: [secret, other], plain: [id]);

    #[derive(Debug, Default, Clone, PartialEq)]
    struct SealedData {
        secret: Option<String>,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Sealed {
        secret: Option<EncryptedField>,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct SealedView {
        secret: Option<String>,
    }

    encodable!(Sealed, SealedData, SealedView, encrypted: [secret], plain: []);

    /// Walks the table through a generic bound, the way every caller does.
    fn member_names<E: Encodable>() -> Vec<&'static str> {
        E::fields().iter().map(|spec| spec.name).collect()
    }

    #[tokio::test]
    async fn round_trip_through_all_shapes() {
        let key = SymmetricKey::generate();
        let view = SampleView {
            id: Some("p1".into()),
            secret: Some("s3cret".into()),
            other: None,
        };

        let domain: Sample = encrypt_fields(&view, &key).unwrap();
        assert_eq!(domain.id.as_deref(), Some("p1"));
        assert!(domain.secret.is_some());
        assert!(domain.other.is_none());

        let data = to_persisted(&domain);
        assert!(data.secret.as_deref().unwrap().starts_with("2."));

        let back: Sample = to_domain(&data);
        assert_eq!(back, domain);
        assert_eq!(decrypt_fields(&back, &key).await, view);
    }

    #[tokio::test]
    async fn entity_without_plain_members_round_trips() {
        assert_eq!(member_names::<Sealed>(), vec!["secret"]);
        assert_eq!(member_names::<Sample>(), vec!["secret", "other"]);

        let key = SymmetricKey::generate();
        let view = SealedView {
            secret: Some("only this".into()),
        };
        let domain: Sealed = encrypt_fields(&view, &key).unwrap();
        assert!(fields_well_formed(&domain));

        let back: Sealed = to_domain(&to_persisted(&domain));
        assert_eq!(decrypt_fields(&back, &key).await, view);
    }

    #[tokio::test]
    async fn one_bad_member_does_not_spoil_the_rest() {
        let key = SymmetricKey::generate();
        let good = encrypt_field(&key, b"fine").unwrap();
        let domain = Sample {
            id: Some("p2".into()),
            secret: Some(EncryptedField::from_wire("2.garbage")),
            other: Some(good),
        };

        let view = decrypt_fields(&domain, &key).await;
        assert_eq!(view.secret.as_deref(), Some(DECRYPT_ERROR));
        assert_eq!(view.other.as_deref(), Some("fine"));
        assert_eq!(view.id.as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn reencrypt_is_strict() {
        let old = SymmetricKey::generate();
        let new = SymmetricKey::generate();
        let view = SampleView {
            id: None,
            secret: Some("keep me".into()),
            other: Some("and me".into()),
        };
        let domain: Sample = encrypt_fields(&view, &old).unwrap();

        let moved = reencrypt_fields(&domain, &old, &new).unwrap();
        assert_eq!(decrypt_fields(&moved, &new).await, view);

        let mut broken = domain.clone();
        broken.other = Some(EncryptedField::from_wire("2.garbage"));
        assert!(reencrypt_fields(&broken, &old, &new).is_err());
    }
}
