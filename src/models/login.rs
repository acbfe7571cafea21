//! Login items and their URIs.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use super::encodable::{decrypt_fields, encrypt_fields, reencrypt_fields, to_domain, to_persisted};
use super::enums::UriMatchType;
use crate::crypto::{EncryptedField, SymmetricKey};
use crate::errors::Result;

// ---------------------------------------------------------------------------
// LoginUri
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginUriData {
    pub uri: Option<String>,
    #[serde(rename = "match")]
    pub match_type: Option<UriMatchType>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoginUri {
    pub uri: Option<EncryptedField>,
    pub match_type: Option<UriMatchType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginUriView {
    pub uri: Option<String>,
    #[serde(rename = "match")]
    pub match_type: Option<UriMatchType>,
}

crate::encodable!(LoginUri, LoginUriData, LoginUriView, encrypted: [uri], plain: [match_type]);
crate::flat_codec!(LoginUri, LoginUriData, LoginUriView);

impl LoginUriView {
    /// Host part of the URI, without scheme, credentials, port or path.
    ///
    /// Returns `None` for values that do not look like a network address
    /// (app identifiers such as `androidapp://...` still yield their host).
    pub fn hostname(&self) -> Option<String> {
        let uri = self.uri.as_deref()?.trim();
        if uri.is_empty() {
            return None;
        }
        let rest = match uri.find("://") {
            Some(idx) => &uri[idx + 3..],
            None => uri,
        };
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let host_port = authority.rsplit('@').next().unwrap_or_default();
        let host = if let Some(stripped) = host_port.strip_prefix('[') {
            stripped.split(']').next().unwrap_or_default()
        } else {
            host_port.split(':').next().unwrap_or_default()
        };
        if host.is_empty() || host.contains(char::is_whitespace) {
            None
        } else {
            Some(host.to_ascii_lowercase())
        }
    }
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginData {
    pub uris: Option<Vec<LoginUriData>>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub password_revision_date: Option<DateTime<Utc>>,
    pub totp: Option<String>,
    pub autofill_on_page_load: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Login {
    pub uris: Option<Vec<LoginUri>>,
    pub username: Option<EncryptedField>,
    pub password: Option<EncryptedField>,
    pub password_revision_date: Option<DateTime<Utc>>,
    pub totp: Option<EncryptedField>,
    pub autofill_on_page_load: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginView {
    pub uris: Option<Vec<LoginUriView>>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub password_revision_date: Option<DateTime<Utc>>,
    pub totp: Option<String>,
    pub autofill_on_page_load: Option<bool>,
}

crate::encodable!(
    Login, LoginData, LoginView,
    encrypted: [username, password, totp],
    plain: [password_revision_date, autofill_on_page_load],
);

impl Login {
    pub fn from_data(data: &LoginData) -> Self {
        let mut login: Login = to_domain(data);
        login.uris = data
            .uris
            .as_ref()
            .map(|uris| uris.iter().map(LoginUri::from_data).collect());
        login
    }

    pub fn to_data(&self) -> LoginData {
        let mut data = to_persisted(self);
        data.uris = self
            .uris
            .as_ref()
            .map(|uris| uris.iter().map(LoginUri::to_data).collect());
        data
    }

    /// Decrypt the login and all of its URIs concurrently.
    pub async fn decrypt(&self, key: &SymmetricKey) -> LoginView {
        let uris = async {
            match &self.uris {
                Some(uris) => Some(join_all(uris.iter().map(|u| u.decrypt(key))).await),
                None => None,
            }
        };
        let (mut view, uris) = futures::join!(decrypt_fields(self, key), uris);
        view.uris = uris;
        view
    }

    pub fn encrypt(view: &LoginView, key: &SymmetricKey) -> Result<Self> {
        let mut login: Login = encrypt_fields(view, key)?;
        login.uris = view
            .uris
            .as_ref()
            .map(|uris| {
                uris.iter()
                    .map(|u| LoginUri::encrypt(u, key))
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;
        Ok(login)
    }

    pub fn reencrypt(&self, old_key: &SymmetricKey, new_key: &SymmetricKey) -> Result<Self> {
        let mut login = reencrypt_fields(self, old_key, new_key)?;
        login.uris = self
            .uris
            .as_ref()
            .map(|uris| {
                uris.iter()
                    .map(|u| u.reencrypt(old_key, new_key))
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;
        Ok(login)
    }
}

impl LoginView {
    /// Secondary line shown under the item name.
    pub fn subtitle(&self) -> Option<String> {
        self.username.clone().filter(|u| !u.is_empty())
    }

    /// The password with every character masked, or `None` if unset.
    pub fn masked_password(&self) -> Option<String> {
        self.password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| "•".repeat(p.chars().count()))
    }

    /// Hostname of the first URI that has one.
    pub fn primary_hostname(&self) -> Option<String> {
        self.uris
            .as_ref()?
            .iter()
            .find_map(LoginUriView::hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(value: &str) -> LoginUriView {
        LoginUriView {
            uri: Some(value.into()),
            match_type: None,
        }
    }

    #[test]
    fn hostname_strips_scheme_port_and_path() {
        assert_eq!(
            uri("https://User@Example.com:8443/login?x=1").hostname().as_deref(),
            Some("example.com")
        );
        assert_eq!(uri("example.org/path").hostname().as_deref(), Some("example.org"));
        assert_eq!(uri("http://[::1]:80/").hostname().as_deref(), Some("::1"));
        assert_eq!(uri("   ").hostname(), None);
    }

    #[test]
    fn derived_values() {
        let view = LoginView {
            username: Some("alice".into()),
            password: Some("hunter2".into()),
            uris: Some(vec![uri(""), uri("https://a.example")]),
            ..Default::default()
        };
        assert_eq!(view.subtitle().as_deref(), Some("alice"));
        assert_eq!(view.masked_password().as_deref(), Some("•••••••"));
        assert_eq!(view.primary_hostname().as_deref(), Some("a.example"));
    }

    #[tokio::test]
    async fn login_with_uris_round_trips() {
        let key = SymmetricKey::generate();
        let view = LoginView {
            username: Some("alice".into()),
            password: Some("hunter2".into()),
            uris: Some(vec![LoginUriView {
                uri: Some("https://example.com".into()),
                match_type: Some(UriMatchType::Host),
            }]),
            autofill_on_page_load: Some(true),
            ..Default::default()
        };

        let data = Login::encrypt(&view, &key).unwrap().to_data();
        let json = serde_json::to_string(&data).unwrap();
        assert!(json.contains("\"match\":1"));
        assert!(!json.contains("hunter2"));

        let back = Login::from_data(&serde_json::from_str(&json).unwrap());
        assert_eq!(back.decrypt(&key).await, view);
    }
}
