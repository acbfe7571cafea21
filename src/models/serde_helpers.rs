//! Serde helpers for binary values inside plaintext views.
//!
//! Views cross the worker boundary as JSON, so raw bytes and unwrapped
//! keys are carried as base64 strings.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serializer};

use crate::crypto::SymmetricKey;

pub(crate) mod base64_opt {
    use super::*;

    pub fn serialize<S>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match data {
            Some(bytes) => serializer.serialize_some(&BASE64.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| BASE64.decode(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

pub(crate) mod key_opt {
    use super::*;

    pub fn serialize<S>(key: &Option<SymmetricKey>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match key {
            Some(key) => serializer.serialize_some(&BASE64.encode(key.as_bytes())),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SymmetricKey>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            Some(s) => {
                let bytes = BASE64.decode(&s).map_err(serde::de::Error::custom)?;
                SymmetricKey::from_bytes(&bytes)
                    .map(Some)
                    .map_err(serde::de::Error::custom)
            }
            None => Ok(None),
        }
    }
}
