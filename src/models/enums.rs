//! Plain (never encrypted) enumerations carried by vault items.
//!
//! All of them travel as integers in server JSON.

use serde::{Deserialize, Serialize};

/// Declare a `u8`-backed enum that serializes as its number.
macro_rules! numeric_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            #[default]
            $first:ident = $first_val:literal,
            $($variant:ident = $val:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(try_from = "u8", into = "u8")]
        #[repr(u8)]
        pub enum $name {
            #[default]
            $first = $first_val,
            $($variant = $val,)*
        }

        impl TryFrom<u8> for $name {
            type Error = String;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $first_val => Ok(Self::$first),
                    $($val => Ok(Self::$variant),)*
                    other => Err(format!("unknown {} value {other}", stringify!($name))),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }
    };
}

numeric_enum! {
    /// Which sub-object a cipher carries.
    pub enum CipherType {
        #[default]
        Login = 1,
        SecureNote = 2,
        Card = 3,
        Identity = 4,
    }
}

numeric_enum! {
    /// Kind of a custom field.
    pub enum FieldType {
        #[default]
        Text = 0,
        Hidden = 1,
        Boolean = 2,
        Linked = 3,
    }
}

numeric_enum! {
    /// How a login URI is matched against a page.
    pub enum UriMatchType {
        #[default]
        Domain = 0,
        Host = 1,
        StartsWith = 2,
        Exact = 3,
        RegularExpression = 4,
        Never = 5,
    }
}

numeric_enum! {
    pub enum SecureNoteType {
        #[default]
        Generic = 0,
    }
}

numeric_enum! {
    /// Whether viewing the cipher asks for the master password again.
    pub enum CipherRepromptType {
        #[default]
        None = 0,
        Password = 1,
    }
}

numeric_enum! {
    pub enum SendType {
        #[default]
        Text = 0,
        File = 1,
    }
}
