pub mod decrypt;
pub mod derive_key;
pub mod encrypt;
pub mod inspect;
pub mod open_link;
pub mod send_link;
