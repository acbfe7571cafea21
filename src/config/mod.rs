//! User configuration loaded from `vaultcrypt.toml`.

pub mod settings;

pub use settings::Settings;
