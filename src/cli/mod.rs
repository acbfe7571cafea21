//! CLI module: Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::Parser;
use zeroize::{Zeroize, Zeroizing};

use crate::config::Settings;
use crate::crypto::SymmetricKey;
use crate::errors::{Result, VaultCryptError};

/// Environment variable consulted before prompting for a password.
pub const PASSWORD_ENV: &str = "VAULTCRYPT_PASSWORD";

/// vaultcrypt CLI: diagnostics for the vault key hierarchy and field codec.
#[derive(Parser)]
#[command(
    name = "vaultcrypt",
    about = "Inspect, encrypt and decrypt vault fields offline",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory containing vaultcrypt.toml (default: current directory)
    #[arg(long, default_value = ".", global = true)]
    pub config_dir: String,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Derive the master key and server verifier for an account
    DeriveKey {
        /// Account email (used as the KDF salt)
        #[arg(long)]
        email: String,

        /// KDF to use instead of the configured one (pbkdf2sha256, argon2id)
        #[arg(long)]
        kdf: Option<String>,
    },

    /// Show the structure of an encrypted field without decrypting it
    Inspect {
        /// Encrypted field in wire form
        wire: String,
    },

    /// Encrypt a value under a symmetric key
    Encrypt {
        /// Base64 key, 32 or 64 bytes
        #[arg(long)]
        key: String,
        /// Plaintext to encrypt
        text: String,
    },

    /// Decrypt an encrypted field
    Decrypt {
        /// Base64 key, 32 or 64 bytes
        #[arg(long)]
        key: String,
        /// Encrypted field in wire form
        wire: String,
    },

    /// Create a text Send and print its share link
    SendLink {
        /// Text to share
        text: String,

        /// Name shown to the recipient
        #[arg(long, default_value = "Shared text")]
        name: String,

        /// Require this password before the server hands out the Send
        #[arg(long)]
        password: Option<String>,
    },

    /// Open a Send using only its share link
    OpenLink {
        /// Share link (the key is in the fragment)
        link: String,
        /// Send access record as JSON, or a single encrypted field
        wire: String,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

impl Cli {
    /// Load settings from `--config-dir`.
    pub fn settings(&self) -> Result<Settings> {
        Settings::load(Path::new(&self.config_dir))
    }
}

/// Get the master password, trying in order:
/// 1. `VAULTCRYPT_PASSWORD` env var (scripted use)
/// 2. Interactive prompt
///
/// Returns `Zeroizing<String>` so the password is wiped from memory on drop.
pub fn prompt_password() -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    let pw = dialoguer::Password::new()
        .with_prompt("Master password")
        .interact()
        .map_err(|e| VaultCryptError::CommandFailed(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

/// Parse a `--key` argument: standard base64 of a 32- or 64-byte key.
pub fn parse_key_arg(encoded: &str) -> Result<SymmetricKey> {
    let mut raw = BASE64
        .decode(encoded.trim())
        .map_err(|e| VaultCryptError::InvalidKey(format!("--key is not base64: {e}")))?;
    let key = SymmetricKey::from_bytes(&raw);
    raw.zeroize();
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_key_arg_accepts_both_lengths() {
        let long = BASE64.encode([1u8; 64]);
        let short = BASE64.encode([1u8; 32]);
        assert!(parse_key_arg(&long).unwrap().authentication_key().is_some());
        assert!(parse_key_arg(&short).unwrap().authentication_key().is_none());
    }

    #[test]
    fn parse_key_arg_rejects_bad_input() {
        assert!(matches!(
            parse_key_arg("not base64!"),
            Err(VaultCryptError::InvalidKey(_))
        ));
        assert!(matches!(
            parse_key_arg(&BASE64.encode([1u8; 16])),
            Err(VaultCryptError::InvalidKey(_))
        ));
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["vaultcrypt", "inspect", "2.a|b|c"]).unwrap();
        assert!(matches!(cli.command, Commands::Inspect { ref wire } if wire == "2.a|b|c"));
        assert_eq!(cli.config_dir, ".");

        let cli = Cli::try_parse_from([
            "vaultcrypt",
            "--config-dir",
            "/tmp/x",
            "derive-key",
            "--email",
            "a@b.c",
        ])
        .unwrap();
        assert_eq!(cli.config_dir, "/tmp/x");
        assert!(matches!(
            cli.command,
            Commands::DeriveKey { ref email, kdf: None } if email == "a@b.c"
        ));
    }
}
