//! `vaultcrypt derive-key`: run the account KDF and print the derived keys.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::cli::output;
use crate::cli::{prompt_password, Cli};
use crate::crypto::{derive_master_key, derive_server_verifier, stretch_master_key, KdfAlgorithm};
use crate::errors::{Result, VaultCryptError};

/// Execute the `derive-key` command.
pub fn execute(cli: &Cli, email: &str, kdf: Option<&str>) -> Result<()> {
    let settings = cli.settings()?;
    let algorithm = match kdf {
        Some(name) => parse_algorithm(name)?,
        None => settings.kdf_algorithm,
    };
    let config = settings.kdf_config_for(algorithm)?;

    let password = prompt_password()?;
    let master_key = derive_master_key(password.as_bytes(), email, &config)?;
    let verifier = derive_server_verifier(password.as_bytes(), &master_key);
    let stretched = stretch_master_key(&master_key)?;

    output::warning("The values below are secret key material.");
    output::field("KDF", &format!("{algorithm:?}, {} iterations", config.iterations));
    output::field("Master key", &BASE64.encode(master_key.as_bytes()));
    output::field("Stretched key", &BASE64.encode(stretched.as_bytes()));
    output::field("Server verifier", &verifier);
    output::tip("Pass the stretched key to `vaultcrypt decrypt --key` to open the wrapped data key.");

    Ok(())
}

fn parse_algorithm(name: &str) -> Result<KdfAlgorithm> {
    match name.to_ascii_lowercase().as_str() {
        "pbkdf2" | "pbkdf2sha256" | "pbkdf2-sha256" => Ok(KdfAlgorithm::Pbkdf2Sha256),
        "argon2" | "argon2id" => Ok(KdfAlgorithm::Argon2id),
        other => Err(VaultCryptError::CommandFailed(format!(
            "unknown KDF '{other}' (expected pbkdf2sha256 or argon2id)"
        ))),
    }
}
