//! `vaultcrypt decrypt`: decrypt one wire string and print the plaintext.

use zeroize::Zeroizing;

use crate::cli::parse_key_arg;
use crate::crypto::EncryptedField;
use crate::errors::Result;

/// Execute the `decrypt` command.
pub fn execute(key: &str, wire: &str) -> Result<()> {
    let key = parse_key_arg(key)?;
    let field = EncryptedField::parse(wire.trim())?;
    let plaintext = Zeroizing::new(field.decrypt_to_string(&key)?);

    println!("{}", plaintext.as_str());

    Ok(())
}
