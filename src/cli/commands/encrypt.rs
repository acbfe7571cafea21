//! `vaultcrypt encrypt`: encrypt one value and print its wire form.

use crate::cli::parse_key_arg;
use crate::crypto::encrypt_field;
use crate::errors::Result;

/// Execute the `encrypt` command.
pub fn execute(key: &str, text: &str) -> Result<()> {
    let key = parse_key_arg(key)?;
    let field = encrypt_field(&key, text.as_bytes())?;

    // Bare output so it can be piped into another command.
    println!("{}", field.to_wire());

    Ok(())
}
