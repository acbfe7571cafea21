//! `vaultcrypt inspect`: show how a wire string parses, without a key.

use crate::cli::output;
use crate::crypto::EncryptedField;
use crate::errors::Result;

/// Execute the `inspect` command.
pub fn execute(wire: &str) -> Result<()> {
    let field = EncryptedField::from_wire(wire.trim());

    // Fails with the field's own defect (malformed or unsupported).
    let parts = field.parts()?;

    // Base64 never contains '.', so a missing dot means no tag prefix.
    let legacy = !field.as_str().contains('.');

    output::success("Well-formed encrypted field");
    output::field(
        "Algorithm",
        &format!("{} ({:?})", parts.algorithm, parts.algorithm),
    );
    output::field("Tagged", if legacy { "no (legacy form)" } else { "yes" });
    if let Some(iv) = &parts.iv {
        output::field("IV", &format!("{} bytes", iv.len()));
    }
    output::field("Ciphertext", &format!("{} bytes", parts.data.len()));
    match &parts.mac {
        Some(mac) => output::field("MAC", &format!("{} bytes", mac.len())),
        None if parts.algorithm.is_asymmetric() => {}
        None => output::warning("This field is not authenticated."),
    }

    Ok(())
}
