//! `vaultcrypt open-link`: decrypt a Send with nothing but its link.

use crate::cli::output;
use crate::crypto::EncryptedField;
use crate::errors::{Result, VaultCryptError};
use crate::models::{SendAccess, SendAccessData, DECRYPT_ERROR};
use crate::share::parse_share_link;

/// Execute the `open-link` command.
///
/// `wire` is either the JSON access record or a single encrypted field.
pub fn execute(link: &str, wire: &str) -> Result<()> {
    let (access_id, share_key) = parse_share_link(link)?;
    let wire = wire.trim();

    if !wire.starts_with('{') {
        let field = EncryptedField::parse(wire)?;
        println!("{}", field.decrypt_to_string(share_key.key())?);
        return Ok(());
    }

    let data: SendAccessData = serde_json::from_str(wire)?;
    if data.id.as_deref().is_some_and(|id| id != access_id) {
        output::warning(&format!(
            "Access record id does not match the link ({access_id})"
        ));
    }

    let view = futures::executor::block_on(SendAccess::from_data(&data).decrypt(&share_key));

    let text = view.text.as_ref().and_then(|t| t.text.as_deref());
    let opened = [view.name.as_deref(), text]
        .into_iter()
        .flatten()
        .any(|value| value != DECRYPT_ERROR);
    if !opened {
        return Err(VaultCryptError::CommandFailed(
            "the link key does not open this Send".into(),
        ));
    }

    output::field("Name", view.name.as_deref().unwrap_or_default());
    if let Some(text) = text {
        output::field("Text", text);
    }
    if let Some(file) = &view.file {
        output::field("File", file.file_name.as_deref().unwrap_or_default());
    }
    if let Some(expires) = view.expiration_date {
        output::field("Expires", &expires.to_rfc3339());
    }

    Ok(())
}
