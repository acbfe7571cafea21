//! `vaultcrypt send-link`: create an anonymous text Send.
//!
//! Prints the share link and the access record the server would return
//! for it.  Feed both to `open-link` to read the Send back.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

use crate::cli::output;
use crate::cli::Cli;
use crate::errors::Result;
use crate::models::{SendAccess, SendTextView, SendType, SendView};
use crate::share::{create_share, share_link};

/// Execute the `send-link` command.
pub fn execute(cli: &Cli, text: &str, name: &str, password: Option<&str>) -> Result<()> {
    let settings = cli.settings()?;
    let access_id = new_access_id();

    let content = SendView {
        access_id: Some(access_id.clone()),
        send_type: SendType::Text,
        name: Some(name.to_string()),
        text: Some(SendTextView {
            text: Some(text.to_string()),
            hidden: false,
        }),
        ..Default::default()
    };

    let (send, share_key) = create_share(&content, password, None)?;
    let link = share_link(&settings.send_base_url, &access_id, &share_key);
    let access = serde_json::to_string(&SendAccess::from_send(&send).to_data())?;

    output::success("Send created");
    output::field("Link", &link);
    if let Some(hash) = &send.password {
        output::field("Password hash", hash);
    }
    output::field("Access record", &access);
    output::tip("Anyone holding the link can read this Send.");

    Ok(())
}

fn new_access_id() -> String {
    let mut raw = [0u8; 12];
    rand::rng().fill_bytes(&mut raw);
    URL_SAFE_NO_PAD.encode(raw)
}
