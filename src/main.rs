use clap::Parser;
use tracing_subscriber::EnvFilter;
use vaultcrypt::cli::{Cli, Commands};

/// Environment variable holding the log filter (e.g. `vaultcrypt=debug`).
const LOG_ENV: &str = "VAULTCRYPT_LOG";

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::DeriveKey { ref email, ref kdf } => {
            vaultcrypt::cli::commands::derive_key::execute(&cli, email, kdf.as_deref())
        }
        Commands::Inspect { ref wire } => vaultcrypt::cli::commands::inspect::execute(wire),
        Commands::Encrypt { ref key, ref text } => {
            vaultcrypt::cli::commands::encrypt::execute(key, text)
        }
        Commands::Decrypt { ref key, ref wire } => {
            vaultcrypt::cli::commands::decrypt::execute(key, wire)
        }
        Commands::SendLink {
            ref text,
            ref name,
            ref password,
        } => vaultcrypt::cli::commands::send_link::execute(&cli, text, name, password.as_deref()),
        Commands::OpenLink { ref link, ref wire } => {
            vaultcrypt::cli::commands::open_link::execute(link, wire)
        }
    };

    if let Err(e) = result {
        vaultcrypt::cli::output::error(&e.to_string());
        std::process::exit(1);
    }
}

/// Logs go to stderr so command output on stdout stays pipeable.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
