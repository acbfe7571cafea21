use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crypto::{KdfAlgorithm, KdfConfig};
use crate::errors::{Result, VaultCryptError};

/// Tool configuration, loaded from `vaultcrypt.toml`.
///
/// Every field has a default so the tool works without any config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// KDF used by `derive-key` when none is given on the command line.
    #[serde(default = "default_kdf_algorithm")]
    pub kdf_algorithm: KdfAlgorithm,

    /// PBKDF2-SHA256 iteration count (default: 600 000).
    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,

    /// Argon2id iteration count (default: 3).
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2id memory cost in MiB (default: 64).
    #[serde(default = "default_argon2_memory_mib")]
    pub argon2_memory_mib: u32,

    /// Argon2id parallelism degree (default: 4).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,

    /// Base URL that Send links are built on.
    #[serde(default = "default_send_base_url")]
    pub send_base_url: String,

    /// How many ciphers the decrypt worker handles concurrently.
    #[serde(default = "default_worker_batch_size")]
    pub worker_batch_size: usize,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_kdf_algorithm() -> KdfAlgorithm {
    KdfAlgorithm::Pbkdf2Sha256
}

fn default_pbkdf2_iterations() -> u32 {
    600_000
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_memory_mib() -> u32 {
    64
}

fn default_argon2_parallelism() -> u32 {
    4
}

fn default_send_base_url() -> String {
    "https://send.example.com".to_string()
}

fn default_worker_batch_size() -> usize {
    crate::worker::DEFAULT_BATCH_SIZE
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            kdf_algorithm: default_kdf_algorithm(),
            pbkdf2_iterations: default_pbkdf2_iterations(),
            argon2_iterations: default_argon2_iterations(),
            argon2_memory_mib: default_argon2_memory_mib(),
            argon2_parallelism: default_argon2_parallelism(),
            send_base_url: default_send_base_url(),
            worker_batch_size: default_worker_batch_size(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for.
    pub const FILE_NAME: &'static str = "vaultcrypt.toml";

    /// Load settings from `<dir>/vaultcrypt.toml`.
    ///
    /// If the file does not exist, defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            VaultCryptError::Config(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        Ok(settings)
    }

    /// The KDF configuration for the configured algorithm, validated.
    pub fn kdf_config(&self) -> Result<KdfConfig> {
        self.kdf_config_for(self.kdf_algorithm)
    }

    /// The KDF configuration for `algorithm` using these cost settings.
    pub fn kdf_config_for(&self, algorithm: KdfAlgorithm) -> Result<KdfConfig> {
        let config = match algorithm {
            KdfAlgorithm::Pbkdf2Sha256 => KdfConfig::pbkdf2(self.pbkdf2_iterations),
            KdfAlgorithm::Argon2id => KdfConfig::argon2id(
                self.argon2_iterations,
                self.argon2_memory_mib,
                self.argon2_parallelism,
            ),
        };
        config
            .validate()
            .map_err(|e| VaultCryptError::Config(format!("{}: {e}", Self::FILE_NAME)))?;
        Ok(config)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
