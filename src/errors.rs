use thiserror::Error;

/// All errors that can occur in the vaultcrypt engine.
///
/// Field-level decryption failures are normally absorbed into a sentinel
/// value by the entity framework; everything else reaches the caller.
#[derive(Debug, Error)]
pub enum VaultCryptError {
    // --- Wire / field errors ---
    #[error("Malformed encrypted field: {0}")]
    MalformedField(String),

    #[error("Unsupported encryption algorithm tag {0}")]
    UnsupportedAlgorithm(u8),

    #[error("Integrity check failed: wrong key or tampered data")]
    IntegrityFailure,

    #[error("No key available for {0}")]
    KeyUnavailable(String),

    // --- Key material errors ---
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Invalid master password")]
    InvalidPassword,

    #[error("Account is not configured: call set_account first")]
    AccountNotConfigured,

    // --- Rotation errors ---
    #[error("Rotation refused: {0} item(s) have attachments without an attachment key")]
    LegacyAttachments(usize),

    #[error("Rotation batch rejected: {0}")]
    RotationRejected(String),

    #[error("Rotation batch is incomplete: {0}")]
    RotationIncomplete(String),

    // --- Storage errors ---
    #[error("Secure storage error: {0}")]
    Storage(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    Config(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    Serialization(String),

    // --- Worker errors ---
    #[error("Decrypt worker error: {0}")]
    Worker(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

impl VaultCryptError {
    /// Short stable name of the error kind, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedField(_) => "malformed_field",
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            Self::IntegrityFailure => "integrity_failure",
            Self::KeyUnavailable(_) => "key_unavailable",
            Self::InvalidKey(_) => "invalid_key",
            Self::EncryptionFailed(_) => "encryption_failed",
            Self::KeyDerivationFailed(_) => "key_derivation_failed",
            Self::InvalidPassword => "invalid_password",
            Self::AccountNotConfigured => "account_not_configured",
            Self::LegacyAttachments(_) => "legacy_attachments",
            Self::RotationRejected(_) => "rotation_rejected",
            Self::RotationIncomplete(_) => "rotation_incomplete",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Worker(_) => "worker",
            Self::CommandFailed(_) => "command_failed",
        }
    }
}

impl From<serde_json::Error> for VaultCryptError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience type alias for vaultcrypt results.
pub type Result<T> = std::result::Result<T, VaultCryptError>;
