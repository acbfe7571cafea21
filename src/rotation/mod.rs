//! Data-key rotation.
//!
//! Rotation replaces the account data key and keypair and re-encrypts
//! every personal item under the new key.  Organization items are left
//! alone; organization keys are only re-sealed to the new public key.
//!
//! The planner builds the complete batch in memory before anything is
//! sent.  A batch is either submitted and installed as a whole, or thrown
//! away; the session keeps its old keys until
//! [`KeyHierarchyService::apply_rotation`](crate::account::KeyHierarchyService::apply_rotation)
//! runs.

use std::collections::{BTreeSet, HashMap};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::account::KeyRing;
use crate::crypto::kdf::{self, VerifierPurpose};
use crate::crypto::{
    self, stretch_master_key, wrap_organization_key, AsymmetricKeyPair, EncryptedField,
    PrivateKey, SymmetricKey,
};
use crate::errors::{Result, VaultCryptError};
use crate::models::{Cipher, CipherData, Folder, FolderData, Send, SendData};

/// Everything the account owns at the moment rotation starts.
#[derive(Debug, Clone, Default)]
pub struct VaultSnapshot {
    pub ciphers: Vec<Cipher>,
    pub folders: Vec<Folder>,
    pub sends: Vec<Send>,
}

impl VaultSnapshot {
    pub fn new(ciphers: Vec<Cipher>, folders: Vec<Folder>, sends: Vec<Send>) -> Self {
        Self {
            ciphers,
            folders,
            sends,
        }
    }

    /// Ciphers encrypted under the account data key.
    pub fn personal_ciphers(&self) -> impl Iterator<Item = &Cipher> {
        self.ciphers.iter().filter(|c| !c.is_organization_owned())
    }
}

/// What gets submitted to the server in one request.
#[derive(Debug, Clone)]
pub struct RotationRequest {
    pub server_verifier: String,
    pub wrapped_data_key: EncryptedField,
    pub key_pair: AsymmetricKeyPair,
    pub organization_keys: HashMap<String, EncryptedField>,
    pub ciphers: Vec<Cipher>,
    pub folders: Vec<Folder>,
    pub sends: Vec<Send>,
}

/// Wire form of a [`RotationRequest`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationPayload {
    pub master_password_hash: String,
    pub key: String,
    pub public_key: String,
    pub encrypted_private_key: String,
    pub organization_keys: HashMap<String, String>,
    pub ciphers: Vec<CipherData>,
    pub folders: Vec<FolderData>,
    pub sends: Vec<SendData>,
}

impl RotationRequest {
    pub fn to_payload(&self) -> RotationPayload {
        RotationPayload {
            master_password_hash: self.server_verifier.clone(),
            key: self.wrapped_data_key.to_wire(),
            public_key: BASE64.encode(&self.key_pair.public_key),
            encrypted_private_key: self.key_pair.wrapped_private_key.to_wire(),
            organization_keys: self
                .organization_keys
                .iter()
                .map(|(id, field)| (id.clone(), field.to_wire()))
                .collect(),
            ciphers: self.ciphers.iter().map(Cipher::to_data).collect(),
            folders: self.folders.iter().map(Folder::to_data).collect(),
            sends: self.sends.iter().map(Send::to_data).collect(),
        }
    }
}

/// Plaintext keys produced by rotation.  Never leave the process.
pub struct RotatedKeys {
    pub master_key: SymmetricKey,
    pub local_verifier: String,
    pub data_key: SymmetricKey,
    pub private_key: PrivateKey,
}

/// Item ids the batch has to cover, taken from the vault before any
/// re-encryption happens.
#[derive(Debug, Clone, Default)]
struct Coverage {
    ciphers: BTreeSet<String>,
    cipher_count: usize,
    folders: BTreeSet<String>,
    folder_count: usize,
    sends: usize,
    organizations: BTreeSet<String>,
}

impl Coverage {
    fn of(vault: &VaultSnapshot, ring: &KeyRing) -> Self {
        Self {
            ciphers: vault.personal_ciphers().filter_map(|c| c.id.clone()).collect(),
            cipher_count: vault.personal_ciphers().count(),
            folders: vault.folders.iter().filter_map(|f| f.id.clone()).collect(),
            folder_count: vault.folders.len(),
            sends: vault.sends.len(),
            organizations: ring.organization_keys().map(|(id, _)| id.to_string()).collect(),
        }
    }
}

/// A fully built rotation, ready to submit.
pub struct RotationBatch {
    request: RotationRequest,
    keys: RotatedKeys,
    expected: Coverage,
}

impl RotationBatch {
    /// The part that goes to the server.
    pub fn request(&self) -> RotationRequest {
        self.request.clone()
    }

    /// Split into the submitted request and the keys to install.
    pub fn into_parts(self) -> (RotationRequest, RotatedKeys) {
        (self.request, self.keys)
    }

    /// Check that the batch is complete and self-consistent.
    ///
    /// - every personal cipher, folder and owned Send is present;
    /// - no organization cipher slipped in;
    /// - every encrypted member is well formed;
    /// - the wrapped data key opens under the new master key and the
    ///   private key opens under the new data key.
    pub fn validate(&self) -> Result<()> {
        let req = &self.request;

        if req.ciphers.len() != self.expected.cipher_count {
            return Err(VaultCryptError::RotationIncomplete(format!(
                "{} of {} personal ciphers re-encrypted",
                req.ciphers.len(),
                self.expected.cipher_count
            )));
        }
        if let Some(org) = req.ciphers.iter().find(|c| c.is_organization_owned()) {
            return Err(VaultCryptError::RotationIncomplete(format!(
                "organization cipher {:?} must not be rotated",
                org.id
            )));
        }
        let cipher_ids: BTreeSet<String> = req.ciphers.iter().filter_map(|c| c.id.clone()).collect();
        if cipher_ids != self.expected.ciphers {
            return Err(VaultCryptError::RotationIncomplete(
                "cipher ids do not match the vault".into(),
            ));
        }

        if req.folders.len() != self.expected.folder_count {
            return Err(VaultCryptError::RotationIncomplete(format!(
                "{} of {} folders re-encrypted",
                req.folders.len(),
                self.expected.folder_count
            )));
        }
        let folder_ids: BTreeSet<String> = req.folders.iter().filter_map(|f| f.id.clone()).collect();
        if folder_ids != self.expected.folders {
            return Err(VaultCryptError::RotationIncomplete(
                "folder ids do not match the vault".into(),
            ));
        }

        if req.sends.len() != self.expected.sends {
            return Err(VaultCryptError::RotationIncomplete(format!(
                "{} of {} sends re-wrapped",
                req.sends.len(),
                self.expected.sends
            )));
        }

        let org_ids: BTreeSet<String> = req.organization_keys.keys().cloned().collect();
        if org_ids != self.expected.organizations {
            return Err(VaultCryptError::RotationIncomplete(
                "organization keys do not match the session".into(),
            ));
        }

        if let Some(cipher) = req.ciphers.iter().find(|c| !c.is_well_formed()) {
            return Err(VaultCryptError::RotationIncomplete(format!(
                "cipher {:?} carries a malformed field",
                cipher.id
            )));
        }
        if let Some(folder) = req.folders.iter().find(|f| !f.is_well_formed()) {
            return Err(VaultCryptError::RotationIncomplete(format!(
                "folder {:?} carries a malformed field",
                folder.id
            )));
        }

        let stretched = stretch_master_key(&self.keys.master_key)?;
        let data_key = crypto::unwrap_key(&req.wrapped_data_key, &stretched).map_err(|_| {
            VaultCryptError::RotationIncomplete("wrapped data key does not open".into())
        })?;
        if data_key != self.keys.data_key {
            return Err(VaultCryptError::RotationIncomplete(
                "wrapped data key does not match the new data key".into(),
            ));
        }
        let private_key = req.key_pair.unwrap_private_key(&data_key).map_err(|_| {
            VaultCryptError::RotationIncomplete("wrapped private key does not open".into())
        })?;
        if private_key.public_key_bytes() != req.key_pair.public_key {
            return Err(VaultCryptError::RotationIncomplete(
                "private key does not match the public key".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for RotationBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationBatch")
            .field("ciphers", &self.request.ciphers.len())
            .field("folders", &self.request.folders.len())
            .field("sends", &self.request.sends.len())
            .field("organizations", &self.request.organization_keys.len())
            .finish_non_exhaustive()
    }
}

/// Builds rotation batches from an unlocked key ring.
pub struct RotationPlanner {
    old_ring: KeyRing,
}

impl RotationPlanner {
    pub fn new(old_ring: KeyRing) -> Self {
        Self { old_ring }
    }

    /// Refuse up front if any personal item cannot be rotated.
    ///
    /// Attachments without their own key are encrypted directly under the
    /// data key; replacing that key would orphan the stored file bytes.
    pub fn check_preconditions(vault: &VaultSnapshot) -> Result<()> {
        let legacy = vault
            .personal_ciphers()
            .filter(|c| c.has_legacy_attachments())
            .count();
        if legacy > 0 {
            warn!(ciphers = legacy, "rotation refused: legacy attachments");
            return Err(VaultCryptError::LegacyAttachments(legacy));
        }
        Ok(())
    }

    /// Build a batch that moves `vault` from the old data key to a new one.
    ///
    /// `new_master_key` is the unstretched master key for `new_password`.
    /// Any personal item that does not decrypt under the old key fails the
    /// whole plan.
    pub fn plan(
        &self,
        new_password: &str,
        new_master_key: SymmetricKey,
        vault: &VaultSnapshot,
    ) -> Result<RotationBatch> {
        Self::check_preconditions(vault)?;
        let old_key = self
            .old_ring
            .data_key()
            .ok_or_else(|| VaultCryptError::KeyUnavailable("account data key (locked)".into()))?;

        let stretched = stretch_master_key(&new_master_key)?;
        let data_key = crypto::generate_data_key();
        let wrapped_data_key = crypto::wrap_key(&data_key, &stretched)?;
        let (key_pair, private_key) = crypto::generate_key_pair(&data_key)?;
        let server_verifier = kdf::derive_server_verifier(new_password.as_bytes(), &new_master_key);
        let local_verifier =
            kdf::derive_verifier(new_password.as_bytes(), &new_master_key, VerifierPurpose::Local);
        debug!("rotation keys generated");

        let expected = Coverage::of(vault, &self.old_ring);
        let mut ciphers = Vec::new();
        for cipher in vault.personal_ciphers() {
            let rotated = cipher.reencrypt(old_key, &data_key).map_err(|e| {
                VaultCryptError::RotationIncomplete(format!("cipher {:?}: {e}", cipher.id))
            })?;
            ciphers.push(rotated);
        }

        let mut folders = Vec::with_capacity(vault.folders.len());
        for folder in &vault.folders {
            let rotated = folder.reencrypt(old_key, &data_key).map_err(|e| {
                VaultCryptError::RotationIncomplete(format!("folder {:?}: {e}", folder.id))
            })?;
            folders.push(rotated);
        }

        let mut sends = Vec::with_capacity(vault.sends.len());
        for send in &vault.sends {
            let rotated = send.rewrap_key(old_key, &data_key).map_err(|e| {
                VaultCryptError::RotationIncomplete(format!("send {:?}: {e}", send.id))
            })?;
            sends.push(rotated);
        }

        let organization_keys = self
            .old_ring
            .organization_keys()
            .map(|(id, key)| {
                wrap_organization_key(key, &key_pair.public_key).map(|field| (id.to_string(), field))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        info!(
            ciphers = ciphers.len(),
            skipped_organization_ciphers = vault.ciphers.len() - ciphers.len(),
            folders = folders.len(),
            sends = sends.len(),
            organizations = organization_keys.len(),
            "rotation batch built"
        );

        Ok(RotationBatch {
            request: RotationRequest {
                server_verifier,
                wrapped_data_key,
                key_pair,
                organization_keys,
                ciphers,
                folders,
                sends,
            },
            keys: RotatedKeys {
                master_key: new_master_key,
                local_verifier,
                data_key,
                private_key,
            },
            expected,
        })
    }
}
