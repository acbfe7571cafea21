//! Session-level key hierarchy operations.
//!
//! `KeyHierarchyService` is the only component that turns a password into
//! key material.  It owns the `AccountKeyContext` behind a tokio
//! `RwLock`; every mutation holds the write lock for its whole critical
//! section so a concurrent reader sees either the old or the new keys,
//! never a half-updated slot.  Password derivation runs on the blocking
//! pool so it never stalls the caller's executor.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::context::{AccountKeyContext, KeyRing};
use super::storage::{SecureStorage, StorageKey};
use crate::crypto::asymmetric::check_sealed;
use crate::crypto::kdf::{self, VerifierPurpose};
use crate::crypto::{
    self, stretch_master_key, unwrap_organization_key, AsymmetricKeyPair, EncryptedField,
    KdfConfig, SymmetricKey,
};
use crate::errors::{Result, VaultCryptError};
use crate::rotation::{RotationBatch, RotationPlanner, RotationRequest, VaultSnapshot};

/// Result of a password change that keeps the existing data key.
#[derive(Debug, Clone)]
pub struct PasswordChange {
    pub server_verifier: String,
    pub wrapped_data_key: EncryptedField,
}

/// Material produced for a brand-new account.
#[derive(Debug, Clone)]
pub struct AccountRegistration {
    pub server_verifier: String,
    pub wrapped_data_key: EncryptedField,
    pub key_pair: AsymmetricKeyPair,
}

/// Owns the account key context and the storage of wrapped copies.
#[derive(Clone)]
pub struct KeyHierarchyService {
    context: Arc<RwLock<AccountKeyContext>>,
    storage: Arc<dyn SecureStorage>,
}

impl KeyHierarchyService {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create a service with an empty context.
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self {
            context: Arc::new(RwLock::new(AccountKeyContext::new())),
            storage,
        }
    }

    /// Record which account is signed in and how its master key is derived.
    pub async fn set_account(&self, email: &str, kdf: KdfConfig) -> Result<()> {
        kdf.validate()?;
        let email = kdf::normalize_email(email);

        let mut ctx = self.context.write().await;
        self.storage.set(StorageKey::Email, email.clone())?;
        self.storage
            .set(StorageKey::KdfConfig, serde_json::to_string(&kdf)?)?;

        ctx.email = Some(email);
        ctx.kdf = Some(kdf);
        debug!(algorithm = ?kdf.algorithm, "account configured");
        Ok(())
    }

    /// Install wrapped key material received from the server at login or sync.
    pub async fn set_wrapped_keys(
        &self,
        wrapped_data_key: EncryptedField,
        key_pair: Option<AsymmetricKeyPair>,
    ) -> Result<()> {
        let mut ctx = self.context.write().await;
        self.storage
            .set(StorageKey::WrappedDataKey, wrapped_data_key.to_wire())?;
        if let Some(pair) = &key_pair {
            self.storage
                .set(StorageKey::PublicKey, BASE64.encode(&pair.public_key))?;
            self.storage
                .set(StorageKey::WrappedPrivateKey, pair.wrapped_private_key.to_wire())?;
        }

        ctx.wrapped_data_key = Some(wrapped_data_key);
        if key_pair.is_some() {
            ctx.key_pair = key_pair;
            ctx.private_key = None;
        }
        Ok(())
    }

    /// Install organization keys sealed to this member.
    ///
    /// If the session is unlocked they are opened and cached right away;
    /// otherwise only their shape is checked and they are opened on the
    /// next unlock.  A map with any bad entry is rejected whole and nothing
    /// is stored.
    pub async fn set_organization_keys(
        &self,
        wrapped: HashMap<String, EncryptedField>,
    ) -> Result<()> {
        let mut ctx = self.context.write().await;
        let opened = match &ctx.private_key {
            Some(private) => open_organization_keys(&wrapped, private)?,
            None => {
                for (id, field) in &wrapped {
                    check_sealed(field).map_err(|e| {
                        warn!(org_id = %id, kind = e.kind(), "organization key rejected");
                        e
                    })?;
                }
                HashMap::new()
            }
        };

        self.store_organization_keys(&wrapped)?;
        ctx.wrapped_organization_keys = wrapped;
        ctx.organization_keys = opened;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Derivation
    // ------------------------------------------------------------------

    /// Derive the master key for `password` on the blocking pool.
    pub async fn derive_master_key(&self, password: &str) -> Result<SymmetricKey> {
        let (email, kdf) = self.account_profile().await?;
        derive_off_thread(password, email, kdf).await
    }

    /// Derive the verifier the server expects at login.
    pub async fn server_verifier(&self, password: &str) -> Result<String> {
        let master_key = self.derive_master_key(password).await?;
        Ok(kdf::derive_server_verifier(password.as_bytes(), &master_key))
    }

    /// Create key material for a brand-new account.
    ///
    /// Generates a data key and a keypair, wraps them, and unlocks the
    /// session with them.  The returned material is what the server stores.
    pub async fn register(&self, password: &str) -> Result<AccountRegistration> {
        let master_key = self.derive_master_key(password).await?;
        let stretched = stretch_master_key(&master_key)?;

        let data_key = crypto::generate_data_key();
        let wrapped_data_key = crypto::wrap_key(&data_key, &stretched)?;
        let (key_pair, private_key) = crypto::generate_key_pair(&data_key)?;

        let server_verifier = kdf::derive_server_verifier(password.as_bytes(), &master_key);
        let local_verifier =
            kdf::derive_verifier(password.as_bytes(), &master_key, VerifierPurpose::Local);

        let mut ctx = self.context.write().await;
        self.persist_wrapped(&wrapped_data_key, &key_pair, &local_verifier)?;

        ctx.master_key = Some(master_key);
        ctx.local_verifier = Some(local_verifier);
        ctx.wrapped_data_key = Some(wrapped_data_key.clone());
        ctx.data_key = Some(data_key);
        ctx.key_pair = Some(key_pair.clone());
        ctx.private_key = Some(private_key);
        info!("account keys generated");

        Ok(AccountRegistration {
            server_verifier,
            wrapped_data_key,
            key_pair,
        })
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Unlock the session with the master password.
    ///
    /// Derives the master key, checks it against the local verifier when one
    /// exists, then unwraps the data key, private key and organization keys.
    /// A wrong password fails with `InvalidPassword` and leaves the context
    /// unchanged.
    pub async fn unlock(&self, password: &str) -> Result<()> {
        let (email, kdf) = self.account_profile().await?;
        let master_key = derive_off_thread(password, email, kdf).await?;
        let local_verifier =
            kdf::derive_verifier(password.as_bytes(), &master_key, VerifierPurpose::Local);

        let mut ctx = self.context.write().await;
        self.load_wrapped_from_storage(&mut ctx)?;

        if let Some(stored) = &ctx.local_verifier {
            if !kdf::verifiers_match(stored, &local_verifier) {
                warn!("unlock rejected: local verifier mismatch");
                return Err(VaultCryptError::InvalidPassword);
            }
        }

        let wrapped_data_key = ctx.wrapped_data_key.clone().ok_or_else(|| {
            VaultCryptError::KeyUnavailable("no wrapped data key for this account".into())
        })?;
        let stretched = stretch_master_key(&master_key)?;
        let data_key = crypto::unwrap_key(&wrapped_data_key, &stretched).map_err(|e| {
            warn!(kind = e.kind(), "unlock rejected: data key did not unwrap");
            VaultCryptError::InvalidPassword
        })?;

        let private_key = match &ctx.key_pair {
            Some(pair) => Some(pair.unwrap_private_key(&data_key)?),
            None => None,
        };
        let organization_keys = match &private_key {
            Some(private) => open_organization_keys(&ctx.wrapped_organization_keys, private)?,
            None => HashMap::new(),
        };

        if ctx.local_verifier.is_none() {
            self.storage
                .set(StorageKey::LocalVerifier, local_verifier.clone())?;
        }

        ctx.master_key = Some(master_key);
        ctx.local_verifier = Some(local_verifier);
        ctx.data_key = Some(data_key);
        ctx.private_key = private_key;
        ctx.organization_keys = organization_keys;
        info!(
            organizations = ctx.organization_keys.len(),
            "session unlocked"
        );
        Ok(())
    }

    /// Drop every plaintext key but keep the wrapped copies.
    pub async fn lock(&self) -> Result<()> {
        let mut ctx = self.context.write().await;
        ctx.master_key = None;
        self.clear_data_key_locked(&mut ctx, true)?;
        self.clear_key_pair_locked(&mut ctx, true)?;
        self.clear_organization_keys_locked(&mut ctx, true)?;
        info!("session locked");
        Ok(())
    }

    /// Clear everything, in memory and in storage.
    pub async fn logout(&self) -> Result<()> {
        let mut ctx = self.context.write().await;
        ctx.master_key = None;
        self.clear_data_key_locked(&mut ctx, false)?;
        self.clear_key_pair_locked(&mut ctx, false)?;
        self.clear_organization_keys_locked(&mut ctx, false)?;

        for slot in [StorageKey::Email, StorageKey::KdfConfig, StorageKey::LocalVerifier] {
            self.storage.remove(slot)?;
        }
        *ctx = AccountKeyContext::new();
        info!("session logged out");
        Ok(())
    }

    pub async fn is_unlocked(&self) -> bool {
        self.context.read().await.is_unlocked()
    }

    /// Snapshot of the keys needed to decrypt vault items.
    pub async fn key_ring(&self) -> KeyRing {
        self.context.read().await.key_ring()
    }

    /// The cached key for one organization.
    pub async fn current_organization_key(&self, org_id: &str) -> Result<SymmetricKey> {
        self.context
            .read()
            .await
            .organization_keys
            .get(org_id)
            .cloned()
            .ok_or_else(|| VaultCryptError::KeyUnavailable(format!("organization {org_id}")))
    }

    /// The cached account data key.
    pub async fn data_key(&self) -> Result<SymmetricKey> {
        self.context
            .read()
            .await
            .data_key
            .clone()
            .ok_or_else(|| VaultCryptError::KeyUnavailable("account data key (locked)".into()))
    }

    // ------------------------------------------------------------------
    // Independent scrubbing
    // ------------------------------------------------------------------

    pub async fn clear_master_key(&self) {
        self.context.write().await.master_key = None;
    }

    pub async fn clear_data_key(&self, memory_only: bool) -> Result<()> {
        let mut ctx = self.context.write().await;
        self.clear_data_key_locked(&mut ctx, memory_only)
    }

    pub async fn clear_organization_keys(&self, memory_only: bool) -> Result<()> {
        let mut ctx = self.context.write().await;
        self.clear_organization_keys_locked(&mut ctx, memory_only)
    }

    pub async fn clear_key_pair(&self, memory_only: bool) -> Result<()> {
        let mut ctx = self.context.write().await;
        self.clear_key_pair_locked(&mut ctx, memory_only)
    }

    fn clear_data_key_locked(&self, ctx: &mut AccountKeyContext, memory_only: bool) -> Result<()> {
        ctx.data_key = None;
        if !memory_only {
            ctx.wrapped_data_key = None;
            self.storage.remove(StorageKey::WrappedDataKey)?;
        }
        Ok(())
    }

    fn clear_organization_keys_locked(
        &self,
        ctx: &mut AccountKeyContext,
        memory_only: bool,
    ) -> Result<()> {
        ctx.organization_keys.clear();
        if !memory_only {
            ctx.wrapped_organization_keys.clear();
            self.storage.remove(StorageKey::WrappedOrganizationKeys)?;
        }
        Ok(())
    }

    fn clear_key_pair_locked(&self, ctx: &mut AccountKeyContext, memory_only: bool) -> Result<()> {
        ctx.private_key = None;
        if !memory_only {
            ctx.key_pair = None;
            self.storage.remove(StorageKey::PublicKey)?;
            self.storage.remove(StorageKey::WrappedPrivateKey)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Password change and rotation
    // ------------------------------------------------------------------

    /// Change the master password without touching vault items.
    ///
    /// The existing data key is re-wrapped under the new master key.  The
    /// caller submits the returned verifier and wrapped key to the server.
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<PasswordChange> {
        let (email, kdf) = self.account_profile().await?;
        self.verify_password(current_password).await?;

        let new_master = derive_off_thread(new_password, email, kdf).await?;
        let stretched = stretch_master_key(&new_master)?;

        let mut ctx = self.context.write().await;
        let data_key = ctx
            .data_key
            .clone()
            .ok_or_else(|| VaultCryptError::KeyUnavailable("account data key (locked)".into()))?;
        let wrapped_data_key = crypto::wrap_key(&data_key, &stretched)?;
        let server_verifier = kdf::derive_server_verifier(new_password.as_bytes(), &new_master);
        let local_verifier =
            kdf::derive_verifier(new_password.as_bytes(), &new_master, VerifierPurpose::Local);

        self.storage
            .set(StorageKey::WrappedDataKey, wrapped_data_key.to_wire())?;
        self.storage
            .set(StorageKey::LocalVerifier, local_verifier.clone())?;

        ctx.master_key = Some(new_master);
        ctx.local_verifier = Some(local_verifier);
        ctx.wrapped_data_key = Some(wrapped_data_key.clone());
        info!("master password changed, data key re-wrapped");

        Ok(PasswordChange {
            server_verifier,
            wrapped_data_key,
        })
    }

    /// Build a rotation batch for every personal cipher, folder and Send.
    ///
    /// Nothing in the session changes.  The batch must be submitted as a
    /// whole and then installed with [`KeyHierarchyService::apply_rotation`].
    pub async fn rotate_keys(&self, new_password: &str, vault: &VaultSnapshot) -> Result<RotationBatch> {
        RotationPlanner::check_preconditions(vault)?;

        let (email, kdf) = self.account_profile().await?;
        let old_ring = self.key_ring().await;
        if old_ring.data_key().is_none() {
            return Err(VaultCryptError::KeyUnavailable(
                "account data key (locked)".into(),
            ));
        }

        info!(ciphers = vault.ciphers.len(), "key rotation started");
        let new_master = derive_off_thread(new_password, email, kdf).await?;
        let batch = RotationPlanner::new(old_ring).plan(new_password, new_master, vault)?;
        batch.validate()?;
        Ok(batch)
    }

    /// Build, submit and install a rotation in one call.
    ///
    /// `submit` performs the network round-trip.  If it fails the batch is
    /// discarded and the session keeps its old keys.
    pub async fn rotate_and_submit<F, Fut>(
        &self,
        new_password: &str,
        vault: &VaultSnapshot,
        submit: F,
    ) -> Result<()>
    where
        F: FnOnce(RotationRequest) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let batch = self.rotate_keys(new_password, vault).await?;
        match submit(batch.request()).await {
            Ok(()) => self.apply_rotation(batch).await,
            Err(e) => {
                warn!(kind = e.kind(), "rotation batch rejected, keeping old keys");
                Err(VaultCryptError::RotationRejected(e.to_string()))
            }
        }
    }

    /// Install the keys from an accepted rotation batch.
    ///
    /// Refused if the session was locked or logged out after the batch was
    /// built, so a logout can never be undone by a late install.
    pub async fn apply_rotation(&self, batch: RotationBatch) -> Result<()> {
        batch.validate()?;
        let (request, keys) = batch.into_parts();

        let mut ctx = self.context.write().await;
        if !ctx.is_unlocked() {
            warn!("rotation not applied: session is no longer unlocked");
            return Err(VaultCryptError::KeyUnavailable(
                "account data key (locked)".into(),
            ));
        }
        self.persist_wrapped(
            &request.wrapped_data_key,
            &request.key_pair,
            &keys.local_verifier,
        )?;
        self.store_organization_keys(&request.organization_keys)?;

        ctx.master_key = Some(keys.master_key);
        ctx.local_verifier = Some(keys.local_verifier);
        ctx.wrapped_data_key = Some(request.wrapped_data_key);
        ctx.data_key = Some(keys.data_key);
        ctx.key_pair = Some(request.key_pair);
        ctx.private_key = Some(keys.private_key);
        ctx.wrapped_organization_keys = request.organization_keys;
        info!(
            ciphers = request.ciphers.len(),
            folders = request.folders.len(),
            "key rotation applied"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn account_profile(&self) -> Result<(String, KdfConfig)> {
        {
            let ctx = self.context.read().await;
            if let (Some(email), Some(kdf)) = (&ctx.email, ctx.kdf) {
                return Ok((email.clone(), kdf));
            }
        }

        let email = self
            .storage
            .get(StorageKey::Email)?
            .ok_or(VaultCryptError::AccountNotConfigured)?;
        let kdf_json = self
            .storage
            .get(StorageKey::KdfConfig)?
            .ok_or(VaultCryptError::AccountNotConfigured)?;
        let kdf: KdfConfig = serde_json::from_str(&kdf_json)?;

        let mut ctx = self.context.write().await;
        ctx.email = Some(email.clone());
        ctx.kdf = Some(kdf);
        Ok((email, kdf))
    }

    async fn verify_password(&self, password: &str) -> Result<()> {
        let master = self.derive_master_key(password).await?;
        let candidate = kdf::derive_verifier(password.as_bytes(), &master, VerifierPurpose::Local);
        let ctx = self.context.read().await;
        match &ctx.local_verifier {
            Some(stored) if kdf::verifiers_match(stored, &candidate) => Ok(()),
            Some(_) => Err(VaultCryptError::InvalidPassword),
            None => Err(VaultCryptError::KeyUnavailable(
                "no local verifier, unlock first".into(),
            )),
        }
    }

    fn persist_wrapped(
        &self,
        wrapped_data_key: &EncryptedField,
        key_pair: &AsymmetricKeyPair,
        local_verifier: &str,
    ) -> Result<()> {
        self.storage
            .set(StorageKey::WrappedDataKey, wrapped_data_key.to_wire())?;
        self.storage
            .set(StorageKey::PublicKey, BASE64.encode(&key_pair.public_key))?;
        self.storage
            .set(StorageKey::WrappedPrivateKey, key_pair.wrapped_private_key.to_wire())?;
        self.storage
            .set(StorageKey::LocalVerifier, local_verifier.to_string())?;
        Ok(())
    }

    fn store_organization_keys(&self, wrapped: &HashMap<String, EncryptedField>) -> Result<()> {
        let serialized: HashMap<&str, String> = wrapped
            .iter()
            .map(|(id, field)| (id.as_str(), field.to_wire()))
            .collect();
        self.storage.set(
            StorageKey::WrappedOrganizationKeys,
            serde_json::to_string(&serialized)?,
        )
    }

    /// Refill wrapped slots from storage after a process restart.
    fn load_wrapped_from_storage(&self, ctx: &mut AccountKeyContext) -> Result<()> {
        if ctx.local_verifier.is_none() {
            ctx.local_verifier = self.storage.get(StorageKey::LocalVerifier)?;
        }
        if ctx.wrapped_data_key.is_none() {
            ctx.wrapped_data_key = self
                .storage
                .get(StorageKey::WrappedDataKey)?
                .map(EncryptedField::from_wire);
        }
        if ctx.key_pair.is_none() {
            let public = self.storage.get(StorageKey::PublicKey)?;
            let private = self.storage.get(StorageKey::WrappedPrivateKey)?;
            if let (Some(public), Some(private)) = (public, private) {
                let public_key = BASE64.decode(public).map_err(|e| {
                    VaultCryptError::Storage(format!("stored public key is not base64: {e}"))
                })?;
                ctx.key_pair = Some(AsymmetricKeyPair {
                    public_key,
                    wrapped_private_key: EncryptedField::from_wire(private),
                });
            }
        }
        if ctx.wrapped_organization_keys.is_empty() {
            if let Some(json) = self.storage.get(StorageKey::WrappedOrganizationKeys)? {
                let map: HashMap<String, String> = serde_json::from_str(&json)?;
                ctx.wrapped_organization_keys = map
                    .into_iter()
                    .map(|(id, wire)| (id, EncryptedField::from_wire(wire)))
                    .collect();
            }
        }
        Ok(())
    }
}

fn open_organization_keys(
    wrapped: &HashMap<String, EncryptedField>,
    private_key: &crypto::PrivateKey,
) -> Result<HashMap<String, SymmetricKey>> {
    wrapped
        .iter()
        .map(|(id, field)| {
            let key = unwrap_organization_key(field, private_key).map_err(|e| {
                warn!(org_id = %id, kind = e.kind(), "organization key did not unwrap");
                e
            })?;
            Ok((id.clone(), key))
        })
        .collect()
}

/// Run the KDF on tokio's blocking pool.
async fn derive_off_thread(password: &str, email: String, kdf: KdfConfig) -> Result<SymmetricKey> {
    let password = Zeroizing::new(password.as_bytes().to_vec());
    tokio::task::spawn_blocking(move || kdf::derive_master_key(&password, &email, &kdf))
        .await
        .map_err(|e| VaultCryptError::KeyDerivationFailed(format!("KDF task failed: {e}")))?
}
