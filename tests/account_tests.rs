//! Integration tests for the account key hierarchy service.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use vaultcrypt::account::{KeyHierarchyService, MemoryStorage, SecureStorage, StorageKey};
use vaultcrypt::crypto::{generate_data_key, wrap_organization_key, EncryptedField, KdfConfig};
use vaultcrypt::errors::VaultCryptError;

const EMAIL: &str = "owner@example.com";
const PASSWORD: &str = "correct horse battery staple";

/// Cheapest KDF the service accepts, so the tests stay fast.
fn fast_kdf() -> KdfConfig {
    KdfConfig::pbkdf2(5_000)
}

async fn registered() -> (KeyHierarchyService, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let service = KeyHierarchyService::new(storage.clone());
    service.set_account(EMAIL, fast_kdf()).await.expect("set_account");
    service.register(PASSWORD).await.expect("register");
    (service, storage)
}

fn service_public_key(storage: &MemoryStorage) -> Vec<u8> {
    let encoded = storage.get(StorageKey::PublicKey).unwrap().unwrap();
    BASE64.decode(encoded).unwrap()
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_leaves_the_session_unlocked() {
    let (service, storage) = registered().await;
    assert!(service.is_unlocked().await);
    assert!(service.key_ring().await.data_key().is_some());

    for slot in [
        StorageKey::Email,
        StorageKey::KdfConfig,
        StorageKey::LocalVerifier,
        StorageKey::WrappedDataKey,
        StorageKey::PublicKey,
        StorageKey::WrappedPrivateKey,
    ] {
        assert!(storage.get(slot).unwrap().is_some(), "{slot:?} not stored");
    }
}

#[tokio::test]
async fn lock_then_unlock_recovers_the_same_data_key() {
    let (service, _) = registered().await;
    let before = service.data_key().await.unwrap();

    service.lock().await.unwrap();
    assert!(!service.is_unlocked().await);
    assert!(matches!(
        service.data_key().await,
        Err(VaultCryptError::KeyUnavailable(_))
    ));

    service.unlock(PASSWORD).await.unwrap();
    assert_eq!(service.data_key().await.unwrap(), before);
}

#[tokio::test]
async fn wrong_password_is_rejected_and_changes_nothing() {
    let (service, _) = registered().await;
    service.lock().await.unwrap();

    let result = service.unlock("not the password").await;
    assert!(matches!(result, Err(VaultCryptError::InvalidPassword)));
    assert!(!service.is_unlocked().await);

    service.unlock(PASSWORD).await.unwrap();
    assert!(service.is_unlocked().await);
}

#[tokio::test]
async fn a_fresh_process_unlocks_from_storage() {
    let (service, storage) = registered().await;
    let data_key = service.data_key().await.unwrap();
    drop(service);

    let restarted = KeyHierarchyService::new(storage);
    restarted.unlock(PASSWORD).await.unwrap();
    assert_eq!(restarted.data_key().await.unwrap(), data_key);
}

#[tokio::test]
async fn logout_clears_memory_and_storage() {
    let (service, storage) = registered().await;
    service.logout().await.unwrap();

    assert!(!service.is_unlocked().await);
    assert!(storage.is_empty());
    assert!(matches!(
        service.unlock(PASSWORD).await,
        Err(VaultCryptError::AccountNotConfigured)
    ));
}

#[tokio::test]
async fn unconfigured_account_cannot_derive() {
    let service = KeyHierarchyService::new(Arc::new(MemoryStorage::new()));
    assert!(matches!(
        service.derive_master_key(PASSWORD).await,
        Err(VaultCryptError::AccountNotConfigured)
    ));
}

#[tokio::test]
async fn server_verifier_is_stable_for_the_same_password() {
    let (service, _) = registered().await;
    let a = service.server_verifier(PASSWORD).await.unwrap();
    let b = service.server_verifier(PASSWORD).await.unwrap();
    let c = service.server_verifier("other").await.unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
}

// ---------------------------------------------------------------------------
// Organization keys
// ---------------------------------------------------------------------------

#[tokio::test]
async fn organization_keys_open_now_and_after_unlock() {
    let storage = Arc::new(MemoryStorage::new());
    let service = KeyHierarchyService::new(storage.clone());
    service.set_account(EMAIL, fast_kdf()).await.unwrap();
    let registration = service.register(PASSWORD).await.unwrap();

    let org_key = generate_data_key();
    let sealed = wrap_organization_key(&org_key, &registration.key_pair.public_key).unwrap();
    service
        .set_organization_keys(HashMap::from([("org-1".to_string(), sealed)]))
        .await
        .unwrap();

    assert_eq!(service.current_organization_key("org-1").await.unwrap(), org_key);
    assert!(matches!(
        service.current_organization_key("org-2").await,
        Err(VaultCryptError::KeyUnavailable(_))
    ));

    service.lock().await.unwrap();
    assert!(service.current_organization_key("org-1").await.is_err());

    service.unlock(PASSWORD).await.unwrap();
    assert_eq!(service.current_organization_key("org-1").await.unwrap(), org_key);
    assert_eq!(service.key_ring().await.organization_count(), 1);
}

#[tokio::test]
async fn rejected_organization_keys_leave_storage_and_unlock_alone() {
    let (service, storage) = registered().await;
    let good = wrap_organization_key(
        &generate_data_key(),
        &service_public_key(&storage),
    )
    .unwrap();
    service
        .set_organization_keys(HashMap::from([("org-1".to_string(), good)]))
        .await
        .unwrap();
    let stored = storage.get(StorageKey::WrappedOrganizationKeys).unwrap();

    let bad = || {
        HashMap::from([(
            "org-x".to_string(),
            EncryptedField::from_wire("3.AAAA"),
        )])
    };

    // Unlocked: the key fails to open.
    assert!(service.set_organization_keys(bad()).await.is_err());
    assert_eq!(storage.get(StorageKey::WrappedOrganizationKeys).unwrap(), stored);
    assert!(service.current_organization_key("org-1").await.is_ok());

    // Locked: the shape check alone rejects it.
    service.lock().await.unwrap();
    assert!(matches!(
        service.set_organization_keys(bad()).await,
        Err(VaultCryptError::MalformedField(_))
    ));
    assert_eq!(storage.get(StorageKey::WrappedOrganizationKeys).unwrap(), stored);

    service.unlock(PASSWORD).await.unwrap();
    assert!(service.current_organization_key("org-1").await.is_ok());
    assert!(service.current_organization_key("org-x").await.is_err());
}

#[tokio::test]
async fn memory_only_clear_keeps_wrapped_copies() {
    let (service, storage) = registered().await;

    service.clear_data_key(true).await.unwrap();
    assert!(!service.is_unlocked().await);
    assert!(storage.get(StorageKey::WrappedDataKey).unwrap().is_some());

    service.clear_data_key(false).await.unwrap();
    assert!(storage.get(StorageKey::WrappedDataKey).unwrap().is_none());

    service.clear_key_pair(false).await.unwrap();
    assert!(storage.get(StorageKey::WrappedPrivateKey).unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Password change
// ---------------------------------------------------------------------------

#[tokio::test]
async fn change_password_keeps_the_data_key() {
    let (service, _) = registered().await;
    let data_key = service.data_key().await.unwrap();

    let change = service.change_password(PASSWORD, "a brand new password").await.unwrap();
    assert!(change.wrapped_data_key.is_valid());

    service.lock().await.unwrap();
    assert!(matches!(
        service.unlock(PASSWORD).await,
        Err(VaultCryptError::InvalidPassword)
    ));
    service.unlock("a brand new password").await.unwrap();
    assert_eq!(service.data_key().await.unwrap(), data_key);
}

#[tokio::test]
async fn change_password_requires_the_current_password() {
    let (service, _) = registered().await;
    assert!(matches!(
        service.change_password("wrong", "new").await,
        Err(VaultCryptError::InvalidPassword)
    ));
}

#[tokio::test]
async fn concurrent_readers_never_see_a_partial_unlock() {
    let (service, _) = registered().await;
    service.lock().await.unwrap();

    let reader = {
        let service = service.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                let ring = service.key_ring().await;
                // Either fully locked or fully unlocked.
                if ring.data_key().is_none() {
                    assert_eq!(ring.organization_count(), 0);
                }
                tokio::task::yield_now().await;
            }
        })
    };

    service.unlock(PASSWORD).await.unwrap();
    reader.await.unwrap();
    assert!(service.is_unlocked().await);
}
