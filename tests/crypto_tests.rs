//! Integration tests for the vaultcrypt crypto module.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hkdf::Hkdf;
use sha2::{Digest, Sha256};

use vaultcrypt::crypto::encryption::{aes_cbc_decrypt, aes_cbc_encrypt};
use vaultcrypt::crypto::{
    decrypt_buffer, derive_master_key, derive_server_verifier, encrypt_buffer, encrypt_field,
    generate_data_key, stretch_master_key, unwrap_key, unwrap_organization_key, wrap_key,
    wrap_organization_key, generate_key_pair, AlgorithmTag, KdfConfig, SymmetricKey,
};
use vaultcrypt::errors::VaultCryptError;

fn unhex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

// ---------------------------------------------------------------------------
// AES-256-CBC
// ---------------------------------------------------------------------------

#[test]
fn cbc_first_block_matches_nist_vector() {
    // NIST SP 800-38A, F.2.5 CBC-AES256.Encrypt, block #1.
    let key = unhex("603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4");
    let iv = unhex("000102030405060708090a0b0c0d0e0f");
    let plaintext = unhex("6bc1bee22e409f96e93d7e117393172a");

    let ct = aes_cbc_encrypt(&key, &iv, &plaintext).expect("encrypt");

    // One full block of PKCS#7 padding follows the data block.
    assert_eq!(ct.len(), 32);
    assert_eq!(&ct[..16], unhex("f58c4c04d6e5f1ba779eabfb5f7bfbd6").as_slice());
    assert_eq!(aes_cbc_decrypt(&key, &iv, &ct).expect("decrypt"), plaintext);
}

#[test]
fn encrypting_twice_gives_different_fields() {
    let key = generate_data_key();
    let a = encrypt_field(&key, b"same").unwrap();
    let b = encrypt_field(&key, b"same").unwrap();
    assert_ne!(a.to_wire(), b.to_wire());
    assert_ne!(a.iv(), b.iv());
}

#[test]
fn authenticated_field_rejects_every_single_byte_flip() {
    let key = generate_data_key();
    let field = encrypt_field(&key, b"tamper with me").unwrap();

    let mut data = field.data().unwrap().to_vec();
    for i in 0..data.len() {
        data[i] ^= 0x01;
        let wire = format!(
            "2.{}|{}|{}",
            BASE64.encode(field.iv().unwrap()),
            BASE64.encode(&data),
            BASE64.encode(field.mac().unwrap())
        );
        let tampered = vaultcrypt::crypto::EncryptedField::from_wire(wire);
        assert!(matches!(
            tampered.decrypt(&key),
            Err(VaultCryptError::IntegrityFailure)
        ));
        data[i] ^= 0x01;
    }
}

// ---------------------------------------------------------------------------
// KDF
// ---------------------------------------------------------------------------

#[test]
fn pbkdf2_master_key_is_salted_with_normalized_email() {
    let kdf = KdfConfig::pbkdf2(5_000);
    let key = derive_master_key(b"correct horse", "  User@Example.COM ", &kdf).unwrap();

    let mut expected = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(b"correct horse", b"user@example.com", 5_000, &mut expected);
    assert_eq!(key.as_bytes(), &expected);
    assert_eq!(key.algorithm(), AlgorithmTag::AesCbc256B64);
}

#[test]
fn argon2id_master_key_is_salted_with_email_hash() {
    let kdf = KdfConfig::argon2id(2, 16, 1);
    let key = derive_master_key(b"correct horse", "user@example.com", &kdf).unwrap();

    let salt = Sha256::digest(b"user@example.com");
    let params = Params::new(16 * 1024, 2, 1, Some(32)).unwrap();
    let mut expected = [0u8; 32];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(b"correct horse", &salt, &mut expected)
        .unwrap();
    assert_eq!(key.as_bytes(), &expected);
}

#[test]
fn server_verifier_is_one_round_over_the_master_key() {
    let master = SymmetricKey::from_bytes(&[9u8; 32]).unwrap();
    let verifier = derive_server_verifier(b"pw", &master);

    let mut expected = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(&[9u8; 32], b"pw", 1, &mut expected);
    assert_eq!(verifier, BASE64.encode(expected));
}

#[test]
fn weak_kdf_is_refused_before_any_work() {
    let result = derive_master_key(b"pw", "a@b.c", &KdfConfig::pbkdf2(4_999));
    assert!(matches!(result, Err(VaultCryptError::KeyDerivationFailed(_))));
}

// ---------------------------------------------------------------------------
// Key hierarchy primitives
// ---------------------------------------------------------------------------

#[test]
fn stretched_key_is_hkdf_expand_of_master() {
    let master = SymmetricKey::from_bytes(&[5u8; 32]).unwrap();
    let stretched = stretch_master_key(&master).unwrap();

    let hk = Hkdf::<Sha256>::from_prk(&[5u8; 32]).unwrap();
    let mut enc = [0u8; 32];
    let mut mac = [0u8; 32];
    hk.expand(b"enc", &mut enc).unwrap();
    hk.expand(b"mac", &mut mac).unwrap();

    assert_eq!(stretched.encryption_key(), &enc);
    assert_eq!(stretched.authentication_key(), Some(&mac[..]));
}

#[test]
fn wrapped_data_key_opens_only_under_its_wrapping_key() {
    let stretched = stretch_master_key(&SymmetricKey::from_bytes(&[1u8; 32]).unwrap()).unwrap();
    let data_key = generate_data_key();

    let wrapped = wrap_key(&data_key, &stretched).unwrap();
    assert_eq!(wrapped.algorithm(), Some(AlgorithmTag::AesCbc256HmacSha256B64));
    assert_eq!(unwrap_key(&wrapped, &stretched).unwrap(), data_key);

    let other = generate_data_key();
    assert!(matches!(
        unwrap_key(&wrapped, &other),
        Err(VaultCryptError::IntegrityFailure)
    ));
}

#[test]
fn organization_key_travels_sealed_to_the_member() {
    let data_key = generate_data_key();
    let (pair, private) = generate_key_pair(&data_key).unwrap();
    let org_key = generate_data_key();

    let sealed = wrap_organization_key(&org_key, &pair.public_key).unwrap();
    assert_eq!(sealed.algorithm(), Some(AlgorithmTag::X25519SealedBoxB64));
    assert!(sealed.to_wire().starts_with("3."));

    let reopened = pair.unwrap_private_key(&data_key).unwrap();
    assert_eq!(unwrap_organization_key(&sealed, &reopened).unwrap(), org_key);
    assert_eq!(unwrap_organization_key(&sealed, &private).unwrap(), org_key);
}

#[test]
fn buffer_layout_and_tamper_detection() {
    let key = generate_data_key();
    let mut buffer = encrypt_buffer(&key, b"file contents").unwrap();

    assert_eq!(buffer[0], 2);
    // tag + iv + mac + one padded block
    assert_eq!(buffer.len(), 1 + 16 + 32 + 16);
    assert_eq!(decrypt_buffer(&key, &buffer).unwrap(), b"file contents");

    let last = buffer.len() - 1;
    buffer[last] ^= 0xff;
    assert!(matches!(
        decrypt_buffer(&key, &buffer),
        Err(VaultCryptError::IntegrityFailure)
    ));
}
