//! Property and shape tests for the encrypted-field wire codec.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use proptest::prelude::*;

use vaultcrypt::crypto::{encrypt_field, AlgorithmTag, EncryptedField, FieldDefect, SymmetricKey};
use vaultcrypt::errors::VaultCryptError;

fn algorithm() -> impl Strategy<Value = AlgorithmTag> {
    prop_oneof![
        Just(AlgorithmTag::AesCbc256B64),
        Just(AlgorithmTag::AesCbc256HmacSha256B64),
        Just(AlgorithmTag::X25519SealedBoxB64),
    ]
}

fn field() -> impl Strategy<Value = EncryptedField> {
    (
        algorithm(),
        prop::collection::vec(any::<u8>(), 16),
        prop::collection::vec(any::<u8>(), 1..96),
        prop::collection::vec(any::<u8>(), 32),
    )
        .prop_map(|(alg, iv, data, mac)| {
            EncryptedField::new(
                alg,
                alg.has_iv().then_some(iv),
                data,
                alg.has_mac().then_some(mac),
            )
        })
}

proptest! {
    #[test]
    fn parse_inverts_serialize(f in field()) {
        let parsed = EncryptedField::parse(&f.to_wire()).unwrap();
        prop_assert_eq!(&parsed, &f);
        prop_assert_eq!(parsed.to_wire(), f.to_wire());
    }

    #[test]
    fn lenient_parse_never_panics(text in ".{0,64}") {
        let field = EncryptedField::from_wire(text.clone());
        prop_assert_eq!(field.as_str(), text.as_str());
        prop_assert_eq!(field.is_valid(), EncryptedField::parse(&text).is_ok());
    }

    #[test]
    fn untagged_form_reads_like_the_inferred_tag(
        iv in prop::collection::vec(any::<u8>(), 16),
        data in prop::collection::vec(any::<u8>(), 1..64),
        mac in prop::collection::vec(any::<u8>(), 32),
    ) {
        let legacy = format!("{}|{}|{}", BASE64.encode(&iv), BASE64.encode(&data), BASE64.encode(&mac));
        let tagged = format!("2.{legacy}");

        let a = EncryptedField::parse(&legacy).unwrap();
        let b = EncryptedField::parse(&tagged).unwrap();
        prop_assert_eq!(a.algorithm(), Some(AlgorithmTag::AesCbc256HmacSha256B64));
        prop_assert_eq!(a.parts().unwrap(), b.parts().unwrap());
        // Untagged text is preserved as-is for write-back.
        prop_assert_eq!(a.to_wire(), legacy);
    }
}

#[test]
fn real_ciphertext_round_trips_through_text() {
    let key = SymmetricKey::generate();
    let field = encrypt_field(&key, b"wire me").unwrap();
    let reparsed: EncryptedField = field.to_wire().parse().unwrap();
    assert_eq!(reparsed.decrypt_to_string(&key).unwrap(), "wire me");
}

#[test]
fn shape_violations_are_rejected_per_algorithm() {
    let iv = BASE64.encode([0u8; 16]);
    let ct = BASE64.encode([1u8; 16]);
    let mac = BASE64.encode([2u8; 32]);

    let cases = [
        format!("2.{iv}|{ct}"),
        format!("0.{iv}|{ct}|{mac}"),
        format!("3.{iv}|{ct}"),
        format!("2.{iv}|{ct}|{mac}|{mac}"),
        format!("2.{iv}||{mac}"),
        format!("2.{iv}|not*base64|{mac}"),
        ct.clone(),
        String::new(),
    ];
    for wire in &cases {
        assert!(
            matches!(EncryptedField::parse(wire), Err(VaultCryptError::MalformedField(_))),
            "{wire:?} should be malformed"
        );
        let lenient = EncryptedField::from_wire(wire.as_str());
        assert!(matches!(lenient.defect(), Some(FieldDefect::Malformed(_))));
    }
}

#[test]
fn reserved_and_unknown_tags_are_unsupported() {
    for tag in [1u8, 4, 200] {
        let wire = format!("{tag}.AAAA|AAAA");
        assert!(matches!(
            EncryptedField::parse(&wire),
            Err(VaultCryptError::UnsupportedAlgorithm(t)) if t == tag
        ));
    }
    // Too large for a u8, so not a tag at all.
    assert!(matches!(
        EncryptedField::parse("300.AAAA|AAAA"),
        Err(VaultCryptError::MalformedField(_))
    ));
}

#[test]
fn defective_field_refuses_to_decrypt_but_keeps_its_text() {
    let key = SymmetricKey::generate();
    let field = EncryptedField::from_wire("9.garbage");
    assert_eq!(field.to_wire(), "9.garbage");
    assert!(matches!(
        field.decrypt(&key),
        Err(VaultCryptError::UnsupportedAlgorithm(9))
    ));
}

#[test]
fn serde_reads_defective_text_without_failing_the_record() {
    #[derive(serde::Deserialize)]
    struct Record {
        name: EncryptedField,
    }
    let record: Record = serde_json::from_str(r#"{"name":"2.only-one-segment"}"#).unwrap();
    assert!(!record.name.is_valid());
}
