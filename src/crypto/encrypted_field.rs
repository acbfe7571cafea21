//! Text encoding of a single encrypted field.
//!
//! Every ciphertext-bearing property travels as one delimited string:
//!
//! ```text
//! <tag>.<iv_b64>|<ciphertext_b64>|<mac_b64>     tag 2 (AES-CBC-256 + HMAC-SHA256)
//! <tag>.<iv_b64>|<ciphertext_b64>               tag 0 (AES-CBC-256)
//! <tag>.<ciphertext_b64>                        tag 3 (X25519 sealed box)
//! ```
//!
//! Older clients wrote the same payload without the `<tag>.` prefix.  An
//! untagged string with three segments is read as tag 2 and one with two
//! segments as tag 0.
//!
//! Parsing never panics.  A string that does not match the shape of its
//! algorithm still produces an `EncryptedField`, but one that reports
//! itself as defective and refuses to decrypt.  The original text is kept
//! so a defective field can be written back to storage untouched.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{Result, VaultCryptError};

/// Separator between the algorithm tag and the payload.
const TAG_SEPARATOR: char = '.';

/// Separator between payload segments.
const SEGMENT_SEPARATOR: char = '|';

// ---------------------------------------------------------------------------
// AlgorithmTag
// ---------------------------------------------------------------------------

/// Numbered, versioned encryption scheme carried in front of every field.
///
/// Tag `1` is reserved for a retired scheme and is never produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AlgorithmTag {
    /// AES-256-CBC, PKCS#7, no authentication tag.
    AesCbc256B64 = 0,
    /// AES-256-CBC, PKCS#7, HMAC-SHA256 over `iv || ciphertext`.
    AesCbc256HmacSha256B64 = 2,
    /// X25519 + XSalsa20-Poly1305 sealed to a recipient public key.
    X25519SealedBoxB64 = 3,
}

impl AlgorithmTag {
    /// Numeric wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// How many `|`-separated segments a field of this algorithm has.
    pub fn segment_count(self) -> usize {
        match self {
            Self::AesCbc256B64 => 2,
            Self::AesCbc256HmacSha256B64 => 3,
            Self::X25519SealedBoxB64 => 1,
        }
    }

    pub fn has_iv(self) -> bool {
        !self.is_asymmetric()
    }

    pub fn has_mac(self) -> bool {
        matches!(self, Self::AesCbc256HmacSha256B64)
    }

    pub fn is_asymmetric(self) -> bool {
        matches!(self, Self::X25519SealedBoxB64)
    }

    /// Algorithm inferred for an untagged legacy string with `segments` parts.
    fn infer_legacy(segments: usize) -> Option<Self> {
        match segments {
            3 => Some(Self::AesCbc256HmacSha256B64),
            2 => Some(Self::AesCbc256B64),
            _ => None,
        }
    }
}

impl TryFrom<u8> for AlgorithmTag {
    type Error = VaultCryptError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::AesCbc256B64),
            2 => Ok(Self::AesCbc256HmacSha256B64),
            3 => Ok(Self::X25519SealedBoxB64),
            other => Err(VaultCryptError::UnsupportedAlgorithm(other)),
        }
    }
}

impl fmt::Display for AlgorithmTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

// ---------------------------------------------------------------------------
// Parsed parts
// ---------------------------------------------------------------------------

/// The decoded segments of a well-formed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldParts {
    pub algorithm: AlgorithmTag,
    pub iv: Option<Vec<u8>>,
    pub data: Vec<u8>,
    pub mac: Option<Vec<u8>>,
}

/// Why a wire string could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldDefect {
    /// Segment count or encoding does not match any algorithm's shape.
    Malformed(String),
    /// The numeric tag is not known to this build.
    Unsupported(u8),
}

impl FieldDefect {
    fn to_error(&self) -> VaultCryptError {
        match self {
            Self::Malformed(reason) => VaultCryptError::MalformedField(reason.clone()),
            Self::Unsupported(tag) => VaultCryptError::UnsupportedAlgorithm(*tag),
        }
    }
}

// ---------------------------------------------------------------------------
// EncryptedField
// ---------------------------------------------------------------------------

/// One encrypted property: algorithm tag, iv, ciphertext and mac.
///
/// Immutable once built.  Equality compares both the wire text and the
/// decoded parts, so `parse(serialize(f)) == f` for every valid field.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedField {
    encoded: String,
    parts: std::result::Result<FieldParts, FieldDefect>,
}

impl EncryptedField {
    /// Build a field from already-encrypted parts.
    ///
    /// # Panics
    ///
    /// Panics if the populated parts do not match `algorithm`'s shape.
    /// Callers construct parts straight out of an encryption routine, so a
    /// mismatch is a bug in this crate rather than bad input.
    pub fn new(
        algorithm: AlgorithmTag,
        iv: Option<Vec<u8>>,
        data: Vec<u8>,
        mac: Option<Vec<u8>>,
    ) -> Self {
        assert_eq!(
            iv.is_some(),
            algorithm.has_iv(),
            "iv presence does not match algorithm {algorithm}"
        );
        assert_eq!(
            mac.is_some(),
            algorithm.has_mac(),
            "mac presence does not match algorithm {algorithm}"
        );

        let parts = FieldParts {
            algorithm,
            iv,
            data,
            mac,
        };
        Self {
            encoded: encode_parts(&parts),
            parts: Ok(parts),
        }
    }

    /// Strictly parse a wire string.
    ///
    /// Returns `MalformedField` or `UnsupportedAlgorithm` instead of a
    /// defective field.  Use [`EncryptedField::from_wire`] where a bad
    /// value must not stop the surrounding record from loading.
    pub fn parse(text: &str) -> Result<Self> {
        let field = Self::from_wire(text);
        match &field.parts {
            Ok(_) => Ok(field),
            Err(defect) => Err(defect.to_error()),
        }
    }

    /// Leniently parse a wire string.  Never fails.
    pub fn from_wire(text: impl Into<String>) -> Self {
        let encoded = text.into();
        let parts = parse_parts(&encoded);
        Self { encoded, parts }
    }

    /// The exact wire text of this field.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// Serialize to wire text.
    pub fn to_wire(&self) -> String {
        self.encoded.clone()
    }

    /// Decoded parts, or the defect that prevents using them.
    pub fn parts(&self) -> Result<&FieldParts> {
        self.parts.as_ref().map_err(FieldDefect::to_error)
    }

    pub fn is_valid(&self) -> bool {
        self.parts.is_ok()
    }

    pub fn defect(&self) -> Option<&FieldDefect> {
        self.parts.as_ref().err()
    }

    pub fn algorithm(&self) -> Option<AlgorithmTag> {
        self.parts.as_ref().ok().map(|p| p.algorithm)
    }

    pub fn iv(&self) -> Option<&[u8]> {
        self.parts.as_ref().ok().and_then(|p| p.iv.as_deref())
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.parts.as_ref().ok().map(|p| p.data.as_slice())
    }

    pub fn mac(&self) -> Option<&[u8]> {
        self.parts.as_ref().ok().and_then(|p| p.mac.as_deref())
    }
}

impl fmt::Debug for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parts {
            Ok(parts) => f
                .debug_struct("EncryptedField")
                .field("algorithm", &parts.algorithm)
                .field("len", &parts.data.len())
                .finish(),
            Err(defect) => f
                .debug_struct("EncryptedField")
                .field("defect", defect)
                .finish(),
        }
    }
}

impl fmt::Display for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl FromStr for EncryptedField {
    type Err = VaultCryptError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for EncryptedField {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.encoded)
    }
}

impl<'de> Deserialize<'de> for EncryptedField {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_wire(s))
    }
}

// ---------------------------------------------------------------------------
// Codec internals
// ---------------------------------------------------------------------------

fn parse_parts(text: &str) -> std::result::Result<FieldParts, FieldDefect> {
    let first_pipe = text.find(SEGMENT_SEPARATOR).unwrap_or(text.len());

    let (algorithm, body) = match text[..first_pipe].find(TAG_SEPARATOR) {
        Some(dot) => {
            let prefix = &text[..dot];
            let tag: u8 = prefix.parse().map_err(|_| {
                FieldDefect::Malformed(format!("algorithm tag '{prefix}' is not a number"))
            })?;
            let algorithm =
                AlgorithmTag::try_from(tag).map_err(|_| FieldDefect::Unsupported(tag))?;
            (algorithm, &text[dot + 1..])
        }
        None => {
            let segments = text.split(SEGMENT_SEPARATOR).count();
            let algorithm = AlgorithmTag::infer_legacy(segments).ok_or_else(|| {
                FieldDefect::Malformed(format!(
                    "untagged field has {segments} segment(s), expected 2 or 3"
                ))
            })?;
            (algorithm, text)
        }
    };

    let segments: Vec<&str> = body.split(SEGMENT_SEPARATOR).collect();
    if segments.len() != algorithm.segment_count() {
        return Err(FieldDefect::Malformed(format!(
            "algorithm {algorithm} needs {} segment(s), found {}",
            algorithm.segment_count(),
            segments.len()
        )));
    }

    let decode = |name: &str, segment: &str| {
        BASE64
            .decode(segment)
            .map_err(|e| FieldDefect::Malformed(format!("{name} is not valid base64: {e}")))
    };

    let parts = match algorithm {
        AlgorithmTag::X25519SealedBoxB64 => FieldParts {
            algorithm,
            iv: None,
            data: decode("ciphertext", segments[0])?,
            mac: None,
        },
        AlgorithmTag::AesCbc256B64 => FieldParts {
            algorithm,
            iv: Some(decode("iv", segments[0])?),
            data: decode("ciphertext", segments[1])?,
            mac: None,
        },
        AlgorithmTag::AesCbc256HmacSha256B64 => FieldParts {
            algorithm,
            iv: Some(decode("iv", segments[0])?),
            data: decode("ciphertext", segments[1])?,
            mac: Some(decode("mac", segments[2])?),
        },
    };

    if parts.data.is_empty() {
        return Err(FieldDefect::Malformed("ciphertext segment is empty".into()));
    }

    Ok(parts)
}

fn encode_parts(parts: &FieldParts) -> String {
    let mut out = format!("{}{TAG_SEPARATOR}", parts.algorithm.as_u8());
    if let Some(iv) = &parts.iv {
        out.push_str(&BASE64.encode(iv));
        out.push(SEGMENT_SEPARATOR);
    }
    out.push_str(&BASE64.encode(&parts.data));
    if let Some(mac) = &parts.mac {
        out.push(SEGMENT_SEPARATOR);
        out.push_str(&BASE64.encode(mac));
    }
    out
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(bytes: &[u8]) -> String {
        BASE64.encode(bytes)
    }

    #[test]
    fn parses_tagged_mac_field() {
        let text = format!("2.{}|{}|{}", b64(&[1; 16]), b64(&[2; 32]), b64(&[3; 32]));
        let field = EncryptedField::parse(&text).unwrap();

        assert_eq!(field.algorithm(), Some(AlgorithmTag::AesCbc256HmacSha256B64));
        assert_eq!(field.iv(), Some(&[1u8; 16][..]));
        assert_eq!(field.data(), Some(&[2u8; 32][..]));
        assert_eq!(field.mac(), Some(&[3u8; 32][..]));
        assert_eq!(field.as_str(), text);
    }

    #[test]
    fn parses_tagged_asymmetric_field() {
        let text = format!("3.{}", b64(&[9; 72]));
        let field = EncryptedField::parse(&text).unwrap();

        assert_eq!(field.algorithm(), Some(AlgorithmTag::X25519SealedBoxB64));
        assert!(field.iv().is_none());
        assert!(field.mac().is_none());
    }

    #[test]
    fn untagged_three_segments_infers_mac_algorithm() {
        let text = format!("{}|{}|{}", b64(&[1; 16]), b64(&[2; 16]), b64(&[3; 32]));
        let field = EncryptedField::parse(&text).unwrap();
        assert_eq!(field.algorithm(), Some(AlgorithmTag::AesCbc256HmacSha256B64));
        // Legacy text is preserved verbatim.
        assert_eq!(field.to_wire(), text);
    }

    #[test]
    fn untagged_two_segments_infers_plain_cbc() {
        let text = format!("{}|{}", b64(&[1; 16]), b64(&[2; 16]));
        let field = EncryptedField::parse(&text).unwrap();
        assert_eq!(field.algorithm(), Some(AlgorithmTag::AesCbc256B64));
    }

    #[test]
    fn untagged_single_segment_is_malformed() {
        let result = EncryptedField::parse("bm90aGluZw==");
        assert!(matches!(result, Err(VaultCryptError::MalformedField(_))));
    }

    #[test]
    fn tagged_field_with_wrong_segment_count_is_malformed() {
        // Tag 2 with only two segments must not be re-read as tag 0.
        let text = format!("2.{}|{}", b64(&[1; 16]), b64(&[2; 16]));
        let field = EncryptedField::from_wire(text.clone());
        assert!(!field.is_valid());
        assert!(field.algorithm().is_none());
        assert!(field.data().is_none());
        assert!(matches!(
            EncryptedField::parse(&text),
            Err(VaultCryptError::MalformedField(_))
        ));
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        let text = format!("7.{}|{}", b64(&[1; 16]), b64(&[2; 16]));
        assert!(matches!(
            EncryptedField::parse(&text),
            Err(VaultCryptError::UnsupportedAlgorithm(7))
        ));
        assert!(matches!(
            EncryptedField::parse(&format!("1.{}|{}|{}", b64(&[1]), b64(&[2]), b64(&[3]))),
            Err(VaultCryptError::UnsupportedAlgorithm(1))
        ));
    }

    #[test]
    fn non_numeric_tag_is_malformed() {
        let field = EncryptedField::from_wire("x.abc|def");
        assert!(matches!(field.defect(), Some(FieldDefect::Malformed(_))));
    }

    #[test]
    fn bad_base64_is_malformed_not_panic() {
        let field = EncryptedField::from_wire("2.!!!|@@@|###");
        assert!(!field.is_valid());
        assert_eq!(field.as_str(), "2.!!!|@@@|###");
    }

    #[test]
    fn dot_after_first_pipe_is_not_a_tag() {
        // The `.` sits in the second segment, so the string is untagged.
        let field = EncryptedField::from_wire("AAAA|BB.B");
        assert!(!field.is_valid());
    }

    #[test]
    fn new_then_parse_round_trips() {
        let field = EncryptedField::new(
            AlgorithmTag::AesCbc256HmacSha256B64,
            Some(vec![4; 16]),
            vec![5; 48],
            Some(vec![6; 32]),
        );
        let reparsed = EncryptedField::parse(&field.to_wire()).unwrap();
        assert_eq!(reparsed, field);
    }

    #[test]
    #[should_panic(expected = "mac presence")]
    fn new_panics_on_shape_mismatch() {
        let _ = EncryptedField::new(AlgorithmTag::AesCbc256B64, Some(vec![0; 16]), vec![1], Some(vec![2]));
    }

    #[test]
    fn serde_uses_wire_text() {
        let field = EncryptedField::new(AlgorithmTag::X25519SealedBoxB64, None, vec![1, 2, 3], None);
        let json = serde_json::to_string(&field).unwrap();
        assert_eq!(json, format!("\"{}\"", field.as_str()));
        let back: EncryptedField = serde_json::from_str(&json).unwrap();
        assert_eq!(back, field);
    }
}
