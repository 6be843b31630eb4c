//! Ledger data model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{AnchorError, Result};

/// Length of a hex-encoded 256-bit digest
pub const HASH_HEX_LEN: usize = 64;

/// Caller-supplied context attached to an entry. Never interpreted by the ledger.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A validated 256-bit digest in lowercase hex
///
/// Accepts any mix of upper and lower case on input and normalizes to
/// lowercase, so two spellings of the same digest compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PayloadHash(String);

impl PayloadHash {
    /// Validate and normalize a hex digest
    pub fn parse(input: &str) -> Result<Self> {
        if input.len() != HASH_HEX_LEN {
            return Err(AnchorError::MalformedPayloadHash(format!(
                "expected {} hex characters, got {}",
                HASH_HEX_LEN,
                input.len()
            )));
        }
        if !input.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AnchorError::MalformedPayloadHash(
                "digest contains non-hex characters".into(),
            ));
        }
        Ok(Self(input.to_ascii_lowercase()))
    }

    /// Wrap raw digest bytes
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PayloadHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PayloadHash {
    type Err = AnchorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PayloadHash {
    type Error = AnchorError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PayloadHash> for String {
    fn from(hash: PayloadHash) -> Self {
        hash.0
    }
}

/// Kind of event an entry anchors
///
/// The set is open: any upper-snake-case tag that is not one of the
/// well-known kinds parses as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntryType {
    /// Fingerprint of an issued privileged access token
    TokenIssued,
    /// Fingerprint of a revoked privileged access token
    TokenRevoked,
    /// Integrity snapshot of a backup or other content
    Proof,
    /// Application-defined tag
    Other(String),
}

impl EntryType {
    pub fn as_str(&self) -> &str {
        match self {
            EntryType::TokenIssued => "TOKEN_ISSUED",
            EntryType::TokenRevoked => "TOKEN_REVOKED",
            EntryType::Proof => "PROOF",
            EntryType::Other(tag) => tag,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = AnchorError;

    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim().to_ascii_uppercase();
        if tag.is_empty() || tag.len() > 64 {
            return Err(AnchorError::InvalidEntryType(format!(
                "tag must be 1-64 characters, got {}",
                tag.len()
            )));
        }
        if !tag
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
        {
            return Err(AnchorError::InvalidEntryType(format!(
                "'{}' may only contain A-Z, 0-9 and '_'",
                s
            )));
        }
        Ok(match tag.as_str() {
            "TOKEN_ISSUED" => EntryType::TokenIssued,
            "TOKEN_REVOKED" => EntryType::TokenRevoked,
            "PROOF" => EntryType::Proof,
            _ => EntryType::Other(tag),
        })
    }
}

impl TryFrom<String> for EntryType {
    type Error = AnchorError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<EntryType> for String {
    fn from(entry_type: EntryType) -> Self {
        entry_type.as_str().to_string()
    }
}

/// One immutable record in the anchor ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Unique id, never reused
    pub anchor_id: String,

    /// Digest of the anchored subject
    pub payload_hash: PayloadHash,

    /// What kind of event this entry records
    pub entry_type: EntryType,

    /// Milliseconds since epoch, assigned by the ledger
    pub created_at: i64,

    /// Position in the chain, starting at 1
    pub sequence_number: u64,

    /// Signature of the preceding entry, or the genesis constant
    pub previous_signature: String,

    /// HMAC over payload, timestamp and position
    pub signature: String,

    /// Opaque caller context
    #[serde(default)]
    pub metadata: Metadata,
}

impl LedgerEntry {
    /// Look up a metadata value as a string
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// Highest entry of the chain: what the next append links to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTail {
    pub sequence_number: u64,
    pub signature: String,
    pub created_at: i64,
}

impl From<&LedgerEntry> for ChainTail {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            sequence_number: entry.sequence_number,
            signature: entry.signature.clone(),
            created_at: entry.created_at,
        }
    }
}

/// Classification of a verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    #[serde(rename = "VERIFIED-CLEAN")]
    VerifiedClean,
    #[serde(rename = "COMPROMISED")]
    Compromised,
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationStatus::VerifiedClean => f.write_str("VERIFIED-CLEAN"),
            VerificationStatus::Compromised => f.write_str("COMPROMISED"),
        }
    }
}

/// Result of comparing a candidate hash to the latest anchor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub matched: bool,
    pub status: VerificationStatus,
    pub anchored_hash: PayloadHash,
    pub anchored_at: i64,
    pub anchor_id: String,
    pub sequence_number: u64,
}

/// Result of walking the chain and re-deriving every signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainIntegrityReport {
    pub valid: bool,
    pub first_broken_sequence: Option<u64>,
    pub entries_checked: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_hash_normalizes_case() {
        let upper = PayloadHash::parse(&"AB".repeat(32)).unwrap();
        let lower = PayloadHash::parse(&"ab".repeat(32)).unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.as_str(), "ab".repeat(32));
    }

    #[test]
    fn test_payload_hash_rejects_bad_shapes() {
        assert!(PayloadHash::parse("").is_err());
        assert!(PayloadHash::parse(&"a".repeat(63)).is_err());
        assert!(PayloadHash::parse(&"a".repeat(65)).is_err());
        assert!(PayloadHash::parse(&"g".repeat(64)).is_err());
        assert!(PayloadHash::parse(&format!("0x{}", "a".repeat(62))).is_err());
    }

    #[test]
    fn test_payload_hash_deserialize_validates() {
        let ok: std::result::Result<PayloadHash, _> =
            serde_json::from_str(&format!("\"{}\"", "F".repeat(64)));
        assert_eq!(ok.unwrap().as_str(), "f".repeat(64));

        let bad: std::result::Result<PayloadHash, _> = serde_json::from_str("\"not-a-hash\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_entry_type_parsing() {
        assert_eq!("PROOF".parse::<EntryType>().unwrap(), EntryType::Proof);
        assert_eq!("token_issued".parse::<EntryType>().unwrap(), EntryType::TokenIssued);
        assert_eq!(
            "TOKEN_REVOKED".parse::<EntryType>().unwrap(),
            EntryType::TokenRevoked
        );
        assert_eq!(
            "BACKUP_SNAPSHOT".parse::<EntryType>().unwrap(),
            EntryType::Other("BACKUP_SNAPSHOT".into())
        );
        assert!("".parse::<EntryType>().is_err());
        assert!("has space".parse::<EntryType>().is_err());
    }

    #[test]
    fn test_entry_serializes_persisted_shape() {
        let entry = LedgerEntry {
            anchor_id: "a-1".into(),
            payload_hash: PayloadHash::parse(&"a".repeat(64)).unwrap(),
            entry_type: EntryType::Proof,
            created_at: 1_700_000_000_000,
            sequence_number: 1,
            previous_signature: "0".repeat(64),
            signature: "1".repeat(64),
            metadata: Metadata::new(),
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["anchorId"], "a-1");
        assert_eq!(json["entryType"], "PROOF");
        assert_eq!(json["sequenceNumber"], 1);
        assert_eq!(json["previousSignature"], "0".repeat(64));
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&VerificationStatus::VerifiedClean).unwrap(),
            "\"VERIFIED-CLEAN\""
        );
        assert_eq!(VerificationStatus::Compromised.to_string(), "COMPROMISED");
    }
}
