//! Hash-chain primitives
//!
//! Every ledger entry carries an HMAC-SHA256 signature binding its payload
//! hash to its timestamp and position, plus the signature of the entry
//! before it. Given the signing secret, the whole chain can be re-derived
//! from stored fields and compared.
//!
//! Key types:
//! - `SigningSecret`: HMAC key material, redacted in debug output
//! - `KeyProvider`: where the ledger obtains its secret
//! - `ChainWalker`: incremental verifier for entries read in sequence order

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::{AnchorError, Result};
use crate::types::{ChainIntegrityReport, LedgerEntry, PayloadHash};

type HmacSha256 = Hmac<Sha256>;

/// `previous_signature` of the first entry
pub const GENESIS_SIGNATURE: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Minimum accepted secret length in bytes
pub const MIN_SECRET_LEN: usize = 16;

/// HMAC key material for entry signatures
///
/// Holds a keyed HMAC state rather than the raw bytes; each signature
/// starts from a clone of it.
#[derive(Clone)]
pub struct SigningSecret {
    mac: HmacSha256,
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SigningSecret").field(&"[redacted]").finish()
    }
}

impl SigningSecret {
    /// Wrap raw key bytes, rejecting keys shorter than `MIN_SECRET_LEN`
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() < MIN_SECRET_LEN {
            return Err(AnchorError::MissingField(format!(
                "signing secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        let mac = HmacSha256::new_from_slice(&bytes)
            .map_err(|e| AnchorError::MissingField(format!("unusable signing secret: {}", e)))?;
        Ok(Self { mac })
    }
}

/// Source of the ledger signing secret
///
/// Injected into the ledger at construction so the chain functions never
/// read ambient configuration.
pub trait KeyProvider: Send + Sync {
    fn signing_secret(&self) -> &SigningSecret;
}

/// Key provider holding a fixed secret
#[derive(Debug, Clone)]
pub struct StaticKeyProvider {
    secret: SigningSecret,
}

impl StaticKeyProvider {
    pub fn new(secret: SigningSecret) -> Self {
        Self { secret }
    }
}

impl KeyProvider for StaticKeyProvider {
    fn signing_secret(&self) -> &SigningSecret {
        &self.secret
    }
}

/// The genesis constant, 64 zero characters
pub fn genesis_signature() -> &'static str {
    GENESIS_SIGNATURE
}

/// Compute an entry signature
///
/// Message layout: the 64 lowercase hex characters of the payload hash,
/// then `created_at` as 8 big-endian bytes, then `sequence_number` as 8
/// big-endian bytes. Fixed widths keep the encoding unambiguous.
pub fn compute_signature(
    payload_hash: &PayloadHash,
    created_at: i64,
    sequence_number: u64,
    secret: &SigningSecret,
) -> String {
    let mut mac = secret.mac.clone();
    mac.update(payload_hash.as_str().as_bytes());
    mac.update(&created_at.to_be_bytes());
    mac.update(&sequence_number.to_be_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time equality over two hex strings
pub fn hex_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Recompute an entry's signature and compare with the stored one
pub fn entry_signature_valid(entry: &LedgerEntry, secret: &SigningSecret) -> bool {
    let expected = compute_signature(
        &entry.payload_hash,
        entry.created_at,
        entry.sequence_number,
        secret,
    );
    hex_eq(&expected, &entry.signature)
}

/// Incremental chain verifier
///
/// Feed entries in sequence order; the walker remembers the first entry
/// that fails a check and ignores everything after it.
#[derive(Debug, Clone)]
pub struct ChainWalker<'a> {
    secret: &'a SigningSecret,
    expected_sequence: u64,
    previous_signature: String,
    checked: u64,
    first_broken: Option<u64>,
}

impl<'a> ChainWalker<'a> {
    pub fn new(secret: &'a SigningSecret) -> Self {
        Self {
            secret,
            expected_sequence: 1,
            previous_signature: GENESIS_SIGNATURE.to_string(),
            checked: 0,
            first_broken: None,
        }
    }

    /// Check one entry. Returns false once the chain is known to be broken.
    pub fn push(&mut self, entry: &LedgerEntry) -> bool {
        if self.first_broken.is_some() {
            return false;
        }

        self.checked += 1;

        let position_ok = entry.sequence_number == self.expected_sequence;
        let link_ok = hex_eq(&entry.previous_signature, &self.previous_signature);
        let signature_ok = entry_signature_valid(entry, self.secret);

        if !(position_ok && link_ok && signature_ok) {
            warn!(
                sequence = entry.sequence_number,
                expected_sequence = self.expected_sequence,
                position_ok,
                link_ok,
                signature_ok,
                "SECURITY: Ledger chain broken"
            );
            self.first_broken = Some(self.expected_sequence.min(entry.sequence_number));
            return false;
        }

        self.expected_sequence += 1;
        self.previous_signature = entry.signature.clone();
        true
    }

    pub fn finish(self) -> ChainIntegrityReport {
        ChainIntegrityReport {
            valid: self.first_broken.is_none(),
            first_broken_sequence: self.first_broken,
            entries_checked: self.checked,
        }
    }
}

/// Verify a complete chain held in memory
pub fn verify_chain<'e>(
    entries: impl IntoIterator<Item = &'e LedgerEntry>,
    secret: &SigningSecret,
) -> ChainIntegrityReport {
    let mut walker = ChainWalker::new(secret);
    for entry in entries {
        if !walker.push(entry) {
            break;
        }
    }
    walker.finish()
}
