//! Privileged access token primitives
//!
//! A token is a short-lived secret handed to the caller exactly once. The
//! ledger only ever sees its fingerprint: a SHA-256 digest over the token,
//! the subject it was issued to, and its expiry. The fingerprint proves the
//! token existed without letting anyone reading the ledger use it.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::types::PayloadHash;

/// Token lifetime: 15 minutes
pub const TOKEN_TTL_MS: i64 = 15 * 60 * 1000;

/// Prefix that keeps tokens visually distinct from hex digests
pub const TOKEN_PREFIX: &str = "PAT-";

/// Random bytes per token (128 bits)
const TOKEN_ENTROPY_BYTES: usize = 16;

/// An opaque privileged access token
///
/// Debug output is redacted so tokens do not leak into logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessToken").field(&"[redacted]").finish()
    }
}

impl AccessToken {
    /// Generate a fresh token from the OS RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(format!("{}{}", TOKEN_PREFIX, hex::encode_upper(bytes)))
    }

    /// Wrap a token string received from a caller
    pub fn from_string(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Digest used to look a token up without keeping the raw value
    pub fn lookup_key(&self) -> [u8; 32] {
        Sha256::digest(self.0.as_bytes()).into()
    }
}

/// Fingerprint anchored for a token: `SHA256(token ‖ subject ‖ expires_at)`
///
/// `expires_at` is rendered as decimal milliseconds.
pub fn fingerprint(token: &AccessToken, subject_id: &str, expires_at: i64) -> PayloadHash {
    let mut hasher = Sha256::new();
    hasher.update(token.expose().as_bytes());
    hasher.update(subject_id.as_bytes());
    hasher.update(expires_at.to_string().as_bytes());
    PayloadHash::from_digest(hasher.finalize().into())
}

/// Lifecycle state of an issued token
///
/// `Expired` and `Revoked` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenState {
    Active,
    Expired,
    Revoked,
}

impl TokenState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TokenState::Active)
    }
}

/// What the issuer remembers about a token. Never contains the token itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub fingerprint: PayloadHash,
    pub issued_to: String,
    pub scope_id: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub state: TokenState,
    pub anchor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_ref: Option<String>,
}

impl TokenRecord {
    /// State as observed at `now_ms`, folding in time-driven expiry
    pub fn effective_state(&self, now_ms: i64) -> TokenState {
        match self.state {
            TokenState::Active if now_ms > self.expires_at => TokenState::Expired,
            state => state,
        }
    }

    pub fn is_active(&self, now_ms: i64) -> bool {
        self.effective_state(now_ms) == TokenState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(expires_at: i64) -> TokenRecord {
        TokenRecord {
            fingerprint: PayloadHash::parse(&"a".repeat(64)).unwrap(),
            issued_to: "alice".into(),
            scope_id: "backup-vault".into(),
            issued_at: expires_at - TOKEN_TTL_MS,
            expires_at,
            state: TokenState::Active,
            anchor_id: "anchor-1".into(),
            credential_ref: None,
        }
    }

    #[test]
    fn test_generated_token_shape() {
        let token = AccessToken::generate();
        let raw = token.expose();
        assert!(raw.starts_with(TOKEN_PREFIX));
        assert_eq!(raw.len(), TOKEN_PREFIX.len() + 32);
        assert!(PayloadHash::parse(raw).is_err());
    }

    #[test]
    fn test_generated_tokens_differ() {
        assert_ne!(AccessToken::generate(), AccessToken::generate());
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AccessToken::from_string("PAT-SECRET");
        assert!(!format!("{:?}", token).contains("SECRET"));
    }

    #[test]
    fn test_fingerprint_binds_subject_and_expiry() {
        let token = AccessToken::from_string("PAT-00112233445566778899AABBCCDDEEFF");
        let base = fingerprint(&token, "alice", 1_700_000_900_000);
        assert_ne!(base, fingerprint(&token, "bob", 1_700_000_900_000));
        assert_ne!(base, fingerprint(&token, "alice", 1_700_000_900_001));
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let rec = record(10_000);
        assert!(rec.is_active(10_000));
        assert!(!rec.is_active(10_001));
        assert_eq!(rec.effective_state(10_001), TokenState::Expired);
    }

    #[test]
    fn test_revoked_stays_revoked() {
        let mut rec = record(10_000);
        rec.state = TokenState::Revoked;
        assert_eq!(rec.effective_state(0), TokenState::Revoked);
        assert_eq!(rec.effective_state(20_000), TokenState::Revoked);
        assert!(rec.state.is_terminal());
    }
}
