//! Privileged access token issuance
//!
//! Issues short-lived tokens bound to a `TOKEN_ISSUED` ledger entry and
//! tracks their lifecycle:
//!
//! ```text
//! Active ──(now > expires_at)──▶ Expired
//!    └────────(revoke)────────▶ Revoked
//! ```
//!
//! Both end states are terminal. Expiry is derived from `expires_at` and the
//! clock on every check, so nothing depends on a timer firing; `sweep` only
//! tidies the in-memory records.
//!
//! Revocation policy: a token gets at most one `TOKEN_REVOKED` entry of its
//! own. Before appending, the ledger is searched for an existing revoke of
//! the same fingerprint that names the token's `TOKEN_ISSUED` anchor, so an
//! abandoned revoke that already reached the ledger is not anchored twice.

pub mod collaborators;
pub mod rate;

pub use collaborators::{CredentialProvisioner, LocalProvisioner, MfaVerifier, StaticMfaDirectory};
pub use rate::IssuanceLimiter;

use anchor_core::{
    fingerprint, AccessToken, AnchorError, Clock, EntryType, Metadata, PayloadHash, Result,
    TokenRecord, TokenState, TOKEN_TTL_MS,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::ledger::AnchorLedger;

/// Issuance limits and record retention
#[derive(Debug, Clone)]
pub struct IssuerPolicy {
    /// Issuances allowed per subject inside `issuance_window`
    pub max_issuances: u32,
    pub issuance_window: Duration,
    /// How long terminal records are kept after expiry
    pub record_retention: Duration,
}

impl Default for IssuerPolicy {
    fn default() -> Self {
        Self {
            max_issuances: 10,
            issuance_window: Duration::from_secs(3600),
            record_retention: Duration::from_secs(24 * 3600),
        }
    }
}

/// A rate-limit slot held while an issuance is in flight
///
/// Released on drop unless kept, so a failed or abandoned issuance does not
/// count against the subject.
struct SlotReservation<'a> {
    book: &'a Mutex<TokenBook>,
    subject_id: &'a str,
    reserved_at: i64,
    kept: bool,
}

impl SlotReservation<'_> {
    fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if !self.kept {
            self.book
                .lock()
                .limiter
                .release(self.subject_id, self.reserved_at);
        }
    }
}

/// A freshly issued token. The only place the raw token ever appears.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: AccessToken,
    pub subject_id: String,
    pub scope_id: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub fingerprint: PayloadHash,
    pub anchor_id: String,
    pub sequence_number: u64,
    pub credential_ref: String,
}

/// What a revoke call did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RevokeOutcome {
    /// Token moved to `Revoked`; the entry recording it
    Revoked {
        anchor_id: String,
        sequence_number: u64,
    },
    AlreadyRevoked,
    AlreadyExpired,
}

/// Observable state of a token, without the token itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStatus {
    pub active: bool,
    pub state: TokenState,
    pub issued_to: String,
    pub scope_id: String,
    pub expires_at: i64,
}

/// Result of an expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub pruned: usize,
}

#[derive(Debug)]
struct TokenBook {
    /// Keyed by SHA-256 of the token so the raw value is never held
    records: HashMap<[u8; 32], TokenRecord>,
    limiter: IssuanceLimiter,
}

/// Issues and governs privileged access tokens
pub struct AccessTokenIssuer {
    ledger: Arc<AnchorLedger>,
    mfa: Arc<dyn MfaVerifier>,
    provisioner: Arc<dyn CredentialProvisioner>,
    policy: IssuerPolicy,
    book: Mutex<TokenBook>,
    revoke_lock: tokio::sync::Mutex<()>,
}

impl AccessTokenIssuer {
    pub fn new(
        ledger: Arc<AnchorLedger>,
        mfa: Arc<dyn MfaVerifier>,
        provisioner: Arc<dyn CredentialProvisioner>,
        policy: IssuerPolicy,
    ) -> Self {
        let window_ms = i64::try_from(policy.issuance_window.as_millis()).unwrap_or(i64::MAX);
        let limiter = IssuanceLimiter::new(policy.max_issuances, window_ms);

        info!(
            mfa = mfa.description(),
            provisioner = provisioner.description(),
            max_issuances = policy.max_issuances,
            window_secs = policy.issuance_window.as_secs(),
            "Access token issuer ready"
        );

        Self {
            ledger,
            mfa,
            provisioner,
            policy,
            book: Mutex::new(TokenBook {
                records: HashMap::new(),
                limiter,
            }),
            revoke_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn policy(&self) -> &IssuerPolicy {
        &self.policy
    }

    fn now(&self) -> i64 {
        self.ledger.clock().now_ms()
    }

    /// Issue a token for `subject_id` in `scope_id`
    ///
    /// Checks MFA enrollment and the subject's issuance rate before anything
    /// is anchored. The returned token is not stored anywhere; only its
    /// fingerprint reaches the ledger.
    pub async fn issue(&self, subject_id: &str, scope_id: &str) -> Result<IssuedToken> {
        let subject_id = subject_id.trim();
        let scope_id = scope_id.trim();
        if subject_id.is_empty() {
            return Err(AnchorError::MissingField("subject_id".into()));
        }
        if scope_id.is_empty() {
            return Err(AnchorError::MissingField("scope_id".into()));
        }

        if !self.mfa.check_mfa_enrolled(subject_id).await? {
            warn!(
                subject = %subject_id,
                scope = %scope_id,
                "SECURITY: Token request denied, no enrolled second factor"
            );
            return Err(AnchorError::MfaRequired(subject_id.to_string()));
        }

        let issued_at = self.now();
        let acquired = self.book.lock().limiter.try_acquire(subject_id, issued_at);
        if !acquired {
            warn!(
                subject = %subject_id,
                limit = self.policy.max_issuances,
                "SECURITY: Token issuance rate exceeded"
            );
            return Err(AnchorError::IssuanceRateExceeded {
                subject: subject_id.to_string(),
                limit: self.policy.max_issuances,
                window_secs: self.policy.issuance_window.as_secs(),
            });
        }

        let slot = SlotReservation {
            book: &self.book,
            subject_id,
            reserved_at: issued_at,
            kept: false,
        };
        let issued = self.issue_reserved(subject_id, scope_id, issued_at).await?;
        slot.keep();
        Ok(issued)
    }

    async fn issue_reserved(
        &self,
        subject_id: &str,
        scope_id: &str,
        issued_at: i64,
    ) -> Result<IssuedToken> {
        let token = AccessToken::generate();
        let expires_at = issued_at + TOKEN_TTL_MS;
        let token_fingerprint = fingerprint(&token, subject_id, expires_at);

        let ttl = Duration::from_millis(TOKEN_TTL_MS as u64);
        let credential_ref = self
            .provisioner
            .provision(subject_id, scope_id, ttl)
            .await
            .map_err(|e| match e {
                AnchorError::ProvisioningFailed(_) => e,
                other => AnchorError::ProvisioningFailed(other.to_string()),
            })?;

        let mut metadata = Metadata::new();
        metadata.insert("subject_id".into(), Value::from(subject_id));
        metadata.insert("scope_id".into(), Value::from(scope_id));
        metadata.insert("expires_at".into(), Value::from(expires_at));
        metadata.insert("credential_ref".into(), Value::from(credential_ref.as_str()));

        let entry = self
            .ledger
            .append_hash(token_fingerprint.clone(), EntryType::TokenIssued, metadata)
            .await?;

        let record = TokenRecord {
            fingerprint: token_fingerprint.clone(),
            issued_to: subject_id.to_string(),
            scope_id: scope_id.to_string(),
            issued_at,
            expires_at,
            state: TokenState::Active,
            anchor_id: entry.anchor_id.clone(),
            credential_ref: Some(credential_ref.clone()),
        };
        self.book.lock().records.insert(token.lookup_key(), record);

        info!(
            subject = %subject_id,
            scope = %scope_id,
            anchor_id = %entry.anchor_id,
            sequence = entry.sequence_number,
            expires_at = expires_at,
            "Issued privileged access token"
        );

        Ok(IssuedToken {
            token,
            subject_id: subject_id.to_string(),
            scope_id: scope_id.to_string(),
            issued_at,
            expires_at,
            fingerprint: token_fingerprint,
            anchor_id: entry.anchor_id,
            sequence_number: entry.sequence_number,
            credential_ref,
        })
    }

    /// Revoke a token
    ///
    /// Idempotent: revoking a token that is already revoked or expired
    /// succeeds without touching the ledger. Unknown tokens fail with
    /// `TokenNotFound`.
    pub async fn revoke(&self, token: &AccessToken) -> Result<RevokeOutcome> {
        let _guard = self.revoke_lock.lock().await;
        let key = token.lookup_key();
        let now = self.now();

        let record = self
            .book
            .lock()
            .records
            .get(&key)
            .cloned()
            .ok_or(AnchorError::TokenNotFound)?;

        let token_fingerprint = fingerprint(token, &record.issued_to, record.expires_at);
        if token_fingerprint != record.fingerprint {
            return Err(AnchorError::TokenNotFound);
        }

        match record.effective_state(now) {
            TokenState::Revoked => return Ok(RevokeOutcome::AlreadyRevoked),
            TokenState::Expired => {
                self.set_state(&key, TokenState::Expired);
                return Ok(RevokeOutcome::AlreadyExpired);
            }
            TokenState::Active => {}
        }

        // Only our own earlier revoke counts; anyone can anchor a hash.
        let existing = self
            .ledger
            .find_by_payload(&EntryType::TokenRevoked, &token_fingerprint)
            .await?
            .filter(|entry| {
                entry.metadata_str("issued_anchor_id") == Some(record.anchor_id.as_str())
            });
        let entry = match existing {
            Some(entry) => entry,
            None => {
                let mut metadata = Metadata::new();
                metadata.insert("subject_id".into(), Value::from(record.issued_to.as_str()));
                metadata.insert("scope_id".into(), Value::from(record.scope_id.as_str()));
                metadata.insert("issued_anchor_id".into(), Value::from(record.anchor_id.as_str()));
                self.ledger
                    .append_hash(token_fingerprint, EntryType::TokenRevoked, metadata)
                    .await?
            }
        };

        self.set_state(&key, TokenState::Revoked);

        info!(
            subject = %record.issued_to,
            anchor_id = %entry.anchor_id,
            sequence = entry.sequence_number,
            "Revoked privileged access token"
        );

        Ok(RevokeOutcome::Revoked {
            anchor_id: entry.anchor_id,
            sequence_number: entry.sequence_number,
        })
    }

    fn set_state(&self, key: &[u8; 32], state: TokenState) {
        if let Some(record) = self.book.lock().records.get_mut(key) {
            record.state = state;
        }
    }

    /// `true` iff the token is known, not revoked and `now <= expires_at`
    pub fn is_active(&self, token: &AccessToken) -> bool {
        let now = self.now();
        self.book
            .lock()
            .records
            .get(&token.lookup_key())
            .is_some_and(|r| r.is_active(now))
    }

    /// Current state of a token, `None` if unknown or already pruned
    pub fn status(&self, token: &AccessToken) -> Option<TokenStatus> {
        let now = self.now();
        self.book.lock().records.get(&token.lookup_key()).map(|r| {
            let state = r.effective_state(now);
            TokenStatus {
                active: state == TokenState::Active,
                state,
                issued_to: r.issued_to.clone(),
                scope_id: r.scope_id.clone(),
                expires_at: r.expires_at,
            }
        })
    }

    /// Number of token records currently held
    pub fn tracked_tokens(&self) -> usize {
        self.book.lock().records.len()
    }

    /// Mark overdue tokens expired and drop records past retention
    pub fn sweep(&self, now_ms: i64) -> SweepReport {
        let retention_ms =
            i64::try_from(self.policy.record_retention.as_millis()).unwrap_or(i64::MAX);
        let mut book = self.book.lock();
        let mut report = SweepReport::default();

        for record in book.records.values_mut() {
            if record.state == TokenState::Active && now_ms > record.expires_at {
                record.state = TokenState::Expired;
                report.expired += 1;
            }
        }

        let before = book.records.len();
        book.records
            .retain(|_, r| r.expires_at.saturating_add(retention_ms) >= now_ms);
        report.pruned = before - book.records.len();
        book.limiter.prune(now_ms);

        if report.expired > 0 || report.pruned > 0 {
            info!(
                expired = report.expired,
                pruned = report.pruned,
                "Token sweep complete"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use anchor_core::{ManualClock, SigningSecret, StaticKeyProvider};
    use async_trait::async_trait;

    const T0: i64 = 1_700_000_000_000;

    struct Fixture {
        issuer: AccessTokenIssuer,
        ledger: Arc<AnchorLedger>,
        clock: Arc<ManualClock>,
    }

    fn fixture_with(mfa: Arc<dyn MfaVerifier>, policy: IssuerPolicy) -> Fixture {
        let clock = Arc::new(ManualClock::new(T0));
        let secret = SigningSecret::new(b"test-signing-secret".to_vec()).unwrap();
        let ledger = Arc::new(AnchorLedger::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StaticKeyProvider::new(secret)),
            clock.clone(),
        ));
        let issuer = AccessTokenIssuer::new(
            ledger.clone(),
            mfa,
            Arc::new(LocalProvisioner),
            policy,
        );
        Fixture {
            issuer,
            ledger,
            clock,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            Arc::new(StaticMfaDirectory::allow_all()),
            IssuerPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_issue_anchors_fingerprint() {
        let f = fixture();
        let issued = f.issuer.issue("alice", "backup-vault").await.unwrap();

        assert_eq!(issued.expires_at, T0 + TOKEN_TTL_MS);
        assert_eq!(
            issued.fingerprint,
            fingerprint(&issued.token, "alice", issued.expires_at)
        );

        let entry = f
            .ledger
            .latest_of_type(&EntryType::TokenIssued)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.payload_hash, issued.fingerprint);
        assert_eq!(entry.anchor_id, issued.anchor_id);
        assert_eq!(entry.metadata_str("subject_id"), Some("alice"));
        assert_eq!(entry.metadata_str("scope_id"), Some("backup-vault"));
        assert_eq!(
            entry.metadata_str("credential_ref"),
            Some(issued.credential_ref.as_str())
        );
        assert_eq!(
            entry.metadata.get("expires_at").and_then(|v| v.as_i64()),
            Some(issued.expires_at)
        );
    }

    #[tokio::test]
    async fn test_raw_token_never_reaches_ledger() {
        let f = fixture();
        let issued = f.issuer.issue("alice", "backup-vault").await.unwrap();

        let entries = f.ledger.entries(1, 10).await.unwrap();
        let dump = serde_json::to_string(&entries).unwrap();
        assert!(!dump.contains(issued.token.expose()));
    }

    #[tokio::test]
    async fn test_blank_fields_rejected() {
        let f = fixture();
        assert_eq!(
            f.issuer.issue("  ", "scope").await.unwrap_err(),
            AnchorError::MissingField("subject_id".into())
        );
        assert_eq!(
            f.issuer.issue("alice", "").await.unwrap_err(),
            AnchorError::MissingField("scope_id".into())
        );
        assert_eq!(f.ledger.height().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mfa_required() {
        let f = fixture_with(
            Arc::new(StaticMfaDirectory::with_enrolled(["alice"])),
            IssuerPolicy::default(),
        );

        let err = f.issuer.issue("mallory", "backup-vault").await.unwrap_err();
        assert_eq!(err, AnchorError::MfaRequired("mallory".into()));
        assert_eq!(f.ledger.height().await.unwrap(), 0);

        assert!(f.issuer.issue("alice", "backup-vault").await.is_ok());
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let policy = IssuerPolicy {
            max_issuances: 2,
            issuance_window: Duration::from_secs(60),
            ..IssuerPolicy::default()
        };
        let f = fixture_with(Arc::new(StaticMfaDirectory::allow_all()), policy);

        f.issuer.issue("alice", "s").await.unwrap();
        f.issuer.issue("alice", "s").await.unwrap();
        let err = f.issuer.issue("alice", "s").await.unwrap_err();
        assert_eq!(
            err,
            AnchorError::IssuanceRateExceeded {
                subject: "alice".into(),
                limit: 2,
                window_secs: 60,
            }
        );
        assert_eq!(f.ledger.height().await.unwrap(), 2);

        f.clock.advance(60_001);
        assert!(f.issuer.issue("alice", "s").await.is_ok());
    }

    struct BrokenProvisioner;

    #[async_trait]
    impl CredentialProvisioner for BrokenProvisioner {
        async fn provision(&self, _: &str, _: &str, _: Duration) -> Result<String> {
            Err(AnchorError::StorageUnavailable("role service down".into()))
        }
    }

    #[tokio::test]
    async fn test_provisioning_failure_anchors_nothing() {
        let clock = Arc::new(ManualClock::new(T0));
        let secret = SigningSecret::new(b"test-signing-secret".to_vec()).unwrap();
        let ledger = Arc::new(AnchorLedger::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StaticKeyProvider::new(secret)),
            clock,
        ));
        let issuer = AccessTokenIssuer::new(
            ledger.clone(),
            Arc::new(StaticMfaDirectory::allow_all()),
            Arc::new(BrokenProvisioner),
            IssuerPolicy {
                max_issuances: 1,
                ..IssuerPolicy::default()
            },
        );

        let err = issuer.issue("alice", "s").await.unwrap_err();
        assert!(matches!(err, AnchorError::ProvisioningFailed(_)));
        assert!(err.is_retryable());
        assert_eq!(ledger.height().await.unwrap(), 0);

        // The failed attempt did not use up the subject's only slot
        let err = issuer.issue("alice", "s").await.unwrap_err();
        assert!(matches!(err, AnchorError::ProvisioningFailed(_)));
    }

    /// Hangs on its first call, answers immediately afterwards
    struct StallingProvisioner {
        stalled: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl CredentialProvisioner for StallingProvisioner {
        async fn provision(&self, subject: &str, scope: &str, _: Duration) -> Result<String> {
            if !self.stalled.swap(true, std::sync::atomic::Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(format!("jit://{}/{}", scope, subject))
        }
    }

    #[tokio::test]
    async fn test_abandoned_issue_releases_rate_slot() {
        let clock = Arc::new(ManualClock::new(T0));
        let secret = SigningSecret::new(b"test-signing-secret".to_vec()).unwrap();
        let ledger = Arc::new(AnchorLedger::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StaticKeyProvider::new(secret)),
            clock,
        ));
        let issuer = AccessTokenIssuer::new(
            ledger.clone(),
            Arc::new(StaticMfaDirectory::allow_all()),
            Arc::new(StallingProvisioner {
                stalled: std::sync::atomic::AtomicBool::new(false),
            }),
            IssuerPolicy {
                max_issuances: 1,
                ..IssuerPolicy::default()
            },
        );

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), issuer.issue("alice", "s")).await;
        assert!(abandoned.is_err());
        assert_eq!(ledger.height().await.unwrap(), 0);

        // The dropped call gave its slot back
        let issued = issuer.issue("alice", "s").await.unwrap();
        assert_eq!(issued.sequence_number, 1);
        assert_eq!(ledger.height().await.unwrap(), 1);

        // The successful one keeps it
        assert!(matches!(
            issuer.issue("alice", "s").await,
            Err(AnchorError::IssuanceRateExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_expiry_is_lazy() {
        let f = fixture();
        let issued = f.issuer.issue("alice", "s").await.unwrap();
        assert!(f.issuer.is_active(&issued.token));

        f.clock.set(issued.expires_at);
        assert!(f.issuer.is_active(&issued.token));

        f.clock.advance(1);
        assert!(!f.issuer.is_active(&issued.token));
        assert_eq!(
            f.issuer.status(&issued.token).unwrap().state,
            TokenState::Expired
        );
    }

    #[tokio::test]
    async fn test_revoke_once() {
        let f = fixture();
        let issued = f.issuer.issue("alice", "s").await.unwrap();

        let first = f.issuer.revoke(&issued.token).await.unwrap();
        let RevokeOutcome::Revoked { sequence_number, .. } = first.clone() else {
            panic!("expected a revoke entry, got {:?}", first);
        };
        assert_eq!(sequence_number, 2);
        assert!(!f.issuer.is_active(&issued.token));

        let second = f.issuer.revoke(&issued.token).await.unwrap();
        assert_eq!(second, RevokeOutcome::AlreadyRevoked);
        assert_eq!(f.ledger.height().await.unwrap(), 2);

        let revoked = f
            .ledger
            .latest_of_type(&EntryType::TokenRevoked)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(revoked.payload_hash, issued.fingerprint);
        assert_eq!(
            revoked.metadata_str("issued_anchor_id"),
            Some(issued.anchor_id.as_str())
        );
    }

    #[tokio::test]
    async fn test_revoke_expired_is_noop() {
        let f = fixture();
        let issued = f.issuer.issue("alice", "s").await.unwrap();
        f.clock.set(issued.expires_at + 1);

        let outcome = f.issuer.revoke(&issued.token).await.unwrap();
        assert_eq!(outcome, RevokeOutcome::AlreadyExpired);
        assert_eq!(f.ledger.height().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_revoke_unknown_token() {
        let f = fixture();
        let result = f.issuer.revoke(&AccessToken::generate()).await;
        assert_eq!(result, Err(AnchorError::TokenNotFound));
    }

    #[tokio::test]
    async fn test_revoke_reuses_anchored_revoke() {
        let f = fixture();
        let issued = f.issuer.issue("alice", "s").await.unwrap();

        // A revoke that reached the ledger but never updated local state
        let anchored = f
            .ledger
            .append_hash(
                issued.fingerprint.clone(),
                EntryType::TokenRevoked,
                Metadata::new(),
            )
            .await
            .unwrap();

        let outcome = f.issuer.revoke(&issued.token).await.unwrap();
        assert_eq!(
            outcome,
            RevokeOutcome::Revoked {
                anchor_id: anchored.anchor_id,
                sequence_number: anchored.sequence_number,
            }
        );
        assert_eq!(f.ledger.height().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sweep_expires_and_prunes() {
        let f = fixture();
        let old = f.issuer.issue("alice", "s").await.unwrap();
        f.clock.advance(TOKEN_TTL_MS + 1);
        let fresh = f.issuer.issue("bob", "s").await.unwrap();

        let report = f.issuer.sweep(f.clock.now_ms());
        assert_eq!(report, SweepReport { expired: 1, pruned: 0 });
        assert!(fresh.token.expose() != old.token.expose());
        assert!(f.issuer.is_active(&fresh.token));

        let retention = f.issuer.policy().record_retention.as_millis() as i64;
        let report = f.issuer.sweep(old.expires_at + retention + 1);
        assert_eq!(report.pruned, 1);
        assert!(f.issuer.status(&old.token).is_none());
        assert_eq!(f.issuer.tracked_tokens(), 1);
    }
}
