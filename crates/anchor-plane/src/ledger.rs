//! Anchor ledger service
//!
//! Appends entries to the hash chain and answers queries over it. Every
//! append reads the tail, signs the new entry against it and asks the store
//! to persist it conditionally on the tail not having moved. Within one
//! process appends are serialized by a mutex; across processes the store's
//! conditional write catches the race and the append is retried.

use anchor_core::{
    compute_signature, AnchorError, ChainIntegrityReport, ChainWalker, Clock, EntryType,
    KeyProvider, LedgerEntry, Metadata, PayloadHash, Result, GENESIS_SIGNATURE,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::storage::{LedgerStore, StorageError};

/// Default attempts for an append that keeps losing the tail race
pub const DEFAULT_APPEND_ATTEMPTS: u32 = 3;

/// Longest anchor id any backend will store
pub const MAX_ANCHOR_ID_LEN: usize = 64;

/// Page size used when walking the whole chain
const INTEGRITY_PAGE_SIZE: usize = 512;

/// The append-only anchor ledger
pub struct AnchorLedger {
    store: Arc<dyn LedgerStore>,
    keys: Arc<dyn KeyProvider>,
    clock: Arc<dyn Clock>,
    append_lock: Mutex<()>,
    max_append_attempts: u32,
}

impl std::fmt::Debug for AnchorLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorLedger")
            .field("store", &self.store)
            .field("max_append_attempts", &self.max_append_attempts)
            .finish_non_exhaustive()
    }
}

impl AnchorLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        keys: Arc<dyn KeyProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            keys,
            clock,
            append_lock: Mutex::new(()),
            max_append_attempts: DEFAULT_APPEND_ATTEMPTS,
        }
    }

    /// Set how many times an append may lose the tail race before failing
    pub fn with_append_attempts(mut self, attempts: u32) -> Self {
        self.max_append_attempts = attempts.max(1);
        self
    }

    /// Name of the storage backend in use
    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Validate and append a new entry
    ///
    /// `payload_hash` must be 64 hex characters in either case. The ledger
    /// assigns the id, timestamp, sequence number and signatures.
    pub async fn append(
        &self,
        payload_hash: &str,
        entry_type: EntryType,
        metadata: Metadata,
    ) -> Result<LedgerEntry> {
        let payload_hash = PayloadHash::parse(payload_hash).map_err(|e| {
            warn!(error = %e, "Rejected append with malformed payload hash");
            e
        })?;
        self.append_hash(payload_hash, entry_type, metadata).await
    }

    /// Append an already validated payload hash
    pub async fn append_hash(
        &self,
        payload_hash: PayloadHash,
        entry_type: EntryType,
        metadata: Metadata,
    ) -> Result<LedgerEntry> {
        let anchor_id = Uuid::new_v4().to_string();
        self.append_with_id(anchor_id, payload_hash, entry_type, metadata)
            .await
    }

    /// Append under a caller-chosen anchor id
    ///
    /// Fails with `DuplicateAnchor` if the id has been used before; the
    /// existing entry is left untouched.
    pub async fn append_with_id(
        &self,
        anchor_id: String,
        payload_hash: PayloadHash,
        entry_type: EntryType,
        metadata: Metadata,
    ) -> Result<LedgerEntry> {
        if anchor_id.trim().is_empty() {
            return Err(AnchorError::MissingField("anchor_id".into()));
        }
        if anchor_id.len() > MAX_ANCHOR_ID_LEN {
            return Err(AnchorError::MissingField(format!(
                "anchor_id (at most {} characters, got {})",
                MAX_ANCHOR_ID_LEN,
                anchor_id.len()
            )));
        }

        let _guard = self.append_lock.lock().await;
        let secret = self.keys.signing_secret();

        for attempt in 1..=self.max_append_attempts {
            let tail = self.store.tail().await?;
            let (sequence_number, previous_signature, floor) = match tail {
                Some(tail) => (tail.sequence_number + 1, tail.signature, tail.created_at),
                None => (1, GENESIS_SIGNATURE.to_string(), i64::MIN),
            };

            // Never step backwards in time, even if the wall clock does
            let created_at = self.clock.now_ms().max(floor);
            let signature = compute_signature(&payload_hash, created_at, sequence_number, secret);

            let entry = LedgerEntry {
                anchor_id: anchor_id.clone(),
                payload_hash: payload_hash.clone(),
                entry_type: entry_type.clone(),
                created_at,
                sequence_number,
                previous_signature,
                signature,
                metadata: metadata.clone(),
            };

            match self.store.insert(&entry).await {
                Ok(()) => {
                    info!(
                        anchor_id = %entry.anchor_id,
                        sequence = entry.sequence_number,
                        entry_type = %entry.entry_type,
                        "Appended ledger entry"
                    );
                    return Ok(entry);
                }
                Err(StorageError::TailMoved { expected, actual }) => {
                    warn!(
                        attempt = attempt,
                        expected = expected,
                        actual = actual,
                        "Lost chain tail race, retrying append"
                    );
                }
                Err(StorageError::AlreadyExists(id)) => {
                    warn!(anchor_id = %id, "Rejected append with duplicate anchor id");
                    return Err(AnchorError::DuplicateAnchor(id));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AnchorError::StorageUnavailable(format!(
            "chain tail kept moving after {} attempts",
            self.max_append_attempts
        )))
    }

    /// Entry with the greatest sequence number of the given type
    pub async fn latest_of_type(&self, entry_type: &EntryType) -> Result<Option<LedgerEntry>> {
        Ok(self.store.latest_of_type(entry_type).await?)
    }

    /// Earliest entry of the given type carrying this payload hash
    pub async fn find_by_payload(
        &self,
        entry_type: &EntryType,
        payload_hash: &PayloadHash,
    ) -> Result<Option<LedgerEntry>> {
        Ok(self.store.find_by_payload(entry_type, payload_hash).await?)
    }

    /// Sequence number of the tail, 0 when empty
    pub async fn height(&self) -> Result<u64> {
        Ok(self.store.tail().await?.map_or(0, |t| t.sequence_number))
    }

    /// Page through the chain in sequence order
    pub async fn entries(&self, from_sequence: u64, limit: usize) -> Result<Vec<LedgerEntry>> {
        Ok(self.store.entries(from_sequence.max(1), limit).await?)
    }

    /// Walk the full chain, re-deriving every signature
    pub async fn verify_chain_integrity(&self) -> Result<ChainIntegrityReport> {
        let secret = self.keys.signing_secret();
        let mut walker = ChainWalker::new(secret);
        let mut from = 1u64;

        'pages: loop {
            let page = self.store.entries(from, INTEGRITY_PAGE_SIZE).await?;
            let Some(last) = page.last() else {
                break;
            };
            from = last.sequence_number + 1;
            for entry in &page {
                if !walker.push(entry) {
                    break 'pages;
                }
            }
            if page.len() < INTEGRITY_PAGE_SIZE {
                break;
            }
        }

        let report = walker.finish();
        if report.valid {
            debug!(entries = report.entries_checked, "Chain integrity verified");
        } else {
            warn!(
                first_broken = ?report.first_broken_sequence,
                entries = report.entries_checked,
                "SECURITY: Chain integrity check failed"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use anchor_core::{ManualClock, SigningSecret, StaticKeyProvider};

    const T0: i64 = 1_700_000_000_000;

    fn ledger_with(store: Arc<dyn LedgerStore>, clock: Arc<ManualClock>) -> AnchorLedger {
        let secret = SigningSecret::new(b"test-signing-secret".to_vec()).unwrap();
        AnchorLedger::new(store, Arc::new(StaticKeyProvider::new(secret)), clock)
    }

    fn ledger() -> (AnchorLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        (ledger_with(Arc::new(MemoryStore::new()), clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_first_append_links_to_genesis() {
        let (ledger, _) = ledger();
        let entry = ledger
            .append(&"a".repeat(64), EntryType::Proof, Metadata::new())
            .await
            .unwrap();

        assert_eq!(entry.sequence_number, 1);
        assert_eq!(entry.previous_signature, GENESIS_SIGNATURE);
        assert_eq!(entry.created_at, T0);
        assert_eq!(
            entry.signature,
            "c14cac610c5d57f259742825c41a52352fcbe29c6806ce6dc6288ed9e830060e"
        );
    }

    #[tokio::test]
    async fn test_append_normalizes_case() {
        let (ledger, _) = ledger();
        let entry = ledger
            .append(&"AB".repeat(32), EntryType::Proof, Metadata::new())
            .await
            .unwrap();
        assert_eq!(entry.payload_hash.as_str(), "ab".repeat(32));
    }

    #[tokio::test]
    async fn test_malformed_hash_persists_nothing() {
        let (ledger, _) = ledger();
        let result = ledger
            .append("xyz", EntryType::Proof, Metadata::new())
            .await;
        assert!(matches!(result, Err(AnchorError::MalformedPayloadHash(_))));
        assert_eq!(ledger.height().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_timestamps_never_regress() {
        let (ledger, clock) = ledger();
        let first = ledger
            .append(&"a".repeat(64), EntryType::Proof, Metadata::new())
            .await
            .unwrap();

        clock.set(T0 - 60_000);
        let second = ledger
            .append(&"b".repeat(64), EntryType::Proof, Metadata::new())
            .await
            .unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.previous_signature, first.signature);
    }

    #[tokio::test]
    async fn test_duplicate_anchor_id() {
        let (ledger, _) = ledger();
        let hash = PayloadHash::parse(&"a".repeat(64)).unwrap();
        ledger
            .append_with_id("fixed-id".into(), hash.clone(), EntryType::Proof, Metadata::new())
            .await
            .unwrap();

        let result = ledger
            .append_with_id("fixed-id".into(), hash, EntryType::Proof, Metadata::new())
            .await;
        assert_eq!(result, Err(AnchorError::DuplicateAnchor("fixed-id".into())));
        assert_eq!(ledger.height().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_oversized_anchor_id_rejected() {
        let (ledger, _) = ledger();
        let hash = PayloadHash::parse(&"a".repeat(64)).unwrap();

        let result = ledger
            .append_with_id("x".repeat(65), hash.clone(), EntryType::Proof, Metadata::new())
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, AnchorError::MissingField(_)));
        assert!(!err.is_retryable());
        assert_eq!(ledger.height().await.unwrap(), 0);

        let entry = ledger
            .append_with_id("x".repeat(64), hash, EntryType::Proof, Metadata::new())
            .await
            .unwrap();
        assert_eq!(entry.sequence_number, 1);
    }

    #[tokio::test]
    async fn test_latest_of_type_and_height() {
        let (ledger, clock) = ledger();
        assert_eq!(ledger.height().await.unwrap(), 0);
        assert!(ledger.latest_of_type(&EntryType::Proof).await.unwrap().is_none());

        ledger
            .append(&"a".repeat(64), EntryType::Proof, Metadata::new())
            .await
            .unwrap();
        clock.advance(1);
        ledger
            .append(&"b".repeat(64), EntryType::TokenIssued, Metadata::new())
            .await
            .unwrap();

        let latest = ledger.latest_of_type(&EntryType::Proof).await.unwrap().unwrap();
        assert_eq!(latest.sequence_number, 1);
        assert_eq!(ledger.height().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_integrity_of_empty_ledger() {
        let (ledger, _) = ledger();
        let report = ledger.verify_chain_integrity().await.unwrap();
        assert!(report.valid);
        assert_eq!(report.entries_checked, 0);
    }

    #[tokio::test]
    async fn test_integrity_spans_pages() {
        let (ledger, clock) = ledger();
        let count = INTEGRITY_PAGE_SIZE as u64 + 10;
        for i in 0..count {
            clock.advance(1);
            ledger
                .append(&format!("{:064x}", i), EntryType::Proof, Metadata::new())
                .await
                .unwrap();
        }

        let report = ledger.verify_chain_integrity().await.unwrap();
        assert!(report.valid);
        assert_eq!(report.entries_checked, count);
    }

    /// Store whose tail always looks stale, as if another writer keeps winning
    #[derive(Debug, Default)]
    struct AlwaysMovedStore {
        inner: MemoryStore,
        attempts: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl LedgerStore for AlwaysMovedStore {
        fn backend(&self) -> &'static str {
            "always-moved"
        }
        async fn tail(&self) -> std::result::Result<Option<anchor_core::ChainTail>, StorageError> {
            self.inner.tail().await
        }
        async fn insert(&self, _entry: &LedgerEntry) -> std::result::Result<(), StorageError> {
            self.attempts
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(StorageError::TailMoved { expected: 0, actual: 1 })
        }
        async fn latest_of_type(
            &self,
            entry_type: &EntryType,
        ) -> std::result::Result<Option<LedgerEntry>, StorageError> {
            self.inner.latest_of_type(entry_type).await
        }
        async fn find_by_payload(
            &self,
            entry_type: &EntryType,
            payload_hash: &PayloadHash,
        ) -> std::result::Result<Option<LedgerEntry>, StorageError> {
            self.inner.find_by_payload(entry_type, payload_hash).await
        }
        async fn entries(
            &self,
            from_sequence: u64,
            limit: usize,
        ) -> std::result::Result<Vec<LedgerEntry>, StorageError> {
            self.inner.entries(from_sequence, limit).await
        }
    }

    #[tokio::test]
    async fn test_persistent_tail_race_is_unavailable() {
        let store = Arc::new(AlwaysMovedStore::default());
        let ledger = ledger_with(store.clone(), Arc::new(ManualClock::new(T0)))
            .with_append_attempts(4);

        let result = ledger
            .append(&"a".repeat(64), EntryType::Proof, Metadata::new())
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, AnchorError::StorageUnavailable(_)));
        assert!(err.is_retryable());
        assert_eq!(store.attempts.load(std::sync::atomic::Ordering::SeqCst), 4);
    }
}
