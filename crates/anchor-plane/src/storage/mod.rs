//! Storage abstraction for the anchor ledger
//!
//! This module provides a trait-based abstraction for ledger persistence,
//! with an in-memory backend (default, tests and single-process use) and a
//! PostgreSQL backend (durable, shared between restarts).
//!
//! Backends own durability and indexing only. Sequence assignment and
//! signing happen in `AnchorLedger`; a backend's job is to refuse writes
//! that would break the chain:
//! - an entry whose `anchor_id` already exists
//! - an entry that does not extend the tail it was computed from

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use anchor_core::{AnchorError, ChainTail, EntryType, LedgerEntry, PayloadHash};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use crate::config::StoreBackend;

/// Open the configured store
pub async fn open(backend: &StoreBackend) -> Result<Arc<dyn LedgerStore>, StorageError> {
    match backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres { database_url } => {
            Ok(Arc::new(PostgresStore::new(database_url).await?))
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres { .. } => Err(StorageError::Connection(
            "postgres store requested but this build lacks the 'postgres' feature".into(),
        )),
    }
}

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Anchor already exists: {0}")]
    AlreadyExists(String),

    #[error("Chain tail moved: expected to extend sequence {expected}, tail is at {actual}")]
    TailMoved { expected: u64, actual: u64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<StorageError> for AnchorError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AlreadyExists(id) => AnchorError::DuplicateAnchor(id),
            other => AnchorError::StorageUnavailable(other.to_string()),
        }
    }
}

/// Storage backend trait for the anchor ledger
///
/// Implementations must be thread-safe and support concurrent readers.
#[async_trait]
pub trait LedgerStore: Send + Sync + Debug {
    /// Short backend name for diagnostics
    fn backend(&self) -> &'static str;

    /// Highest entry of the chain, `None` when empty
    async fn tail(&self) -> Result<Option<ChainTail>, StorageError>;

    /// Persist an entry
    ///
    /// Must fail with `AlreadyExists` if the anchor id is taken, and with
    /// `TailMoved` unless `entry.sequence_number` is exactly one past the
    /// current tail. Either the entry is fully stored or nothing changes.
    async fn insert(&self, entry: &LedgerEntry) -> Result<(), StorageError>;

    /// Entry with the greatest sequence number of the given type
    async fn latest_of_type(&self, entry_type: &EntryType)
        -> Result<Option<LedgerEntry>, StorageError>;

    /// Earliest entry of the given type carrying this payload hash
    async fn find_by_payload(
        &self,
        entry_type: &EntryType,
        payload_hash: &PayloadHash,
    ) -> Result<Option<LedgerEntry>, StorageError>;

    /// Up to `limit` entries with sequence number >= `from_sequence`, ascending
    async fn entries(
        &self,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, StorageError>;
}
