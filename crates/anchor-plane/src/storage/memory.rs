//! In-memory storage backend
//!
//! Default storage implementation holding the chain in a vector with
//! hashmap indexes. Suitable for development, tests and single-process
//! deployments. Data is lost on restart.

use anchor_core::{ChainTail, EntryType, LedgerEntry, PayloadHash};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::{LedgerStore, StorageError};

#[derive(Debug, Default)]
struct MemoryState {
    /// Entries sorted by sequence number
    entries: Vec<LedgerEntry>,
    anchor_ids: HashSet<String>,
    /// Ascending sequence numbers per entry type
    by_type: HashMap<EntryType, Vec<u64>>,
    /// Earliest sequence number per (type, payload)
    by_payload: HashMap<(EntryType, PayloadHash), u64>,
}

impl MemoryState {
    fn index(&mut self, entry: &LedgerEntry) {
        self.anchor_ids.insert(entry.anchor_id.clone());
        self.by_type
            .entry(entry.entry_type.clone())
            .or_default()
            .push(entry.sequence_number);
        self.by_payload
            .entry((entry.entry_type.clone(), entry.payload_hash.clone()))
            .or_insert(entry.sequence_number);
    }

    fn get(&self, sequence_number: u64) -> Option<&LedgerEntry> {
        let pos = self
            .entries
            .partition_point(|e| e.sequence_number < sequence_number);
        self.entries
            .get(pos)
            .filter(|e| e.sequence_number == sequence_number)
    }
}

/// In-memory ledger store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Create a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a previously exported chain as-is
    ///
    /// No linkage or signature checks are made here; run
    /// `AnchorLedger::verify_chain_integrity` after loading.
    pub fn with_entries(mut entries: Vec<LedgerEntry>) -> Self {
        entries.sort_by_key(|e| e.sequence_number);
        let mut state = MemoryState::default();
        for entry in &entries {
            state.index(entry);
        }
        state.entries = entries;
        Self {
            state: RwLock::new(state),
        }
    }

    /// Snapshot of every stored entry in sequence order
    pub fn export(&self) -> Vec<LedgerEntry> {
        self.state.read().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn tail(&self) -> Result<Option<ChainTail>, StorageError> {
        let state = self.state.read();
        Ok(state.entries.last().map(ChainTail::from))
    }

    async fn insert(&self, entry: &LedgerEntry) -> Result<(), StorageError> {
        let mut state = self.state.write();

        if state.anchor_ids.contains(&entry.anchor_id) {
            return Err(StorageError::AlreadyExists(entry.anchor_id.clone()));
        }

        let current = state.entries.last().map_or(0, |e| e.sequence_number);
        if entry.sequence_number != current + 1 {
            return Err(StorageError::TailMoved {
                expected: entry.sequence_number.saturating_sub(1),
                actual: current,
            });
        }

        state.index(entry);
        state.entries.push(entry.clone());

        debug!(
            anchor_id = %entry.anchor_id,
            sequence = entry.sequence_number,
            entry_type = %entry.entry_type,
            "Stored ledger entry"
        );
        Ok(())
    }

    async fn latest_of_type(
        &self,
        entry_type: &EntryType,
    ) -> Result<Option<LedgerEntry>, StorageError> {
        let state = self.state.read();
        Ok(state
            .by_type
            .get(entry_type)
            .and_then(|seqs| seqs.last())
            .and_then(|seq| state.get(*seq))
            .cloned())
    }

    async fn find_by_payload(
        &self,
        entry_type: &EntryType,
        payload_hash: &PayloadHash,
    ) -> Result<Option<LedgerEntry>, StorageError> {
        let state = self.state.read();
        Ok(state
            .by_payload
            .get(&(entry_type.clone(), payload_hash.clone()))
            .and_then(|seq| state.get(*seq))
            .cloned())
    }

    async fn entries(
        &self,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, StorageError> {
        let state = self.state.read();
        let start = state
            .entries
            .partition_point(|e| e.sequence_number < from_sequence);
        Ok(state.entries[start..].iter().take(limit).cloned().collect())
    }
}
