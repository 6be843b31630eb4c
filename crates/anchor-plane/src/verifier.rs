//! Proof verification
//!
//! Compares a freshly computed hash of some content against what the ledger
//! anchored for it. A mismatch against the latest anchor means the content
//! changed since it was recorded, and is reported as `COMPROMISED`.

use anchor_core::chain::hex_eq;
use anchor_core::{
    AnchorError, EntryType, LedgerEntry, PayloadHash, Result, VerificationOutcome,
    VerificationStatus,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::ledger::AnchorLedger;

/// Read-only verifier over an anchor ledger
#[derive(Debug, Clone)]
pub struct ProofVerifier {
    ledger: Arc<AnchorLedger>,
}

impl ProofVerifier {
    pub fn new(ledger: Arc<AnchorLedger>) -> Self {
        Self { ledger }
    }

    /// Compare `candidate_hash` with the latest anchor of `entry_type`
    ///
    /// Returns `NoAnchorFound` when nothing of that type has been anchored.
    /// A mismatch is a successful verification with status `COMPROMISED`.
    pub async fn verify(
        &self,
        candidate_hash: &str,
        entry_type: &EntryType,
    ) -> Result<VerificationOutcome> {
        let candidate = PayloadHash::parse(candidate_hash)?;

        let anchored = self
            .ledger
            .latest_of_type(entry_type)
            .await?
            .ok_or_else(|| AnchorError::NoAnchorFound(entry_type.clone()))?;

        let matched = hex_eq(candidate.as_str(), anchored.payload_hash.as_str());
        let status = if matched {
            VerificationStatus::VerifiedClean
        } else {
            VerificationStatus::Compromised
        };

        if matched {
            info!(
                entry_type = %entry_type,
                anchor_id = %anchored.anchor_id,
                sequence = anchored.sequence_number,
                "Proof verified clean"
            );
        } else {
            warn!(
                entry_type = %entry_type,
                anchor_id = %anchored.anchor_id,
                sequence = anchored.sequence_number,
                anchored_hash = %anchored.payload_hash,
                candidate_hash = %candidate,
                "SECURITY: Proof mismatch, content compromised"
            );
        }

        Ok(VerificationOutcome {
            matched,
            status,
            anchored_hash: anchored.payload_hash,
            anchored_at: anchored.created_at,
            anchor_id: anchored.anchor_id,
            sequence_number: anchored.sequence_number,
        })
    }

    /// Find the earliest anchor of `entry_type` recording `candidate_hash`
    ///
    /// Answers "was this content ever anchored", not "is it the current
    /// state". `None` when the hash never appears.
    pub async fn verify_against_history(
        &self,
        candidate_hash: &str,
        entry_type: &EntryType,
    ) -> Result<Option<LedgerEntry>> {
        let candidate = PayloadHash::parse(candidate_hash)?;
        self.ledger.find_by_payload(entry_type, &candidate).await
    }
}
