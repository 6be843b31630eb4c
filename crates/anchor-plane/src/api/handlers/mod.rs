//! API request handlers

pub mod ledger;
pub mod proofs;
pub mod tokens;

pub use ledger::{
    chain_integrity, ledger_height, list_entries, HeightResponse, IntegrityResponse,
    ListEntriesQuery, ListEntriesResponse,
};
pub use proofs::{
    anchor_proof, verify_history, verify_proof, AnchorProofRequest, AnchorProofResponse,
    HistoryResponse, VerifyProofRequest, VerifyProofResponse,
};
pub use tokens::{
    issue_token, revoke_token, token_status, IssueTokenRequest, IssueTokenResponse, TokenRequest,
    TokenStatusResponse,
};

use anchor_core::{AnchorError, EntryType};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::issuer::AccessTokenIssuer;
use crate::ledger::AnchorLedger;
use crate::verifier::ProofVerifier;

/// Application state shared across handlers
pub struct AppState {
    /// The anchor ledger
    pub ledger: Arc<AnchorLedger>,
    /// Verifier over the same ledger
    pub verifier: ProofVerifier,
    /// Token issuer anchoring into the same ledger
    pub issuer: Arc<AccessTokenIssuer>,
}

impl AppState {
    pub fn new(ledger: Arc<AnchorLedger>, issuer: Arc<AccessTokenIssuer>) -> Self {
        Self {
            verifier: ProofVerifier::new(ledger.clone()),
            ledger,
            issuer,
        }
    }
}

/// Parse an optional entry type tag, defaulting to `PROOF`
///
/// Token entry types are written only by the issuer and are refused here.
pub(crate) fn entry_type_or_proof(raw: Option<&str>) -> Result<EntryType, ApiError> {
    let entry_type = match raw {
        None => EntryType::Proof,
        Some(tag) => tag.parse()?,
    };
    match entry_type {
        EntryType::TokenIssued | EntryType::TokenRevoked => {
            Err(AnchorError::InvalidEntryType(format!(
                "{} is reserved for the token issuer",
                entry_type
            ))
            .into())
        }
        other => Ok(other),
    }
}
