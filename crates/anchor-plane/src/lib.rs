//! Anchor Plane
//!
//! Service layer of the anchor ledger:
//! - `AnchorLedger` appends hash-chained entries and answers queries
//! - `ProofVerifier` compares fresh content hashes with anchored ones
//! - `AccessTokenIssuer` issues short-lived privileged tokens, anchoring
//!   only their fingerprints
//!
//! ## Append Guarantees
//!
//! 1. **Order**: concurrent appends receive distinct, contiguous sequence numbers
//! 2. **Linkage**: every entry links to the signature of the entry before it
//! 3. **Atomicity**: an append either stores its entry or leaves no trace
//!
//! ## API Endpoints
//!
//! - `GET /health` - Liveness check
//! - `GET /ready` - Readiness check with store backend and height
//! - `POST /v1/tokens` - Issue a privileged access token
//! - `POST /v1/tokens/revoke` - Revoke a token
//! - `POST /v1/tokens/status` - Check whether a token is active
//! - `POST /v1/proofs/anchor` - Anchor a content hash
//! - `POST /v1/proofs/verify` - Compare a hash with the latest anchor
//! - `POST /v1/proofs/history` - Look a hash up in the full history
//! - `GET /v1/ledger/height` - Current chain height
//! - `GET /v1/ledger/entries` - Page through entries
//! - `GET /v1/ledger/integrity` - Re-verify the whole chain

pub mod api;
pub mod config;
pub mod issuer;
pub mod ledger;
pub mod storage;
pub mod verifier;

pub use api::create_router;
pub use api::handlers::AppState;
pub use config::{ConfigError, PlaneConfig, StoreBackend};
pub use issuer::{
    AccessTokenIssuer, CredentialProvisioner, IssuedToken, IssuerPolicy, LocalProvisioner,
    MfaVerifier, RevokeOutcome, StaticMfaDirectory, SweepReport, TokenStatus,
};
pub use ledger::AnchorLedger;
pub use storage::{LedgerStore, MemoryStore, StorageError};
pub use verifier::ProofVerifier;
