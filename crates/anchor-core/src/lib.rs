//! # Anchor Core
//!
//! Data model and cryptographic primitives for the anchor ledger: an
//! append-only, tamper-evident record of content hashes.
//!
//! ## Key Concepts
//!
//! - **Anchor**: a ledger entry recording a hash as proof of a subject's state
//! - **Hash chain**: each entry links to the signature of the one before it
//! - **Fingerprint**: a one-way digest stored in place of a secret token
//!
//! ## Chain Invariants
//!
//! 1. **Order**: sequence numbers are contiguous from 1
//! 2. **Linkage**: `previous_signature(n) == signature(n - 1)`, entry 1 links to genesis
//! 3. **Binding**: each signature is an HMAC over payload, timestamp and position

pub mod chain;
pub mod clock;
pub mod error;
pub mod token;
pub mod types;

pub use chain::{
    compute_signature, genesis_signature, verify_chain, ChainWalker, KeyProvider, SigningSecret,
    StaticKeyProvider, GENESIS_SIGNATURE,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AnchorError, ErrorClass, Result};
pub use token::{fingerprint, AccessToken, TokenRecord, TokenState, TOKEN_TTL_MS};
pub use types::{
    ChainIntegrityReport, ChainTail, EntryType, LedgerEntry, Metadata, PayloadHash,
    VerificationOutcome, VerificationStatus,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the library version
pub fn version() -> &'static str {
    VERSION
}
