//! Error types for the anchor ledger

use thiserror::Error;

use crate::types::EntryType;

/// Result type alias using AnchorError
pub type Result<T> = std::result::Result<T, AnchorError>;

/// Broad error classes callers branch on
///
/// The class decides retry policy; the variant carries the detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input, rejected before anything is persisted
    Validation,
    /// Identifier collision
    Conflict,
    /// Backend or collaborator unreachable
    Unavailable,
    /// Nothing to operate on yet
    NotFound,
    /// Caller is not allowed to proceed
    Authorization,
}

/// Errors that can occur in the anchor ledger
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnchorError {
    /// Payload hash is not a 64 character hex digest
    #[error("Malformed payload hash: {0}")]
    MalformedPayloadHash(String),

    /// Required field missing or empty
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Entry type tag not usable
    #[error("Invalid entry type: {0}")]
    InvalidEntryType(String),

    /// An entry with this anchor id already exists
    #[error("Anchor already exists: {0}")]
    DuplicateAnchor(String),

    /// Storage backend could not complete the request
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Credential provisioner failed
    #[error("Credential provisioning failed: {0}")]
    ProvisioningFailed(String),

    /// No entry of the requested type has been anchored
    #[error("No anchor found for entry type {0}")]
    NoAnchorFound(EntryType),

    /// Token unknown to this issuer
    #[error("Token not found")]
    TokenNotFound,

    /// Subject has no registered second factor
    #[error("MFA required for privileged access: subject '{0}' has no enrolled second factor")]
    MfaRequired(String),

    /// Subject exceeded the issuance window
    #[error("Issuance rate exceeded for '{subject}': at most {limit} tokens per {window_secs}s")]
    IssuanceRateExceeded {
        subject: String,
        limit: u32,
        window_secs: u64,
    },
}

impl AnchorError {
    /// Classify the error for retry and reporting decisions
    pub fn class(&self) -> ErrorClass {
        match self {
            AnchorError::MalformedPayloadHash(_)
            | AnchorError::MissingField(_)
            | AnchorError::InvalidEntryType(_) => ErrorClass::Validation,
            AnchorError::DuplicateAnchor(_) => ErrorClass::Conflict,
            AnchorError::StorageUnavailable(_) | AnchorError::ProvisioningFailed(_) => {
                ErrorClass::Unavailable
            }
            AnchorError::NoAnchorFound(_) | AnchorError::TokenNotFound => ErrorClass::NotFound,
            AnchorError::MfaRequired(_) | AnchorError::IssuanceRateExceeded { .. } => {
                ErrorClass::Authorization
            }
        }
    }

    /// Whether repeating the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Unavailable
    }
}
