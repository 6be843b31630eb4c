//! External collaborators consulted during issuance
//!
//! The issuer does not implement MFA or credential provisioning itself. It
//! asks an `MfaVerifier` whether the subject has a second factor and a
//! `CredentialProvisioner` for a temporary credential reference, which it
//! records in the ledger without interpreting.

use anchor_core::{AnchorError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

/// Identity provider gate: does the subject have a registered second factor
#[async_trait]
pub trait MfaVerifier: Send + Sync {
    async fn check_mfa_enrolled(&self, subject_id: &str) -> Result<bool>;

    /// Human-readable description for logs
    fn description(&self) -> &str {
        "mfa verifier"
    }
}

/// Issues temporary credentials and returns an opaque reference to them
#[async_trait]
pub trait CredentialProvisioner: Send + Sync {
    async fn provision(&self, subject_id: &str, scope_id: &str, ttl: Duration) -> Result<String>;

    fn description(&self) -> &str {
        "credential provisioner"
    }
}

/// MFA directory backed by a fixed enrollment list
#[derive(Debug, Clone)]
pub struct StaticMfaDirectory {
    enrolled: Option<HashSet<String>>,
}

impl StaticMfaDirectory {
    /// Treat every subject as enrolled (development only)
    pub fn allow_all() -> Self {
        Self { enrolled: None }
    }

    /// Only the listed subjects are enrolled
    pub fn with_enrolled<I, S>(subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enrolled: Some(subjects.into_iter().map(Into::into).collect()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.enrolled.is_none()
    }
}

#[async_trait]
impl MfaVerifier for StaticMfaDirectory {
    async fn check_mfa_enrolled(&self, subject_id: &str) -> Result<bool> {
        Ok(match &self.enrolled {
            None => true,
            Some(set) => set.contains(subject_id),
        })
    }

    fn description(&self) -> &str {
        if self.is_open() {
            "static directory (all subjects enrolled)"
        } else {
            "static directory"
        }
    }
}

/// Provisioner that mints local references without calling out
///
/// Reference format: `jit://<scope>/<subject>/<uuid>?ttl=<secs>`
#[derive(Debug, Clone, Default)]
pub struct LocalProvisioner;

#[async_trait]
impl CredentialProvisioner for LocalProvisioner {
    async fn provision(&self, subject_id: &str, scope_id: &str, ttl: Duration) -> Result<String> {
        if ttl.is_zero() {
            return Err(AnchorError::ProvisioningFailed("ttl must be positive".into()));
        }
        Ok(format!(
            "jit://{}/{}/{}?ttl={}",
            scope_id,
            subject_id,
            Uuid::new_v4(),
            ttl.as_secs()
        ))
    }

    fn description(&self) -> &str {
        "local provisioner"
    }
}
