//! Plane configuration
//!
//! Read once at startup from `ANCHOR_PLANE_*` environment variables. The
//! signing secret is required; everything else has a default.

use anchor_core::SigningSecret;
use std::collections::HashSet;
use std::time::Duration;
use tracing::Level;

use crate::issuer::IssuerPolicy;
use crate::ledger::DEFAULT_APPEND_ATTEMPTS;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Which ledger store to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres { database_url: String },
}

impl StoreBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Postgres { .. } => "postgres",
        }
    }
}

/// Plane configuration
#[derive(Debug, Clone)]
pub struct PlaneConfig {
    pub port: u16,
    pub log_level: Level,
    pub store: StoreBackend,
    pub signing_secret: SigningSecret,
    pub max_issuances: u32,
    pub issuance_window: Duration,
    pub token_retention: Duration,
    pub append_attempts: u32,
    /// `None` disables the expiry sweep
    pub sweep_interval: Option<Duration>,
    /// `None` treats every subject as enrolled
    pub mfa_enrolled: Option<HashSet<String>>,
}

impl PlaneConfig {
    /// Defaults around a given secret
    pub fn new(signing_secret: SigningSecret) -> Self {
        let policy = IssuerPolicy::default();
        Self {
            port: 8080,
            log_level: Level::INFO,
            store: StoreBackend::Memory,
            signing_secret,
            max_issuances: policy.max_issuances,
            issuance_window: policy.issuance_window,
            token_retention: policy.record_retention,
            append_attempts: DEFAULT_APPEND_ATTEMPTS,
            sweep_interval: Some(Duration::from_secs(60)),
            mfa_enrolled: None,
        }
    }

    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secret_raw = get("ANCHOR_PLANE_SIGNING_SECRET")
            .ok_or(ConfigError::Missing("ANCHOR_PLANE_SIGNING_SECRET"))?;
        let signing_secret =
            SigningSecret::new(secret_raw.into_bytes()).map_err(|e| ConfigError::Invalid {
                key: "ANCHOR_PLANE_SIGNING_SECRET",
                reason: e.to_string(),
            })?;

        let mut config = Self::new(signing_secret);

        if let Some(v) = get("ANCHOR_PLANE_PORT") {
            config.port = parse("ANCHOR_PLANE_PORT", &v)?;
        }
        if let Some(v) = get("ANCHOR_PLANE_LOG_LEVEL") {
            config.log_level = parse("ANCHOR_PLANE_LOG_LEVEL", &v)?;
        }

        config.store = match get("ANCHOR_PLANE_STORE").as_deref().map(str::trim) {
            None => StoreBackend::Memory,
            Some(v) if v.eq_ignore_ascii_case("memory") => StoreBackend::Memory,
            Some(v) if v.eq_ignore_ascii_case("postgres") => StoreBackend::Postgres {
                database_url: get("ANCHOR_PLANE_DATABASE_URL")
                    .ok_or(ConfigError::Missing("ANCHOR_PLANE_DATABASE_URL"))?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "ANCHOR_PLANE_STORE",
                    reason: format!("expected 'memory' or 'postgres', got '{}'", other),
                })
            }
        };

        if let Some(v) = get("ANCHOR_PLANE_MAX_ISSUANCES") {
            config.max_issuances = parse("ANCHOR_PLANE_MAX_ISSUANCES", &v)?;
            if config.max_issuances == 0 {
                return Err(ConfigError::Invalid {
                    key: "ANCHOR_PLANE_MAX_ISSUANCES",
                    reason: "must be at least 1".into(),
                });
            }
        }
        if let Some(v) = get("ANCHOR_PLANE_ISSUANCE_WINDOW_SECS") {
            config.issuance_window =
                Duration::from_secs(parse("ANCHOR_PLANE_ISSUANCE_WINDOW_SECS", &v)?);
        }
        if let Some(v) = get("ANCHOR_PLANE_TOKEN_RETENTION_SECS") {
            config.token_retention =
                Duration::from_secs(parse("ANCHOR_PLANE_TOKEN_RETENTION_SECS", &v)?);
        }
        if let Some(v) = get("ANCHOR_PLANE_APPEND_RETRIES") {
            config.append_attempts = parse::<u32>("ANCHOR_PLANE_APPEND_RETRIES", &v)?.max(1);
        }
        if let Some(v) = get("ANCHOR_PLANE_SWEEP_INTERVAL_SECS") {
            let secs: u64 = parse("ANCHOR_PLANE_SWEEP_INTERVAL_SECS", &v)?;
            config.sweep_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(v) = get("ANCHOR_PLANE_MFA_ENROLLED") {
            config.mfa_enrolled = Some(
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            );
        }

        Ok(config)
    }

    /// Issuance policy derived from this configuration
    pub fn issuer_policy(&self) -> IssuerPolicy {
        IssuerPolicy {
            max_issuances: self.max_issuances,
            issuance_window: self.issuance_window,
            record_retention: self.token_retention,
        }
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}
