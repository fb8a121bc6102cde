//! Issuance configuration.
//!
//! Values come from `SSO_*` environment variables (a `.env` file is honoured)
//! and fall back to defaults when unset or unparsable.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Password-protected transport authentication context class.
pub const DEFAULT_AUTHN_CONTEXT: &str =
    "urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport";

/// Settings that govern how assertions are built and signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuanceConfig {
    /// Assertion validity window in seconds (`NotBefore` to `NotOnOrAfter`).
    pub assertion_lifetime_secs: i64,
    /// Upper bound on a single metadata fetch, in milliseconds.
    pub metadata_timeout_ms: u64,
    /// Longest time a metadata entry is used before it is refreshed, in seconds.
    pub metadata_max_cache_ttl_secs: u64,
    /// Upper bound on a single signing operation, in milliseconds.
    pub signing_timeout_ms: u64,
    /// Authentication context class recorded when the authenticator gives none.
    pub default_authn_context: String,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            assertion_lifetime_secs: 300,
            metadata_timeout_ms: 5_000,
            metadata_max_cache_ttl_secs: 3_600,
            signing_timeout_ms: 5_000,
            default_authn_context: DEFAULT_AUTHN_CONTEXT.to_string(),
        }
    }
}

impl IssuanceConfig {
    /// Loads configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            assertion_lifetime_secs: parsed(&lookup, "SSO_ASSERTION_LIFETIME")
                .filter(|secs: &i64| *secs > 0 && chrono::TimeDelta::try_seconds(*secs).is_some())
                .unwrap_or(defaults.assertion_lifetime_secs),
            metadata_timeout_ms: parsed(&lookup, "SSO_METADATA_TIMEOUT")
                .unwrap_or(defaults.metadata_timeout_ms),
            metadata_max_cache_ttl_secs: parsed(&lookup, "SSO_METADATA_MAX_CACHE_TTL")
                .unwrap_or(defaults.metadata_max_cache_ttl_secs),
            signing_timeout_ms: parsed(&lookup, "SSO_SIGNING_TIMEOUT")
                .unwrap_or(defaults.signing_timeout_ms),
            default_authn_context: lookup("SSO_DEFAULT_AUTHN_CONTEXT")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.default_authn_context),
        }
    }

    /// Assertion lifetime as a chrono duration.
    ///
    /// Values beyond chrono's range saturate, so the builders reject them
    /// when computing the validity window.
    #[must_use]
    pub fn assertion_lifetime(&self) -> chrono::Duration {
        chrono::TimeDelta::try_seconds(self.assertion_lifetime_secs).unwrap_or(chrono::TimeDelta::MAX)
    }

    /// Metadata fetch timeout.
    #[must_use]
    pub const fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    /// Maximum metadata cache TTL.
    #[must_use]
    pub const fn metadata_max_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_max_cache_ttl_secs)
    }

    /// Signing timeout.
    #[must_use]
    pub const fn signing_timeout(&self) -> Duration {
        Duration::from_millis(self.signing_timeout_ms)
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}
