//! Server configuration.
//!
//! Configuration is loaded from environment variables (and `.env`).

use std::path::PathBuf;

use sso_core::IssuanceConfig;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,

    /// Port to bind to.
    pub port: u16,

    /// JSON registry of services, users and metadata.
    pub registry_file: PathBuf,

    /// Additional relying-party metadata files, consulted after the
    /// registry's own metadata in the order given.
    pub metadata_files: Vec<PathBuf>,

    /// IdP signing key (PEM, PKCS#8 or PKCS#1).
    pub signing_key_file: PathBuf,

    /// IdP signing certificate (PEM), published in `KeyInfo`.
    pub signing_cert_file: Option<PathBuf>,

    /// Log filter.
    pub log_level: String,

    /// Pipeline settings.
    pub issuance: IssuanceConfig,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Fails if `SSO_REGISTRY_FILE` or `SSO_SIGNING_KEY_FILE` is missing.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Fails if a required key is missing.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("SSO_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = lookup("SSO_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let registry_file = lookup("SSO_REGISTRY_FILE")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow::anyhow!("SSO_REGISTRY_FILE environment variable is required"))?;
        let metadata_files = lookup("SSO_METADATA_FILES")
            .map(|files| {
                files
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();
        let signing_key_file = lookup("SSO_SIGNING_KEY_FILE")
            .map(PathBuf::from)
            .ok_or_else(|| {
                anyhow::anyhow!("SSO_SIGNING_KEY_FILE environment variable is required")
            })?;
        let signing_cert_file = lookup("SSO_SIGNING_CERT_FILE").map(PathBuf::from);

        let log_level = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            host,
            port,
            registry_file,
            metadata_files,
            signing_key_file,
            signing_cert_file,
            log_level,
            issuance: IssuanceConfig::from_lookup(&lookup),
        })
    }

    /// Creates a configuration for testing.
    #[must_use]
    pub fn for_testing(registry_file: impl Into<PathBuf>, signing_key_file: impl Into<PathBuf>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            registry_file: registry_file.into(),
            metadata_files: Vec::new(),
            signing_key_file: signing_key_file.into(),
            signing_cert_file: None,
            log_level: "debug".to_string(),
            issuance: IssuanceConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn required_files_are_enforced() {
        let err = ServerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("SSO_REGISTRY_FILE"));

        let err = ServerConfig::from_lookup(lookup(&[("SSO_REGISTRY_FILE", "r.json")])).unwrap_err();
        assert!(err.to_string().contains("SSO_SIGNING_KEY_FILE"));
    }

    #[test]
    fn defaults_and_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("SSO_REGISTRY_FILE", "registry.json"),
            ("SSO_SIGNING_KEY_FILE", "idp.key"),
            ("SSO_PORT", "not-a-port"),
            ("SSO_ASSERTION_LIFETIME", "60"),
        ]))
        .unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.registry_file, PathBuf::from("registry.json"));
        assert!(config.signing_cert_file.is_none());
        assert!(config.metadata_files.is_empty());
        assert_eq!(config.issuance.assertion_lifetime_secs, 60);
    }

    #[test]
    fn metadata_files_keep_declared_order() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("SSO_REGISTRY_FILE", "registry.json"),
            ("SSO_SIGNING_KEY_FILE", "idp.key"),
            ("SSO_METADATA_FILES", "federation.json, ,local.json"),
        ]))
        .unwrap();

        assert_eq!(
            config.metadata_files,
            vec![PathBuf::from("federation.json"), PathBuf::from("local.json")]
        );
    }
}
