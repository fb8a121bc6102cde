//! SAML error types.
//!
//! One taxonomy for the whole issuance pipeline. Errors are `Clone` because
//! a single metadata fetch result is shared by every concurrent waiter.

use std::fmt;

use thiserror::Error;

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// The assembly step that produced a build failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStage {
    /// `<saml2:AuthnStatement>`.
    AuthnStatement,
    /// `<saml2:AttributeStatement>`.
    AttributeStatement,
    /// `<saml2:Issuer>`.
    Issuer,
    /// `<saml2:Subject>`.
    Subject,
    /// `<saml2:Conditions>`.
    Conditions,
}

impl BuildStage {
    /// Returns the element name this stage produces.
    #[must_use]
    pub const fn element_name(self) -> &'static str {
        match self {
            Self::AuthnStatement => "AuthnStatement",
            Self::AttributeStatement => "AttributeStatement",
            Self::Issuer => "Issuer",
            Self::Subject => "Subject",
            Self::Conditions => "Conditions",
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_name())
    }
}

/// SAML issuance errors.
#[derive(Debug, Clone, Error)]
pub enum SamlError {
    /// Unknown relying party or metadata.
    #[error("not found: {0}")]
    NotFound(String),

    /// Metadata source unreachable, timed out, or returned unusable data.
    #[error("metadata resolution failed: {0}")]
    Resolution(String),

    /// The issuer could not be determined unambiguously.
    #[error("issuer unresolved: {0}")]
    IssuerUnresolved(String),

    /// The relying party is not permitted to receive assertions.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Credential check failed.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A statement builder failed.
    #[error("failed to build {stage}: {reason}")]
    Build {
        /// The failing stage.
        stage: BuildStage,
        /// What went wrong.
        reason: String,
    },

    /// The signing capability failed or timed out.
    #[error("signing failed: {0}")]
    Signing(String),

    /// XML Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// The assertion could not be written to XML.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Malformed caller input.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl SamlError {
    /// Creates a build error for the given stage.
    pub fn build(stage: BuildStage, reason: impl Into<String>) -> Self {
        Self::Build {
            stage,
            reason: reason.into(),
        }
    }

    /// Attributes an error to a build stage.
    ///
    /// Errors that already carry a stage, and issuer errors, keep their
    /// identity.
    #[must_use]
    pub fn at_stage(self, stage: BuildStage) -> Self {
        match self {
            Self::Build { .. } | Self::IssuerUnresolved(_) => self,
            other => Self::build(stage, other.to_string()),
        }
    }

    /// Returns true for "unknown relying party" and "metadata unavailable".
    #[must_use]
    pub const fn is_trust_failure(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Resolution(_))
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SamlError {
    fn from(err: std::io::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<sso_crypto::EncryptionError> for SamlError {
    fn from(err: sso_crypto::EncryptionError) -> Self {
        Self::Encryption(err.to_string())
    }
}

impl From<sso_crypto::SignatureError> for SamlError {
    fn from(err: sso_crypto::SignatureError) -> Self {
        Self::Signing(err.to_string())
    }
}
