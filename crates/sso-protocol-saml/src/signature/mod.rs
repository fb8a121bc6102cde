//! XML Signature support for assertions.
//!
//! [`SigningPolicy`] is the gate that decides whether an assertion must be
//! signed. The signing itself is delegated to an [`AssertionSigner`]; the
//! bundled [`XmlAssertionSigner`] produces an enveloped XML-DSig signature.
//!
//! # Signing Algorithms
//!
//! - RSA-SHA256 (default)
//! - RSA-SHA384
//! - RSA-SHA512
//!
//! RSA-SHA1 is recognized in metadata but never selected.

mod key;
mod policy;
mod signer;

pub use key::{RsaSigningKey, SigningKey, pem_to_der};
pub use policy::{SigningDecision, SigningPolicy};
pub use signer::{AssertionSigner, XmlAssertionSigner, verify_enveloped_signature};

use serde::{Deserialize, Serialize};
use sso_crypto::{HashAlgorithm, RsaAlgorithm};

const RSA_SHA1_URI: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
const SHA1_DIGEST_URI: &str = "http://www.w3.org/2000/09/xmldsig#sha1";

/// Signature algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// RSA with SHA-256.
    #[default]
    RsaSha256,
    /// RSA with SHA-384.
    RsaSha384,
    /// RSA with SHA-512.
    RsaSha512,
    /// Legacy RSA with SHA-1. Recognized, never used.
    RsaSha1,
}

impl SignatureAlgorithm {
    /// Returns the URI for this signature algorithm.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self.rsa() {
            Some(rsa) => rsa.xml_dsig_uri(),
            None => RSA_SHA1_URI,
        }
    }

    /// Returns the corresponding digest algorithm URI.
    #[must_use]
    pub const fn digest_uri(&self) -> &'static str {
        match self.hash() {
            Some(hash) => hash.xml_dsig_uri(),
            None => SHA1_DIGEST_URI,
        }
    }

    /// Parses a signature algorithm from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        [Self::RsaSha256, Self::RsaSha384, Self::RsaSha512, Self::RsaSha1]
            .into_iter()
            .find(|alg| alg.uri() == uri)
    }

    /// The RSA scheme backing this algorithm, if it is still supported.
    #[must_use]
    pub const fn rsa(&self) -> Option<RsaAlgorithm> {
        match self {
            Self::RsaSha256 => Some(RsaAlgorithm::Rs256),
            Self::RsaSha384 => Some(RsaAlgorithm::Rs384),
            Self::RsaSha512 => Some(RsaAlgorithm::Rs512),
            Self::RsaSha1 => None,
        }
    }

    /// The digest used for references.
    #[must_use]
    pub const fn hash(&self) -> Option<HashAlgorithm> {
        match self.rsa() {
            Some(rsa) => Some(rsa.hash()),
            None => None,
        }
    }

    /// Returns true if this algorithm uses a deprecated hash (SHA-1).
    #[must_use]
    pub const fn is_deprecated(&self) -> bool {
        matches!(self, Self::RsaSha1)
    }
}

/// An enveloped `<ds:Signature>` over an assertion.
///
/// Canonicalization is always exclusive C14N and the reference always
/// carries the enveloped-signature transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlSignature {
    /// The signature algorithm used.
    pub algorithm: SignatureAlgorithm,
    /// The reference URI (`#` followed by the assertion ID).
    pub reference_uri: String,
    /// The digest value (base64 encoded).
    pub digest_value: String,
    /// The signature value over `SignedInfo` (base64 encoded).
    pub signature_value: String,
    /// Signing certificate (base64 encoded DER).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x509_certificate: Option<String>,
}

/// Configuration for signature creation.
#[derive(Debug, Clone)]
pub struct SignatureConfig {
    /// Algorithm used when the relying party publishes no usable preference.
    pub default_algorithm: SignatureAlgorithm,
    /// Whether to include the X.509 certificate in `KeyInfo`.
    pub include_certificate: bool,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            default_algorithm: SignatureAlgorithm::RsaSha256,
            include_certificate: true,
        }
    }
}
