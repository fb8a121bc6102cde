//! Identity-provider signing keys.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sso_crypto::RsaPrivateKey;

use super::SignatureAlgorithm;
use crate::error::{SamlError, SamlResult};

/// A private key able to sign `SignedInfo`.
pub trait SigningKey: Send + Sync {
    /// Returns true if the key can produce signatures with `algorithm`.
    fn supports(&self, algorithm: SignatureAlgorithm) -> bool;

    /// Signs `data`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Signing`] if the algorithm is unsupported or
    /// the signature operation fails.
    fn sign(&self, algorithm: SignatureAlgorithm, data: &[u8]) -> SamlResult<Vec<u8>>;

    /// The X.509 certificate published for this key (DER).
    fn certificate_der(&self) -> Option<&[u8]>;
}

/// An RSA signing key with an optional certificate.
#[derive(Debug)]
pub struct RsaSigningKey {
    key: RsaPrivateKey,
    certificate_der: Option<Vec<u8>>,
}

impl RsaSigningKey {
    /// Wraps a loaded key.
    #[must_use]
    pub const fn new(key: RsaPrivateKey, certificate_der: Option<Vec<u8>>) -> Self {
        Self {
            key,
            certificate_der,
        }
    }

    /// Loads a key from DER (PKCS#8 or PKCS#1).
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Signing`] if the key cannot be parsed.
    pub fn from_der(key_der: &[u8], certificate_der: Option<Vec<u8>>) -> SamlResult<Self> {
        Ok(Self::new(RsaPrivateKey::from_der(key_der)?, certificate_der))
    }

    /// Loads a key, and optionally a certificate, from PEM.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Signing`] if the PEM carries no usable key.
    pub fn from_pem(private_key_pem: &str, certificate_pem: Option<&str>) -> SamlResult<Self> {
        let key_der = pem_to_der(private_key_pem, "PRIVATE KEY")
            .or_else(|| pem_to_der(private_key_pem, "RSA PRIVATE KEY"))
            .ok_or_else(|| SamlError::Signing("invalid private key PEM".to_string()))?;

        let certificate_der = match certificate_pem {
            Some(pem) => Some(
                pem_to_der(pem, "CERTIFICATE")
                    .ok_or_else(|| SamlError::Signing("invalid certificate PEM".to_string()))?,
            ),
            None => None,
        };

        Self::from_der(&key_der, certificate_der)
    }

    /// Generates a throwaway 2048-bit key with no certificate.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Signing`] if key generation fails.
    pub fn generate() -> SamlResult<Self> {
        Ok(Self::new(RsaPrivateKey::generate()?, None))
    }

    /// The public key as PKCS#1 DER.
    #[must_use]
    pub fn public_key_der(&self) -> Vec<u8> {
        self.key.public_key_der()
    }
}

impl SigningKey for RsaSigningKey {
    fn supports(&self, algorithm: SignatureAlgorithm) -> bool {
        algorithm.rsa().is_some()
    }

    fn sign(&self, algorithm: SignatureAlgorithm, data: &[u8]) -> SamlResult<Vec<u8>> {
        let rsa = algorithm.rsa().ok_or_else(|| {
            SamlError::Signing(format!("unsupported signature algorithm: {}", algorithm.uri()))
        })?;
        Ok(self.key.sign(rsa, data)?)
    }

    fn certificate_der(&self) -> Option<&[u8]> {
        self.certificate_der.as_deref()
    }
}

/// Extracts the DER body of the first PEM block with the given label.
#[must_use]
pub fn pem_to_der(pem: &str, label: &str) -> Option<Vec<u8>> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let start = pem.find(&begin)? + begin.len();
    let end_pos = start + pem[start..].find(&end)?;

    let b64: String = pem[start..end_pos]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    STANDARD.decode(b64).ok()
}
