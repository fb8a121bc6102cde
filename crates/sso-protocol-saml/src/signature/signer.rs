//! Enveloped XML-DSig signing of assertions.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::{SignatureAlgorithm, SignatureConfig, SigningKey, XmlSignature};
use crate::context::{IssuanceRequestContext, RelyingPartyDescriptor};
use crate::error::{SamlError, SamlResult};
use crate::metadata::TrustFacade;
use crate::types::{Assertion, SamlBinding};
use crate::xml;

/// A capability that applies a digital signature to an assertion.
#[async_trait]
pub trait AssertionSigner: Send + Sync + 'static {
    /// Returns the assertion with a signature attached.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Signing`] if no signature can be produced.
    async fn sign(
        &self,
        assertion: Assertion,
        descriptor: &RelyingPartyDescriptor,
        facade: &TrustFacade,
        binding: SamlBinding,
        request: &IssuanceRequestContext,
    ) -> SamlResult<Assertion>;
}

/// Signs assertions with the identity provider's key.
///
/// The reference digest covers the canonical form of the assertion
/// serialized without its signature. The canonical form of `SignedInfo` is
/// then signed with the key.
#[derive(Clone)]
pub struct XmlAssertionSigner {
    key: Arc<dyn SigningKey>,
    config: SignatureConfig,
}

impl XmlAssertionSigner {
    /// Creates a signer using the default configuration.
    #[must_use]
    pub fn new(key: Arc<dyn SigningKey>) -> Self {
        Self {
            key,
            config: SignatureConfig::default(),
        }
    }

    /// Sets the signature configuration.
    #[must_use]
    pub fn with_config(mut self, config: SignatureConfig) -> Self {
        self.config = config;
        self
    }

    /// Picks the first method the relying party publishes that the key can
    /// produce, falling back to the configured default.
    #[must_use]
    pub fn select_algorithm(&self, facade: &TrustFacade) -> SignatureAlgorithm {
        facade
            .signing_methods
            .iter()
            .filter_map(|uri| SignatureAlgorithm::from_uri(uri))
            .find(|alg| !alg.is_deprecated() && self.key.supports(*alg))
            .unwrap_or(self.config.default_algorithm)
    }

    /// Signs an assertion with an explicit algorithm.
    ///
    /// Any existing signature is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Signing`] if the algorithm is unusable or the
    /// key fails, and [`SamlError::Serialization`] if the assertion cannot
    /// be written.
    pub fn sign_with(
        &self,
        mut assertion: Assertion,
        algorithm: SignatureAlgorithm,
    ) -> SamlResult<Assertion> {
        let hash = algorithm.hash().ok_or_else(|| {
            SamlError::Signing(format!("refusing to sign with {}", algorithm.uri()))
        })?;

        assertion.signature = None;
        let unsigned = xml::canonicalize(&xml::write_unsigned_assertion(&assertion)?)?;
        let digest = sso_crypto::digest(hash, unsigned.as_bytes());

        let mut signature = XmlSignature {
            algorithm,
            reference_uri: format!("#{}", assertion.id),
            digest_value: STANDARD.encode(digest),
            signature_value: String::new(),
            x509_certificate: self
                .key
                .certificate_der()
                .filter(|_| self.config.include_certificate)
                .map(|der| STANDARD.encode(der)),
        };

        let signed_info = xml::canonicalize(&xml::write_signed_info(&signature)?)?;
        let value = self.key.sign(algorithm, signed_info.as_bytes())?;
        signature.signature_value = STANDARD.encode(value);

        assertion.signature = Some(signature);
        Ok(assertion)
    }
}

#[async_trait]
impl AssertionSigner for XmlAssertionSigner {
    async fn sign(
        &self,
        assertion: Assertion,
        descriptor: &RelyingPartyDescriptor,
        facade: &TrustFacade,
        _binding: SamlBinding,
        _request: &IssuanceRequestContext,
    ) -> SamlResult<Assertion> {
        let algorithm = self.select_algorithm(facade);
        tracing::debug!(
            assertion_id = %assertion.id,
            entity_id = %descriptor.entity_id,
            algorithm = algorithm.uri(),
            "signing assertion"
        );

        let signer = self.clone();
        tokio::task::spawn_blocking(move || signer.sign_with(assertion, algorithm))
            .await
            .map_err(|e| SamlError::Signing(format!("signing task failed: {e}")))?
    }
}

impl std::fmt::Debug for XmlAssertionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlAssertionSigner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Verifies an assertion's enveloped signature against an RSA public key
/// (PKCS#1 or `SubjectPublicKeyInfo` DER).
///
/// # Errors
///
/// Returns [`SamlError::Signing`] if the assertion is unsigned, the digest
/// does not match its content, or the signature value does not verify.
pub fn verify_enveloped_signature(assertion: &Assertion, public_key_der: &[u8]) -> SamlResult<()> {
    let signature = assertion
        .signature
        .as_ref()
        .ok_or_else(|| SamlError::Signing("assertion is not signed".to_string()))?;

    if signature.reference_uri != format!("#{}", assertion.id) {
        return Err(SamlError::Signing(
            "signature does not reference the assertion".to_string(),
        ));
    }

    let (Some(hash), Some(rsa)) = (signature.algorithm.hash(), signature.algorithm.rsa()) else {
        return Err(SamlError::Signing(format!(
            "unsupported signature algorithm: {}",
            signature.algorithm.uri()
        )));
    };

    let unsigned = xml::canonicalize(&xml::write_unsigned_assertion(assertion)?)?;
    let digest = sso_crypto::digest(hash, unsigned.as_bytes());
    if STANDARD.encode(digest) != signature.digest_value {
        return Err(SamlError::Signing("digest mismatch".to_string()));
    }

    let value = STANDARD
        .decode(&signature.signature_value)
        .map_err(|e| SamlError::Signing(format!("malformed signature value: {e}")))?;
    let signed_info = xml::canonicalize(&xml::write_signed_info(signature)?)?;
    sso_crypto::rsa_verify(public_key_der, signed_info.as_bytes(), &value, rsa)?;
    Ok(())
}
