//! XML Encryption of attributes and assertions.
//!
//! Content is sealed with a fresh AES-256-GCM key per call; that key is
//! wrapped with RSA-OAEP (SHA-256) to the relying party's published
//! encryption key.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sso_crypto::aead::{AES256_GCM_URI, MGF1_SHA256_URI, RSA_OAEP_URI};
use sso_crypto::{HashAlgorithm, seal_for_recipient};

use crate::error::{SamlError, SamlResult};
use crate::metadata::TrustFacade;
use crate::types::{Assertion, EncryptedAssertion, EncryptedData, EncryptedKey};
use crate::xml;

/// A capability that encrypts XML for a relying party.
pub trait XmlEncrypter: Send + Sync {
    /// Encrypts a serialized element for the facade's encryption key.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Encryption`] if the facade publishes no usable
    /// key or encryption fails.
    fn encrypt(&self, plaintext_xml: &str, facade: &TrustFacade) -> SamlResult<EncryptedData>;
}

/// AES-256-GCM with RSA-OAEP key transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmXmlEncrypter;

impl AesGcmXmlEncrypter {
    /// Creates the encrypter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl XmlEncrypter for AesGcmXmlEncrypter {
    fn encrypt(&self, plaintext_xml: &str, facade: &TrustFacade) -> SamlResult<EncryptedData> {
        let key = facade.encryption_key.as_deref().ok_or_else(|| {
            SamlError::Encryption(format!(
                "relying party {} publishes no encryption key",
                facade.entity_id
            ))
        })?;

        let sealed = seal_for_recipient(plaintext_xml.as_bytes(), key)?;

        Ok(EncryptedData {
            encryption_method: AES256_GCM_URI.to_string(),
            cipher_value: STANDARD.encode(&sealed.cipher_value),
            encrypted_key: EncryptedKey {
                encryption_method: RSA_OAEP_URI.to_string(),
                digest_method: HashAlgorithm::Sha256.xml_dsig_uri().to_string(),
                mgf: MGF1_SHA256_URI.to_string(),
                cipher_value: STANDARD.encode(&sealed.wrapped_key),
                recipient: Some(facade.entity_id.clone()),
            },
        })
    }
}

/// Serializes and encrypts a whole assertion.
///
/// A signed assertion is encrypted with its signature in place.
///
/// # Errors
///
/// Returns [`SamlError::Encryption`] or [`SamlError::Serialization`].
pub fn encrypt_assertion(
    encrypter: &dyn XmlEncrypter,
    assertion: &Assertion,
    facade: &TrustFacade,
) -> SamlResult<EncryptedAssertion> {
    let plaintext = xml::write_assertion(assertion)?;
    Ok(EncryptedAssertion {
        encrypted_data: encrypter.encrypt(&plaintext, facade)?,
    })
}
