//! Content encryption for XML Encryption.
//!
//! Each message gets a fresh AES-256-GCM content key. The key is wrapped to
//! the recipient with RSA-OAEP (SHA-256 digest, MGF1-SHA-256), matching the
//! XML Encryption 1.1 `aes256-gcm` and `rsa-oaep` algorithms.

use aws_lc_rs::{
    aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey},
    rsa::{OAEP_SHA256_MGF1SHA256, OaepPublicEncryptingKey, PublicEncryptingKey},
};
use thiserror::Error;

use crate::random::random_bytes;

/// AES-256 key length in bytes.
pub const CONTENT_KEY_LEN: usize = 32;

/// XML Encryption block cipher URI for AES-256-GCM.
pub const AES256_GCM_URI: &str = "http://www.w3.org/2009/xmlenc11#aes256-gcm";

/// XML Encryption key transport URI for RSA-OAEP.
pub const RSA_OAEP_URI: &str = "http://www.w3.org/2009/xmlenc11#rsa-oaep";

/// MGF1 with SHA-256 URI used alongside [`RSA_OAEP_URI`].
pub const MGF1_SHA256_URI: &str = "http://www.w3.org/2009/xmlenc11#mgf1sha256";

/// Error type for encryption operations.
#[derive(Debug, Error)]
pub enum EncryptionError {
    /// The recipient key could not be parsed.
    #[error("invalid recipient key: {0}")]
    InvalidKey(String),

    /// Sealing or key wrapping failed.
    #[error("encryption failed: {0}")]
    Encryption(String),
}

/// Output of [`seal_for_recipient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedContent {
    /// `IV || ciphertext || tag`, the layout XML Encryption expects for GCM.
    pub cipher_value: Vec<u8>,
    /// The content key encrypted to the recipient.
    pub wrapped_key: Vec<u8>,
}

/// Encrypts `plaintext` for the holder of the given RSA public key.
///
/// `recipient_spki_der` is an X.509 `SubjectPublicKeyInfo` in DER form.
///
/// # Errors
///
/// Returns an error if the key is unusable or encryption fails.
pub fn seal_for_recipient(
    plaintext: &[u8],
    recipient_spki_der: &[u8],
) -> Result<SealedContent, EncryptionError> {
    let content_key = random_bytes(CONTENT_KEY_LEN);
    let cipher_value = seal(&content_key, plaintext)?;
    let wrapped_key = wrap_key(&content_key, recipient_spki_der)?;

    Ok(SealedContent {
        cipher_value,
        wrapped_key,
    })
}

fn seal(content_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let unbound = UnboundKey::new(&AES_256_GCM, content_key)
        .map_err(|e| EncryptionError::Encryption(format!("content key: {e}")))?;
    let key = LessSafeKey::new(unbound);

    let iv = random_bytes(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(&iv)
        .map_err(|e| EncryptionError::Encryption(format!("nonce: {e}")))?;

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|e| EncryptionError::Encryption(format!("seal: {e}")))?;

    let mut out = iv;
    out.extend_from_slice(&in_out);
    Ok(out)
}

fn wrap_key(content_key: &[u8], recipient_spki_der: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let public = PublicEncryptingKey::from_der(recipient_spki_der)
        .map_err(|e| EncryptionError::InvalidKey(e.to_string()))?;
    let oaep = OaepPublicEncryptingKey::new(public)
        .map_err(|e| EncryptionError::InvalidKey(e.to_string()))?;

    let mut out = vec![0u8; oaep.ciphertext_size()];
    let wrapped = oaep
        .encrypt(&OAEP_SHA256_MGF1SHA256, content_key, &mut out, None)
        .map_err(|e| EncryptionError::Encryption(format!("key wrap: {e}")))?;
    Ok(wrapped.to_vec())
}
