//! RSA PKCS#1 v1.5 signatures for XML-DSig.
//!
//! SAML deployments overwhelmingly sign with `rsa-sha256`, so the SHA-256
//! variant is the default here even though stronger digests are offered.

use aws_lc_rs::{
    rand::SystemRandom,
    rsa::KeySize,
    signature::{self, KeyPair, RsaKeyPair, UnparsedPublicKey},
};

use crate::hash::HashAlgorithm;
use crate::signature::SignatureError;

/// RSA signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RsaAlgorithm {
    /// RSA PKCS#1 v1.5 with SHA-256.
    #[default]
    Rs256,
    /// RSA PKCS#1 v1.5 with SHA-384.
    Rs384,
    /// RSA PKCS#1 v1.5 with SHA-512.
    Rs512,
}

impl RsaAlgorithm {
    /// Returns the XML-DSig algorithm URI.
    #[must_use]
    pub const fn xml_dsig_uri(self) -> &'static str {
        match self {
            Self::Rs256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::Rs384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            Self::Rs512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
        }
    }

    /// Returns the digest paired with this algorithm.
    #[must_use]
    pub const fn hash(self) -> HashAlgorithm {
        match self {
            Self::Rs256 => HashAlgorithm::Sha256,
            Self::Rs384 => HashAlgorithm::Sha384,
            Self::Rs512 => HashAlgorithm::Sha512,
        }
    }

    fn padding(self) -> &'static dyn signature::RsaEncoding {
        match self {
            Self::Rs256 => &signature::RSA_PKCS1_SHA256,
            Self::Rs384 => &signature::RSA_PKCS1_SHA384,
            Self::Rs512 => &signature::RSA_PKCS1_SHA512,
        }
    }
}

/// An RSA private key used to sign assertions.
pub struct RsaPrivateKey {
    key_pair: RsaKeyPair,
}

impl std::fmt::Debug for RsaPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaPrivateKey")
            .field("modulus_len", &self.key_pair.public_modulus_len())
            .finish_non_exhaustive()
    }
}

impl RsaPrivateKey {
    /// Loads a private key from DER (PKCS#1 or PKCS#8).
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid RSA private key.
    pub fn from_der(key_der: &[u8]) -> Result<Self, SignatureError> {
        let key_pair = RsaKeyPair::from_der(key_der)
            .or_else(|_| RsaKeyPair::from_pkcs8(key_der))
            .map_err(|e| SignatureError::InvalidKey(format!("invalid RSA key: {e}")))?;
        Ok(Self { key_pair })
    }

    /// Generates a fresh 2048-bit key.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate() -> Result<Self, SignatureError> {
        let key_pair = RsaKeyPair::generate(KeySize::Rsa2048)
            .map_err(|e| SignatureError::KeyGeneration(e.to_string()))?;
        Ok(Self { key_pair })
    }

    /// Returns the public key as PKCS#1 `RSAPublicKey` DER.
    #[must_use]
    pub fn public_key_der(&self) -> Vec<u8> {
        self.key_pair.public_key().as_ref().to_vec()
    }

    /// Signs data with the given algorithm.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign(&self, algorithm: RsaAlgorithm, data: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let rng = SystemRandom::new();
        let mut sig = vec![0u8; self.key_pair.public_modulus_len()];

        self.key_pair
            .sign(algorithm.padding(), &rng, data, &mut sig)
            .map_err(|e| SignatureError::Signing(format!("RSA signing failed: {e}")))?;

        Ok(sig)
    }
}

/// Verifies an RSA signature.
///
/// `public_key_der` may be PKCS#1 `RSAPublicKey` or `SubjectPublicKeyInfo`.
///
/// # Errors
///
/// Returns [`SignatureError::Verification`] if the signature does not match.
pub fn rsa_verify(
    public_key_der: &[u8],
    data: &[u8],
    sig: &[u8],
    algorithm: RsaAlgorithm,
) -> Result<(), SignatureError> {
    let verification_alg: &dyn signature::VerificationAlgorithm = match algorithm {
        RsaAlgorithm::Rs256 => &signature::RSA_PKCS1_2048_8192_SHA256,
        RsaAlgorithm::Rs384 => &signature::RSA_PKCS1_2048_8192_SHA384,
        RsaAlgorithm::Rs512 => &signature::RSA_PKCS1_2048_8192_SHA512,
    };

    UnparsedPublicKey::new(verification_alg, public_key_der)
        .verify(data, sig)
        .map_err(|_| SignatureError::Verification)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_uris() {
        assert!(RsaAlgorithm::Rs256.xml_dsig_uri().ends_with("rsa-sha256"));
        assert!(RsaAlgorithm::Rs384.xml_dsig_uri().ends_with("rsa-sha384"));
        assert_eq!(RsaAlgorithm::default(), RsaAlgorithm::Rs256);
        assert_eq!(RsaAlgorithm::Rs512.hash(), HashAlgorithm::Sha512);
    }

    #[test]
    fn sign_then_verify() {
        let key = RsaPrivateKey::generate().unwrap();
        let sig = key.sign(RsaAlgorithm::Rs256, b"signed info").unwrap();
        assert_eq!(sig.len(), 256);

        let public = key.public_key_der();
        rsa_verify(&public, b"signed info", &sig, RsaAlgorithm::Rs256).unwrap();
        assert!(matches!(
            rsa_verify(&public, b"tampered", &sig, RsaAlgorithm::Rs256),
            Err(SignatureError::Verification)
        ));
    }

    #[test]
    fn garbage_key_is_rejected() {
        assert!(matches!(
            RsaPrivateKey::from_der(b"not a key"),
            Err(SignatureError::InvalidKey(_))
        ));
    }
}
