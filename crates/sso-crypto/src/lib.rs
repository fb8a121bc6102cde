//! # sso-crypto
//!
//! Cryptographic operations for SAML assertion issuance, built on aws-lc-rs.
//!
//! - [`random`]: identifiers and key material from a CSPRNG
//! - [`hash`]: SHA-2 digests for XML-DSig references
//! - [`rsa`]: RSA PKCS#1 v1.5 signing and verification
//! - [`aead`]: AES-256-GCM content encryption and RSA-OAEP key transport

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aead;
pub mod hash;
pub mod random;
pub mod rsa;
pub mod signature;

pub use aead::{EncryptionError, SealedContent, seal_for_recipient};
pub use hash::{HashAlgorithm, digest, sha256, sha384, sha512};
pub use random::{generate_assertion_id, random_alphanumeric, random_bytes};
pub use rsa::{RsaAlgorithm, RsaPrivateKey, rsa_verify};
pub use signature::SignatureError;
