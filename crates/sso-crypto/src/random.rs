//! Cryptographically secure random generation.
//!
//! Used for assertion identifiers and per-message content keys. Everything
//! here draws from the thread-local CSPRNG.

use rand::Rng;
use rand::distr::{Alphanumeric, SampleString};

/// Length of the random part of an assertion identifier.
///
/// 32 alphanumeric characters carry roughly 190 bits of entropy.
pub const ASSERTION_ID_RANDOM_LEN: usize = 32;

/// Generates a cryptographically secure random byte array.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates a cryptographically secure random alphanumeric string.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    Alphanumeric.sample_string(&mut rng, len)
}

/// Generates a fresh SAML assertion identifier.
///
/// XML `ID` values are NCNames and may not start with a digit, so the
/// identifier is always prefixed with an underscore.
#[must_use]
pub fn generate_assertion_id() -> String {
    let mut id = String::with_capacity(ASSERTION_ID_RANDOM_LEN + 1);
    id.push('_');
    id.push_str(&random_alphanumeric(ASSERTION_ID_RANDOM_LEN));
    id
}
