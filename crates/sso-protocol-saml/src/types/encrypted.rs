//! XML Encryption structures carried inside assertions.

use serde::{Deserialize, Serialize};

/// `<xenc:EncryptedData>` with its wrapped content key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    /// Block cipher algorithm URI.
    pub encryption_method: String,
    /// Base64 of `IV || ciphertext || tag`.
    pub cipher_value: String,
    /// The content key, encrypted to the relying party.
    pub encrypted_key: EncryptedKey,
}

impl EncryptedData {
    /// The `Type` attribute: encrypted content is always a whole element.
    pub const TYPE_ELEMENT: &'static str = "http://www.w3.org/2001/04/xmlenc#Element";
}

/// `<xenc:EncryptedKey>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedKey {
    /// Key transport algorithm URI.
    pub encryption_method: String,
    /// OAEP digest method URI.
    pub digest_method: String,
    /// OAEP mask generation function URI.
    pub mgf: String,
    /// Base64 of the wrapped key.
    pub cipher_value: String,
    /// Entity ID of the intended recipient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

/// `<saml2:EncryptedAttribute>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedAttribute {
    /// The encrypted `<saml2:Attribute>`.
    pub encrypted_data: EncryptedData,
}

/// `<saml2:EncryptedAssertion>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedAssertion {
    /// The encrypted `<saml2:Assertion>`.
    pub encrypted_data: EncryptedData,
}
