//! Inputs to a single issuance: who authenticated, for which relying party,
//! and what the protocol request asked for.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::types::NameIdFormat;

/// An authenticated principal with the attributes released for one relying
/// party. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedAssertionContext {
    name: String,
    attributes: BTreeMap<String, Vec<String>>,
}

impl AuthenticatedAssertionContext {
    /// Creates a context for the named principal.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidRequest`] if the name is blank.
    pub fn new<I>(name: impl Into<String>, attributes: I) -> SamlResult<Self>
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SamlError::InvalidRequest(
                "principal name must not be empty".to_string(),
            ));
        }

        Ok(Self {
            name,
            attributes: attributes.into_iter().collect(),
        })
    }

    /// The principal name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Released attributes, ordered by name.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, Vec<String>> {
        &self.attributes
    }
}

/// A registered relying party as the service registry knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelyingPartyDescriptor {
    /// SAML entity ID; also the registry key.
    pub entity_id: String,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Issuer to use instead of the IdP's published entity ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_entity_id_override: Option<String>,

    /// Always sign assertions for this relying party.
    #[serde(default)]
    pub sign_assertions: bool,

    /// Encrypt the whole assertion.
    #[serde(default)]
    pub encrypt_assertions: bool,

    /// Encrypt individual attributes.
    #[serde(default)]
    pub encrypt_attributes: bool,

    /// Requested `NameID` format URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_id_format: Option<String>,

    /// `NameFormat` applied to released attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_name_format: Option<String>,

    /// Assertion lifetime in seconds, overriding the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion_lifetime_secs: Option<i64>,

    /// Disabled relying parties fail the access check.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

const fn enabled_by_default() -> bool {
    true
}

impl RelyingPartyDescriptor {
    /// Creates an enabled descriptor with every flag off.
    #[must_use]
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            name: None,
            issuer_entity_id_override: None,
            sign_assertions: false,
            encrypt_assertions: false,
            encrypt_attributes: false,
            name_id_format: None,
            attribute_name_format: None,
            assertion_lifetime_secs: None,
            enabled: true,
        }
    }

    /// Sets the issuer override.
    #[must_use]
    pub fn with_issuer_override(mut self, issuer: impl Into<String>) -> Self {
        self.issuer_entity_id_override = Some(issuer.into());
        self
    }

    /// Sets `sign_assertions`.
    #[must_use]
    pub const fn with_sign_assertions(mut self, sign: bool) -> Self {
        self.sign_assertions = sign;
        self
    }

    /// Sets `encrypt_attributes`.
    #[must_use]
    pub const fn with_encrypt_attributes(mut self, encrypt: bool) -> Self {
        self.encrypt_attributes = encrypt;
        self
    }

    /// Returns the issuer override if it is set and not blank.
    #[must_use]
    pub fn issuer_override(&self) -> Option<&str> {
        self.issuer_entity_id_override
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Returns the requested name ID format, defaulting to unspecified.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidRequest`] for an unknown format URI.
    pub fn requested_name_id_format(&self) -> SamlResult<NameIdFormat> {
        match self.name_id_format.as_deref() {
            None => Ok(NameIdFormat::default()),
            Some(uri) => NameIdFormat::from_uri(uri).ok_or_else(|| {
                SamlError::InvalidRequest(format!("unsupported name ID format: {uri}"))
            }),
        }
    }

    /// Builds a request-scoped copy with the given overrides applied.
    ///
    /// The registry's descriptor is left untouched.
    #[must_use]
    pub fn derive(&self, overrides: &DescriptorOverrides) -> Self {
        Self {
            encrypt_assertions: overrides
                .encrypt_assertions
                .unwrap_or(self.encrypt_assertions),
            encrypt_attributes: overrides
                .encrypt_attributes
                .unwrap_or(self.encrypt_attributes),
            ..self.clone()
        }
    }
}

/// Per-request changes to a [`RelyingPartyDescriptor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorOverrides {
    /// Replaces `encrypt_assertions` when set.
    pub encrypt_assertions: Option<bool>,
    /// Replaces `encrypt_attributes` when set.
    pub encrypt_attributes: Option<bool>,
}

impl DescriptorOverrides {
    /// Overrides both encryption flags with the same value.
    #[must_use]
    pub const fn encryption(encrypt: bool) -> Self {
        Self {
            encrypt_assertions: Some(encrypt),
            encrypt_attributes: Some(encrypt),
        }
    }
}

/// What the protocol request and the authentication event contribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuanceRequestContext {
    /// ID of the `AuthnRequest` being answered.
    pub in_response_to: Option<String>,
    /// Authentication context class used by the authenticator.
    pub authn_context_class: Option<String>,
    /// Authentication session identifier.
    pub session_index: Option<String>,
    /// Client IP address.
    pub client_address: Option<String>,
}
