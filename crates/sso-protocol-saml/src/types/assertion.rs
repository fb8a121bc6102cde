//! SAML Assertion types.
//!
//! Assertions contain statements about a subject made by an issuer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EncryptedAttribute, NameId, SAML_VERSION};
use crate::signature::XmlSignature;

/// SAML Assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assertion {
    /// Unique identifier; always starts with `_`.
    pub id: String,

    /// Version of the SAML protocol (always "2.0").
    pub version: String,

    /// Timestamp when this assertion was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the identity provider that issued this assertion.
    pub issuer: String,

    /// Enveloped signature, present once the assertion has been signed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<XmlSignature>,

    /// The subject of this assertion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,

    /// Conditions that must be evaluated for the assertion to be valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Conditions>,

    /// Authentication statement describing how the subject authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_statement: Option<AuthnStatement>,

    /// Attribute statement; never present when empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute_statement: Option<AttributeStatement>,
}

impl Assertion {
    /// Creates an assertion shell with no statements.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        issuer: impl Into<String>,
        issue_instant: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            version: SAML_VERSION.to_string(),
            issue_instant,
            issuer: issuer.into(),
            signature: None,
            subject: None,
            conditions: None,
            authn_statement: None,
            attribute_statement: None,
        }
    }

    /// Sets the subject.
    #[must_use]
    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Sets the conditions.
    #[must_use]
    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Sets the authentication statement.
    #[must_use]
    pub fn with_authn_statement(mut self, statement: AuthnStatement) -> Self {
        self.authn_statement = Some(statement);
        self
    }

    /// Sets the attribute statement, dropping it if it carries nothing.
    #[must_use]
    pub fn with_attribute_statement(mut self, statement: AttributeStatement) -> Self {
        self.attribute_statement = (!statement.is_empty()).then_some(statement);
        self
    }

    /// Returns true if a signature has been applied.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Returns the subject's name ID value.
    #[must_use]
    pub fn subject_name(&self) -> Option<&str> {
        self.subject
            .as_ref()
            .and_then(|s| s.name_id.as_ref())
            .map(|n| n.value.as_str())
    }

    /// Returns every audience named in the conditions.
    #[must_use]
    pub fn audiences(&self) -> Vec<&str> {
        self.conditions
            .iter()
            .flat_map(|c| &c.audience_restrictions)
            .flat_map(|r| &r.audiences)
            .map(String::as_str)
            .collect()
    }
}

/// Subject of an assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    /// The name identifier for the subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id: Option<NameId>,

    /// Subject confirmation data.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_confirmations: Vec<SubjectConfirmation>,
}

impl Subject {
    /// Creates a new subject with a name ID.
    #[must_use]
    pub fn new(name_id: NameId) -> Self {
        Self {
            name_id: Some(name_id),
            subject_confirmations: Vec::new(),
        }
    }

    /// Adds a subject confirmation.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: SubjectConfirmation) -> Self {
        self.subject_confirmations.push(confirmation);
        self
    }
}

/// Subject confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectConfirmation {
    /// The confirmation method.
    pub method: String,

    /// Additional confirmation data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_confirmation_data: Option<SubjectConfirmationData>,
}

impl SubjectConfirmation {
    /// Bearer confirmation method URI.
    pub const BEARER: &'static str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";

    /// Creates a bearer confirmation.
    #[must_use]
    pub fn bearer(data: SubjectConfirmationData) -> Self {
        Self {
            method: Self::BEARER.to_string(),
            subject_confirmation_data: Some(data),
        }
    }
}

/// Subject confirmation data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectConfirmationData {
    /// The request ID that this assertion responds to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// Time after which the subject can no longer be confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// The location to which the assertion can be presented.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    /// IP address of the subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Conditions for assertion validity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conditions {
    /// Time before which the assertion is not valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    /// Time at or after which the assertion is not valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Audience restrictions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audience_restrictions: Vec<AudienceRestriction>,
}

impl Conditions {
    /// Creates conditions valid from `not_before` up to `not_on_or_after`.
    #[must_use]
    pub fn between(not_before: DateTime<Utc>, not_on_or_after: DateTime<Utc>) -> Self {
        Self {
            not_before: Some(not_before),
            not_on_or_after: Some(not_on_or_after),
            audience_restrictions: Vec::new(),
        }
    }

    /// Adds an audience restriction.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience_restrictions.push(AudienceRestriction {
            audiences: vec![audience.into()],
        });
        self
    }
}

/// Audience restriction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudienceRestriction {
    /// List of valid audiences.
    pub audiences: Vec<String>,
}

/// Authentication statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthnStatement {
    /// The time of authentication.
    pub authn_instant: DateTime<Utc>,

    /// The session index (for session management).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_index: Option<String>,

    /// The authentication context class reference.
    pub authn_context_class_ref: String,

    /// The subject locality information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_locality: Option<SubjectLocality>,
}

/// Subject locality information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectLocality {
    /// IP address of the subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Attribute statement.
///
/// Holds plain and encrypted attributes side by side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeStatement {
    /// Plain attributes.
    #[serde(default)]
    pub attributes: Vec<Attribute>,

    /// Encrypted attributes.
    #[serde(default)]
    pub encrypted_attributes: Vec<EncryptedAttribute>,
}

impl AttributeStatement {
    /// Creates a new empty attribute statement.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attributes: Vec::new(),
            encrypted_attributes: Vec::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attr: Attribute) -> Self {
        self.attributes.push(attr);
        self
    }

    /// Number of plain plus encrypted attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len() + self.encrypted_attributes.len()
    }

    /// Returns true if the statement carries no attribute at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// SAML Attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// The attribute name.
    pub name: String,

    /// The format of the attribute name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_format: Option<String>,

    /// The attribute values.
    pub values: Vec<String>,
}

impl Attribute {
    /// URI name format.
    pub const NAME_FORMAT_URI: &'static str = "urn:oasis:names:tc:SAML:2.0:attrname-format:uri";

    /// Basic name format.
    pub const NAME_FORMAT_BASIC: &'static str =
        "urn:oasis:names:tc:SAML:2.0:attrname-format:basic";

    /// Unspecified name format.
    pub const NAME_FORMAT_UNSPECIFIED: &'static str =
        "urn:oasis:names:tc:SAML:2.0:attrname-format:unspecified";

    /// Creates a new attribute with the given values.
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            name_format: None,
            values,
        }
    }

    /// Sets the name format.
    #[must_use]
    pub fn with_format(mut self, format: Option<impl Into<String>>) -> Self {
        self.name_format = format.map(Into::into);
        self
    }
}
