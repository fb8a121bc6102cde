//! Relying-party trust metadata.
//!
//! A [`MetadataResolver`] is an opaque lookup-by-entity-ID service. The
//! [`MetadataTrustCache`] sits in front of one and is what the rest of the
//! pipeline talks to.

mod cache;
mod chaining;
mod memory;

pub use cache::{CacheStats, MetadataTrustCache};
pub use chaining::ChainingMetadataResolver;
pub use memory::InMemoryMetadataResolver;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SamlResult;
use crate::types::SamlBinding;

/// Resolved federation metadata for one relying party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustFacade {
    /// Entity ID of the relying party.
    pub entity_id: String,

    /// Assertion Consumer Service endpoints.
    #[serde(default)]
    pub assertion_consumer_services: Vec<AcsEndpoint>,

    /// SP signing certificate (DER).
    #[serde(default, with = "base64_der", skip_serializing_if = "Option::is_none")]
    pub signing_certificate: Option<Vec<u8>>,

    /// SP encryption public key (`SubjectPublicKeyInfo` DER).
    #[serde(default, with = "base64_der", skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<Vec<u8>>,

    /// `WantAssertionsSigned` from the SP's SSO descriptor.
    #[serde(default)]
    pub want_assertions_signed: bool,

    /// Signature algorithm URIs the SP prefers, most preferred first.
    #[serde(default)]
    pub signing_methods: Vec<String>,

    /// `validUntil`; the facade must not be used at or after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,

    /// `cacheDuration` hint in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_duration_secs: Option<u64>,
}

impl TrustFacade {
    /// Creates a facade with no endpoints or keys.
    #[must_use]
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            assertion_consumer_services: Vec::new(),
            signing_certificate: None,
            encryption_key: None,
            want_assertions_signed: false,
            signing_methods: Vec::new(),
            valid_until: None,
            cache_duration_secs: None,
        }
    }

    /// Adds an ACS endpoint.
    #[must_use]
    pub fn with_acs(mut self, endpoint: AcsEndpoint) -> Self {
        self.assertion_consumer_services.push(endpoint);
        self
    }

    /// Sets `want_assertions_signed`.
    #[must_use]
    pub const fn with_want_assertions_signed(mut self, want: bool) -> Self {
        self.want_assertions_signed = want;
        self
    }

    /// Sets the encryption key.
    #[must_use]
    pub fn with_encryption_key(mut self, spki_der: Vec<u8>) -> Self {
        self.encryption_key = Some(spki_der);
        self
    }

    /// Sets `valid_until`.
    #[must_use]
    pub const fn with_valid_until(mut self, valid_until: DateTime<Utc>) -> Self {
        self.valid_until = Some(valid_until);
        self
    }

    /// Returns true if the backing metadata has not expired at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_none_or(|until| now < until)
    }

    /// Selects the ACS for a binding: the default endpoint if one is
    /// flagged, otherwise the lowest index.
    #[must_use]
    pub fn acs_for(&self, binding: SamlBinding) -> Option<&AcsEndpoint> {
        let mut candidates = self
            .assertion_consumer_services
            .iter()
            .filter(|acs| acs.binding == binding.uri());

        let first = candidates.clone().min_by_key(|acs| acs.index);
        candidates.find(|acs| acs.is_default).or(first)
    }
}

/// Assertion Consumer Service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcsEndpoint {
    /// The URL.
    pub location: String,
    /// The binding URI.
    pub binding: String,
    /// Index for this endpoint.
    #[serde(default)]
    pub index: u32,
    /// Whether this is the default endpoint.
    #[serde(default)]
    pub is_default: bool,
}

impl AcsEndpoint {
    /// Creates an endpoint with index 0.
    #[must_use]
    pub fn new(location: impl Into<String>, binding: SamlBinding) -> Self {
        Self {
            location: location.into(),
            binding: binding.uri().to_string(),
            index: 0,
            is_default: false,
        }
    }
}

/// Metadata role descriptor kinds used in entity searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRole {
    /// `IDPSSODescriptor`.
    IdpSso,
    /// `SPSSODescriptor`.
    SpSso,
}

/// Criteria for an entity search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCriteria {
    /// Role the entity must have.
    pub role: EntityRole,
    /// Relying party whose federation scopes the search.
    pub relying_party: String,
}

impl EntityCriteria {
    /// Identity-provider descriptors visible to `relying_party`.
    #[must_use]
    pub fn idp_for(relying_party: impl Into<String>) -> Self {
        Self {
            role: EntityRole::IdpSso,
            relying_party: relying_party.into(),
        }
    }
}

/// A source of federation metadata.
///
/// `Ok(None)` means the source does not know the entity; `Err` means the
/// source could not answer.
#[async_trait]
pub trait MetadataResolver: Send + Sync + 'static {
    /// Resolves a relying party's metadata.
    async fn resolve(&self, entity_id: &str) -> SamlResult<Option<TrustFacade>>;

    /// Returns the entity IDs matching `criteria`.
    async fn find_entities(&self, criteria: &EntityCriteria) -> SamlResult<Vec<String>>;
}

mod base64_der {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_str(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|s| {
            let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
            STANDARD.decode(compact).map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}
