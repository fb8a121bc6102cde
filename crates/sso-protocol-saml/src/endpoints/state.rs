//! Issuance endpoint state and the collaborators it drives.

use std::collections::BTreeMap;
use std::sync::Arc;

use sso_core::{AuditSink, TracingAuditSink};

use crate::context::RelyingPartyDescriptor;
use crate::encryption::{AesGcmXmlEncrypter, XmlEncrypter};
use crate::error::{SamlError, SamlResult};
use crate::metadata::MetadataTrustCache;
use crate::profile::AssertionAssembler;

/// Registered relying parties.
#[async_trait::async_trait]
pub trait ServiceRegistry: Send + Sync + 'static {
    /// Finds the descriptor registered under `entity_id`.
    async fn find_service_by(&self, entity_id: &str) -> SamlResult<Option<RelyingPartyDescriptor>>;

    /// Rejects relying parties that may not receive assertions.
    ///
    /// The default only admits enabled descriptors.
    async fn ensure_access_allowed(&self, descriptor: &RelyingPartyDescriptor) -> SamlResult<()> {
        if descriptor.enabled {
            Ok(())
        } else {
            Err(SamlError::AccessDenied(format!(
                "relying party {} is disabled",
                descriptor.entity_id
            )))
        }
    }
}

/// A successful credential check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthenticationResult {
    /// Authenticated principal name.
    pub principal: String,
    /// Attributes asserted by the authentication source itself.
    pub attributes: BTreeMap<String, Vec<String>>,
    /// Session established by the authentication, if any.
    pub session_index: Option<String>,
    /// Authentication context class actually used, if known.
    pub authn_context_class: Option<String>,
}

/// Checks credentials on behalf of a relying party.
#[async_trait::async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Authenticates `username` for `service`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Authentication`] for bad credentials.
    async fn authenticate(
        &self,
        service: &RelyingPartyDescriptor,
        username: &str,
        password: &str,
    ) -> SamlResult<AuthenticationResult>;
}

/// Decides which principal attributes a relying party may see.
#[async_trait::async_trait]
pub trait AttributeReleasePolicy: Send + Sync + 'static {
    /// Returns the attributes released to `service`.
    async fn attributes_to_release(
        &self,
        principal: &AuthenticationResult,
        service: &RelyingPartyDescriptor,
    ) -> SamlResult<BTreeMap<String, Vec<String>>>;
}

/// Issuance endpoint state.
#[derive(Clone)]
pub struct IssuanceState {
    /// Registered relying parties.
    pub registry: Arc<dyn ServiceRegistry>,
    /// Credential checks.
    pub authenticator: Arc<dyn Authenticator>,
    /// Attribute release.
    pub release_policy: Arc<dyn AttributeReleasePolicy>,
    /// Relying-party trust.
    pub metadata: MetadataTrustCache,
    /// Assertion pipeline.
    pub assembler: Arc<AssertionAssembler>,
    /// Whole-assertion encryption.
    pub encrypter: Arc<dyn XmlEncrypter>,
    /// Audit destination.
    pub audit: Arc<dyn AuditSink>,
}

impl IssuanceState {
    /// Creates state with the bundled encrypter and the tracing audit sink.
    #[must_use]
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        authenticator: Arc<dyn Authenticator>,
        release_policy: Arc<dyn AttributeReleasePolicy>,
        metadata: MetadataTrustCache,
        assembler: Arc<AssertionAssembler>,
    ) -> Self {
        Self {
            registry,
            authenticator,
            release_policy,
            metadata,
            assembler,
            encrypter: Arc::new(AesGcmXmlEncrypter::new()),
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Replaces the assertion encrypter.
    #[must_use]
    pub fn with_encrypter(mut self, encrypter: Arc<dyn XmlEncrypter>) -> Self {
        self.encrypter = encrypter;
        self
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }
}

impl std::fmt::Debug for IssuanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuanceState")
            .field("metadata", &self.metadata)
            .field("assembler", &self.assembler)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Empty;

    #[async_trait::async_trait]
    impl ServiceRegistry for Empty {
        async fn find_service_by(&self, _: &str) -> SamlResult<Option<RelyingPartyDescriptor>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn disabled_relying_party_is_denied() {
        let mut descriptor = RelyingPartyDescriptor::new("sp");
        assert!(Empty.ensure_access_allowed(&descriptor).await.is_ok());

        descriptor.enabled = false;
        let err = Empty.ensure_access_allowed(&descriptor).await.unwrap_err();
        assert!(matches!(err, SamlError::AccessDenied(_)));
    }
}
