//! Wiring of the issuance pipeline.

use std::sync::Arc;

use sso_core::{AuditSink, IssuanceConfig, TracingAuditSink};
use sso_protocol_saml::encryption::AesGcmXmlEncrypter;
use sso_protocol_saml::endpoints::IssuanceState;
use sso_protocol_saml::metadata::{ChainingMetadataResolver, MetadataResolver, MetadataTrustCache};
use sso_protocol_saml::profile::{AssertionAssembler, IssuerResolver};
use sso_protocol_saml::signature::{SigningKey, SigningPolicy, XmlAssertionSigner};

use crate::providers::StaticProviders;

/// Builds the endpoint state from static providers and an IdP signing key.
///
/// The registry's own metadata takes precedence over `metadata_sources`,
/// which are consulted in order.
#[must_use]
pub fn issuance_state(
    config: &IssuanceConfig,
    providers: StaticProviders,
    metadata_sources: Vec<Arc<dyn MetadataResolver>>,
    signing_key: Arc<dyn SigningKey>,
) -> IssuanceState {
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let encrypter = Arc::new(AesGcmXmlEncrypter::new());

    let chain = metadata_sources.into_iter().fold(
        ChainingMetadataResolver::new().then(Arc::new(providers.metadata_resolver())),
        ChainingMetadataResolver::then,
    );
    tracing::debug!(sources = chain.len(), "metadata sources wired");

    let metadata = MetadataTrustCache::builder(Arc::new(chain))
        .fetch_timeout(config.metadata_timeout())
        .max_ttl(config.metadata_max_cache_ttl())
        .audit_sink(audit.clone())
        .build();

    let signing = SigningPolicy::new(
        Arc::new(XmlAssertionSigner::new(signing_key)),
        audit.clone(),
    )
    .with_timeout(config.signing_timeout());

    let assembler = AssertionAssembler::new(
        IssuerResolver::new(Arc::new(metadata.clone())),
        signing,
        config,
    )
    .with_encrypter(encrypter.clone());

    let providers = Arc::new(providers);
    IssuanceState::new(
        providers.clone(),
        providers.clone(),
        providers,
        metadata,
        Arc::new(assembler),
    )
    .with_encrypter(encrypter)
    .with_audit_sink(audit)
}
