use std::sync::Arc;

use crate::context::RelyingPartyDescriptor;
use crate::error::{SamlError, SamlResult};
use crate::metadata::{EntityCriteria, MetadataTrustCache};

/// Determines the `<saml2:Issuer>` of an assertion.
#[derive(Debug, Clone)]
pub struct IssuerResolver {
    cache: Arc<MetadataTrustCache>,
}

impl IssuerResolver {
    /// Looks up identity-provider entities through `cache`.
    #[must_use]
    pub const fn new(cache: Arc<MetadataTrustCache>) -> Self {
        Self { cache }
    }

    /// Returns the relying party's issuer override if set, otherwise the
    /// single identity-provider entity visible to it.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::IssuerUnresolved`] if the lookup fails or does
    /// not yield exactly one candidate.
    #[tracing::instrument(level = "trace", skip_all, fields(entity_id = %descriptor.entity_id))]
    pub async fn resolve_issuer(&self, descriptor: &RelyingPartyDescriptor) -> SamlResult<String> {
        if let Some(issuer) = descriptor.issuer_override() {
            tracing::trace!(issuer, "using issuer override");
            return Ok(issuer.to_string());
        }

        let criteria = EntityCriteria::idp_for(descriptor.entity_id.clone());
        let mut candidates = self.cache.find_entities(&criteria).await.map_err(|e| {
            SamlError::IssuerUnresolved(format!(
                "identity provider lookup for {} failed: {e}",
                descriptor.entity_id
            ))
        })?;

        match candidates.len() {
            1 => {
                let issuer = candidates.swap_remove(0);
                tracing::trace!(issuer = %issuer, "resolved issuer from metadata");
                Ok(issuer)
            }
            0 => Err(SamlError::IssuerUnresolved(format!(
                "no identity provider entity is visible to {}",
                descriptor.entity_id
            ))),
            n => Err(SamlError::IssuerUnresolved(format!(
                "{n} identity provider entities are visible to {}",
                descriptor.entity_id
            ))),
        }
    }
}
