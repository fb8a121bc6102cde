//! The signing gate.

use std::sync::Arc;
use std::time::Duration;

use sso_core::{AuditSink, Event, EventType};

use super::AssertionSigner;
use crate::context::{IssuanceRequestContext, RelyingPartyDescriptor};
use crate::error::{SamlError, SamlResult};
use crate::metadata::TrustFacade;
use crate::types::{Assertion, SamlBinding};

const DEFAULT_SIGNING_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether an assertion must be signed, and who asked for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningDecision {
    /// The registry entry has `signAssertions` set.
    pub required_by_descriptor: bool,
    /// The relying party's metadata has `WantAssertionsSigned` set.
    pub required_by_metadata: bool,
}

impl SigningDecision {
    /// Evaluates the decision for one relying party.
    #[must_use]
    pub const fn evaluate(descriptor: &RelyingPartyDescriptor, facade: &TrustFacade) -> Self {
        Self {
            required_by_descriptor: descriptor.sign_assertions,
            required_by_metadata: facade.want_assertions_signed,
        }
    }

    /// True if either input requires a signature.
    #[must_use]
    pub const fn should_sign(self) -> bool {
        self.required_by_descriptor || self.required_by_metadata
    }

    /// Short label for logs and audit details.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match (self.required_by_descriptor, self.required_by_metadata) {
            (true, true) => "descriptor+metadata",
            (true, false) => "descriptor",
            (false, true) => "metadata",
            (false, false) => "not-required",
        }
    }
}

/// Applies the signing decision to assembled assertions.
///
/// Every decision is logged and audited, including the ones that leave the
/// assertion unsigned.
pub struct SigningPolicy {
    signer: Arc<dyn AssertionSigner>,
    audit: Arc<dyn AuditSink>,
    timeout: Duration,
}

impl SigningPolicy {
    /// Creates a policy delegating to `signer`.
    #[must_use]
    pub fn new(signer: Arc<dyn AssertionSigner>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            signer,
            audit,
            timeout: DEFAULT_SIGNING_TIMEOUT,
        }
    }

    /// Bounds each call to the signer.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Signs the assertion if the relying party requires it.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Signing`] if signing is required and the signer
    /// fails, times out, or hands back an unsigned assertion.
    pub async fn apply(
        &self,
        assertion: Assertion,
        descriptor: &RelyingPartyDescriptor,
        facade: &TrustFacade,
        binding: SamlBinding,
        request: &IssuanceRequestContext,
    ) -> SamlResult<Assertion> {
        let decision = SigningDecision::evaluate(descriptor, facade);
        let assertion_id = assertion.id.clone();

        if !decision.should_sign() {
            tracing::info!(
                assertion_id = %assertion_id,
                entity_id = %descriptor.entity_id,
                "assertion signing not required"
            );
            self.record(
                EventType::AssertionSigningSkipped,
                &assertion_id,
                descriptor,
                request,
                decision,
                None,
            );
            return Ok(assertion);
        }

        let signed = tokio::time::timeout(
            self.timeout,
            self.signer.sign(assertion, descriptor, facade, binding, request),
        )
        .await
        .map_err(|_| SamlError::Signing(format!("signing timed out after {:?}", self.timeout)))
        .and_then(|result| {
            result.map_err(|e| match e {
                SamlError::Signing(_) => e,
                other => SamlError::Signing(other.to_string()),
            })
        })
        .and_then(|signed| {
            if signed.is_signed() {
                Ok(signed)
            } else {
                Err(SamlError::Signing(
                    "signer returned an unsigned assertion".to_string(),
                ))
            }
        });

        match &signed {
            Ok(_) => {
                tracing::info!(
                    assertion_id = %assertion_id,
                    entity_id = %descriptor.entity_id,
                    required_by = decision.reason(),
                    "assertion signed"
                );
                self.record(
                    EventType::AssertionSigned,
                    &assertion_id,
                    descriptor,
                    request,
                    decision,
                    None,
                );
            }
            Err(e) => {
                tracing::warn!(
                    assertion_id = %assertion_id,
                    entity_id = %descriptor.entity_id,
                    required_by = decision.reason(),
                    error = %e,
                    "assertion signing failed"
                );
                self.record(
                    EventType::AssertionSigned,
                    &assertion_id,
                    descriptor,
                    request,
                    decision,
                    Some(e),
                );
            }
        }

        signed
    }

    fn record(
        &self,
        event_type: EventType,
        assertion_id: &str,
        descriptor: &RelyingPartyDescriptor,
        request: &IssuanceRequestContext,
        decision: SigningDecision,
        error: Option<&SamlError>,
    ) {
        let mut event = Event::builder(event_type)
            .relying_party(&descriptor.entity_id)
            .ip_address(request.client_address.as_deref())
            .session(request.session_index.as_deref())
            .detail("assertion_id", assertion_id)
            .detail("signing_required_by", decision.reason());
        if let Some(e) = error {
            event = event.failure(e.to_string());
        }
        self.audit.record(&event.build());
    }
}

impl std::fmt::Debug for SigningPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningPolicy")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
