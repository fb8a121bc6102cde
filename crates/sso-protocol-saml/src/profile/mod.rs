//! Assertion construction.
//!
//! Four [`ProfileObjectBuilder`]s each produce one piece of the assertion.
//! The [`AssertionAssembler`] runs them in order, resolves the issuer and
//! hands the result to the signing policy.

mod assembler;
mod attribute;
mod authn;
mod conditions;
mod issuer;
mod subject;

pub use assembler::AssertionAssembler;
pub use attribute::AttributeStatementBuilder;
pub use authn::AuthnStatementBuilder;
pub use conditions::ConditionsBuilder;
pub use issuer::IssuerResolver;
pub use subject::SubjectBuilder;

use chrono::{DateTime, Utc};

use crate::context::{AuthenticatedAssertionContext, IssuanceRequestContext, RelyingPartyDescriptor};
use crate::error::{BuildStage, SamlError, SamlResult};
use crate::metadata::TrustFacade;
use crate::types::{AttributeStatement, AuthnStatement, Conditions, SamlBinding, Subject};

/// Everything a builder may read.
///
/// Builders see the trust facade they are given and nothing else; none of
/// them performs metadata resolution.
#[derive(Debug, Clone, Copy)]
pub struct BuildInput<'a> {
    /// Protocol request and authentication event details.
    pub request: &'a IssuanceRequestContext,
    /// The authenticated principal.
    pub principal: &'a AuthenticatedAssertionContext,
    /// The (possibly request-derived) relying party descriptor.
    pub descriptor: &'a RelyingPartyDescriptor,
    /// The relying party's resolved metadata.
    pub facade: &'a TrustFacade,
    /// Binding used to pick the assertion consumer service.
    pub binding: SamlBinding,
    /// `IssueInstant` of the assertion being assembled.
    pub issue_instant: DateTime<Utc>,
}

/// One structural piece of an assertion.
#[derive(Debug, Clone)]
pub enum StatementFragment {
    /// `<saml2:AuthnStatement>`.
    Authn(AuthnStatement),
    /// `<saml2:AttributeStatement>`, possibly empty.
    Attributes(AttributeStatement),
    /// `<saml2:Subject>`.
    Subject(Subject),
    /// `<saml2:Conditions>`.
    Conditions(Conditions),
}

impl StatementFragment {
    /// The stage that produces this kind of fragment.
    #[must_use]
    pub const fn stage(&self) -> BuildStage {
        match self {
            Self::Authn(_) => BuildStage::AuthnStatement,
            Self::Attributes(_) => BuildStage::AttributeStatement,
            Self::Subject(_) => BuildStage::Subject,
            Self::Conditions(_) => BuildStage::Conditions,
        }
    }

    fn mismatch(&self, expected: BuildStage) -> SamlError {
        SamlError::build(
            expected,
            format!("builder produced a {} fragment", self.stage()),
        )
    }

    /// Unwraps an authentication statement.
    ///
    /// # Errors
    ///
    /// Returns a build error for any other fragment kind.
    pub fn into_authn(self) -> SamlResult<AuthnStatement> {
        match self {
            Self::Authn(s) => Ok(s),
            other => Err(other.mismatch(BuildStage::AuthnStatement)),
        }
    }

    /// Unwraps an attribute statement.
    ///
    /// # Errors
    ///
    /// Returns a build error for any other fragment kind.
    pub fn into_attributes(self) -> SamlResult<AttributeStatement> {
        match self {
            Self::Attributes(s) => Ok(s),
            other => Err(other.mismatch(BuildStage::AttributeStatement)),
        }
    }

    /// Unwraps a subject.
    ///
    /// # Errors
    ///
    /// Returns a build error for any other fragment kind.
    pub fn into_subject(self) -> SamlResult<Subject> {
        match self {
            Self::Subject(s) => Ok(s),
            other => Err(other.mismatch(BuildStage::Subject)),
        }
    }

    /// Unwraps conditions.
    ///
    /// # Errors
    ///
    /// Returns a build error for any other fragment kind.
    pub fn into_conditions(self) -> SamlResult<Conditions> {
        match self {
            Self::Conditions(c) => Ok(c),
            other => Err(other.mismatch(BuildStage::Conditions)),
        }
    }
}

/// Builds one piece of an assertion.
pub trait ProfileObjectBuilder: Send + Sync {
    /// The stage reported when this builder fails.
    fn stage(&self) -> BuildStage;

    /// Produces the fragment.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Build`] tagged with [`Self::stage`].
    fn build(&self, input: &BuildInput<'_>) -> SamlResult<StatementFragment>;
}

/// Assertion lifetime for a relying party: its own override if set,
/// otherwise the configured default.
pub(crate) fn assertion_lifetime(
    descriptor: &RelyingPartyDescriptor,
    configured: chrono::Duration,
    stage: BuildStage,
) -> SamlResult<chrono::Duration> {
    let lifetime = match descriptor.assertion_lifetime_secs {
        Some(secs) => chrono::Duration::try_seconds(secs)
            .ok_or_else(|| SamlError::build(stage, format!("assertion lifetime {secs}s out of range")))?,
        None => configured,
    };

    if lifetime <= chrono::Duration::zero() {
        return Err(SamlError::build(
            stage,
            format!("assertion lifetime must be positive, got {}s", lifetime.num_seconds()),
        ));
    }
    Ok(lifetime)
}

/// The instant `lifetime` after `start`, or a build error if it is not
/// representable.
pub(crate) fn expiry(
    start: DateTime<Utc>,
    lifetime: chrono::Duration,
    stage: BuildStage,
) -> SamlResult<DateTime<Utc>> {
    start.checked_add_signed(lifetime).ok_or_else(|| {
        SamlError::build(
            stage,
            format!("assertion lifetime {}s overflows the validity window", lifetime.num_seconds()),
        )
    })
}
