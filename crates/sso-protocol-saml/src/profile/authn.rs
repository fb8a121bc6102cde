use chrono::Utc;
use sso_core::config::DEFAULT_AUTHN_CONTEXT;

use super::{BuildInput, ProfileObjectBuilder, StatementFragment};
use crate::error::{BuildStage, SamlResult};
use crate::types::{AuthnStatement, SubjectLocality};

/// Builds `<saml2:AuthnStatement>`.
#[derive(Debug, Clone)]
pub struct AuthnStatementBuilder {
    default_context: String,
}

impl Default for AuthnStatementBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_AUTHN_CONTEXT)
    }
}

impl AuthnStatementBuilder {
    /// Uses `default_context` when the authentication event names none.
    #[must_use]
    pub fn new(default_context: impl Into<String>) -> Self {
        Self {
            default_context: default_context.into(),
        }
    }
}

impl ProfileObjectBuilder for AuthnStatementBuilder {
    fn stage(&self) -> BuildStage {
        BuildStage::AuthnStatement
    }

    fn build(&self, input: &BuildInput<'_>) -> SamlResult<StatementFragment> {
        let request = input.request;
        Ok(StatementFragment::Authn(AuthnStatement {
            authn_instant: Utc::now(),
            session_index: request.session_index.clone(),
            authn_context_class_ref: request
                .authn_context_class
                .clone()
                .unwrap_or_else(|| self.default_context.clone()),
            subject_locality: request.client_address.clone().map(|address| SubjectLocality {
                address: Some(address),
            }),
        }))
    }
}
