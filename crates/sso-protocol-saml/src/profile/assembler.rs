use std::sync::Arc;

use chrono::Utc;
use sso_core::IssuanceConfig;

use super::{
    AttributeStatementBuilder, AuthnStatementBuilder, BuildInput, ConditionsBuilder,
    IssuerResolver, ProfileObjectBuilder, StatementFragment, SubjectBuilder,
};
use crate::context::{AuthenticatedAssertionContext, IssuanceRequestContext, RelyingPartyDescriptor};
use crate::encryption::XmlEncrypter;
use crate::error::SamlResult;
use crate::metadata::TrustFacade;
use crate::signature::SigningPolicy;
use crate::types::{Assertion, SamlBinding};

/// Composes the statement builders, issuer resolution and the signing
/// policy into one assertion.
#[derive(Debug)]
pub struct AssertionAssembler {
    authn: AuthnStatementBuilder,
    attributes: AttributeStatementBuilder,
    subject: SubjectBuilder,
    conditions: ConditionsBuilder,
    issuer: IssuerResolver,
    signing: SigningPolicy,
}

impl AssertionAssembler {
    /// Creates an assembler with builders configured from `config`.
    #[must_use]
    pub fn new(issuer: IssuerResolver, signing: SigningPolicy, config: &IssuanceConfig) -> Self {
        let lifetime = config.assertion_lifetime();
        Self {
            authn: AuthnStatementBuilder::new(config.default_authn_context.clone()),
            attributes: AttributeStatementBuilder::new(),
            subject: SubjectBuilder::new(lifetime),
            conditions: ConditionsBuilder::new(lifetime),
            issuer,
            signing,
        }
    }

    /// Enables attribute encryption.
    #[must_use]
    pub fn with_encrypter(mut self, encrypter: Arc<dyn XmlEncrypter>) -> Self {
        self.attributes = self.attributes.with_encrypter(encrypter);
        self
    }

    /// Builds, and if required signs, an assertion.
    ///
    /// # Errors
    ///
    /// - [`crate::SamlError::Build`] naming the failing stage
    /// - [`crate::SamlError::IssuerUnresolved`] if no unique issuer exists
    /// - [`crate::SamlError::Signing`] if a required signature fails
    ///
    /// No partially built assertion is ever returned.
    #[tracing::instrument(
        skip_all,
        fields(entity_id = %descriptor.entity_id, principal = %principal.name())
    )]
    pub async fn assemble(
        &self,
        request: &IssuanceRequestContext,
        principal: &AuthenticatedAssertionContext,
        descriptor: &RelyingPartyDescriptor,
        facade: &TrustFacade,
        binding: SamlBinding,
    ) -> SamlResult<Assertion> {
        let input = BuildInput {
            request,
            principal,
            descriptor,
            facade,
            binding,
            issue_instant: Utc::now(),
        };

        let authn = run(&self.authn, &input)?.into_authn()?;
        let attributes = run(&self.attributes, &input)?.into_attributes()?;
        let issuer = self.issuer.resolve_issuer(descriptor).await?;

        let id = sso_crypto::generate_assertion_id();
        let input = BuildInput {
            issue_instant: Utc::now(),
            ..input
        };
        let shell = Assertion::new(id, issuer, input.issue_instant)
            .with_authn_statement(authn)
            .with_attribute_statement(attributes);

        let subject = run(&self.subject, &input)?.into_subject()?;
        let conditions = run(&self.conditions, &input)?.into_conditions()?;
        let assertion = shell.with_subject(subject).with_conditions(conditions);

        tracing::debug!(
            assertion_id = %assertion.id,
            issuer = %assertion.issuer,
            attributes = assertion.attribute_statement.as_ref().map_or(0, |s| s.len()),
            "assembled assertion"
        );

        self.signing
            .apply(assertion, descriptor, facade, binding, request)
            .await
    }
}

fn run(builder: &dyn ProfileObjectBuilder, input: &BuildInput<'_>) -> SamlResult<StatementFragment> {
    builder.build(input).map_err(|e| e.at_stage(builder.stage()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::AesGcmXmlEncrypter;
    use crate::error::{BuildStage, SamlError};
    use crate::metadata::{InMemoryMetadataResolver, MetadataTrustCache};
    use crate::signature::{RsaSigningKey, XmlAssertionSigner, verify_enveloped_signature};
    use crate::xml;
    use crate::testing::{IDP_ENTITY_ID, SP_ENTITY_ID, alice, recipient_key, recording_sink, sp_facade};

    struct Fixture {
        assembler: AssertionAssembler,
        public_key: Vec<u8>,
    }

    fn fixture(config: &IssuanceConfig) -> Fixture {
        let source = InMemoryMetadataResolver::new().with_idp_entity(IDP_ENTITY_ID);
        let cache = Arc::new(MetadataTrustCache::builder(Arc::new(source)).build());
        let key = RsaSigningKey::generate().unwrap();
        let public_key = key.public_key_der();
        let signing = SigningPolicy::new(
            Arc::new(XmlAssertionSigner::new(Arc::new(key))),
            recording_sink(),
        );

        Fixture {
            assembler: AssertionAssembler::new(IssuerResolver::new(cache), signing, config)
                .with_encrypter(Arc::new(AesGcmXmlEncrypter::new())),
            public_key,
        }
    }

    async fn assemble(
        fixture: &Fixture,
        principal: &AuthenticatedAssertionContext,
        descriptor: &RelyingPartyDescriptor,
        facade: &TrustFacade,
    ) -> SamlResult<Assertion> {
        fixture
            .assembler
            .assemble(
                &IssuanceRequestContext::default(),
                principal,
                descriptor,
                facade,
                SamlBinding::HttpPost,
            )
            .await
    }

    #[tokio::test]
    async fn signed_assertion_for_relying_party_that_wants_signatures() {
        let fixture = fixture(&IssuanceConfig::default());
        let descriptor = RelyingPartyDescriptor::new(SP_ENTITY_ID);
        let facade = sp_facade().with_want_assertions_signed(true);

        let assertion = assemble(&fixture, &alice(), &descriptor, &facade).await.unwrap();

        assert!(assertion.authn_statement.is_some());
        let attributes = assertion.attribute_statement.as_ref().unwrap();
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes.attributes[0].name, "email");
        assert_eq!(attributes.attributes[0].values, vec!["alice@example.org"]);
        assert_eq!(assertion.subject_name(), Some("alice"));
        assert_eq!(assertion.audiences(), vec![SP_ENTITY_ID]);
        assert_eq!(assertion.issuer, IDP_ENTITY_ID);
        assert!(assertion.is_signed());
        verify_enveloped_signature(&assertion, &fixture.public_key).unwrap();
    }

    #[tokio::test]
    async fn digest_covers_canonical_assertion() {
        use base64::Engine;
        use base64::engine::general_purpose::STANDARD;

        let fixture = fixture(&IssuanceConfig::default());
        let descriptor = RelyingPartyDescriptor::new(SP_ENTITY_ID).with_sign_assertions(true);

        let assertion = assemble(&fixture, &alice(), &descriptor, &sp_facade()).await.unwrap();
        let serialized = xml::write_unsigned_assertion(&assertion).unwrap();
        assert!(serialized.contains("SubjectConfirmationData"));
        assert!(!serialized.contains("xmlns:xs="));

        let canonical = xml::canonicalize(&serialized).unwrap();
        assert!(!canonical.contains("/>"));
        assert_eq!(xml::canonicalize(&canonical).unwrap(), canonical);

        let signature = assertion.signature.as_ref().unwrap();
        assert_eq!(
            signature.digest_value,
            STANDARD.encode(sso_crypto::sha256(canonical.as_bytes()))
        );
        assert_ne!(
            signature.digest_value,
            STANDARD.encode(sso_crypto::sha256(serialized.as_bytes()))
        );
        verify_enveloped_signature(&assertion, &fixture.public_key).unwrap();
    }

    #[tokio::test]
    async fn attribute_statement_only_when_non_empty() {
        let fixture = fixture(&IssuanceConfig::default());
        let descriptor = RelyingPartyDescriptor::new(SP_ENTITY_ID);
        let facade = sp_facade();

        let bare = AuthenticatedAssertionContext::new("bob", Vec::new()).unwrap();
        let assertion = assemble(&fixture, &bare, &descriptor, &facade).await.unwrap();
        assert!(assertion.attribute_statement.is_none());

        let only_empty = AuthenticatedAssertionContext::new(
            "bob",
            vec![("groups".to_string(), Vec::new())],
        )
        .unwrap();
        let assertion = assemble(&fixture, &only_empty, &descriptor, &facade).await.unwrap();
        assert!(assertion.attribute_statement.is_none());

        let two = AuthenticatedAssertionContext::new(
            "bob",
            vec![
                ("email".to_string(), vec!["bob@example.org".to_string()]),
                ("role".to_string(), vec!["admin".to_string(), "dev".to_string()]),
            ],
        )
        .unwrap();
        let assertion = assemble(&fixture, &two, &descriptor, &facade).await.unwrap();
        let names: Vec<&str> = assertion
            .attribute_statement
            .as_ref()
            .unwrap()
            .attributes
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["email", "role"]);
    }

    #[tokio::test]
    async fn encrypted_attributes_count_as_content() {
        let fixture = fixture(&IssuanceConfig::default());
        let (_, spki) = recipient_key();
        let descriptor = RelyingPartyDescriptor::new(SP_ENTITY_ID).with_encrypt_attributes(true);
        let facade = sp_facade().with_encryption_key(spki);

        let assertion = assemble(&fixture, &alice(), &descriptor, &facade).await.unwrap();
        let statement = assertion.attribute_statement.unwrap();
        assert!(statement.attributes.is_empty());
        assert_eq!(statement.encrypted_attributes.len(), 1);
    }

    #[tokio::test]
    async fn validity_window_matches_configured_lifetime() {
        let config = IssuanceConfig {
            assertion_lifetime_secs: 120,
            ..IssuanceConfig::default()
        };
        let fixture = fixture(&config);
        let descriptor = RelyingPartyDescriptor::new(SP_ENTITY_ID);

        let assertion = assemble(&fixture, &alice(), &descriptor, &sp_facade()).await.unwrap();
        let conditions = assertion.conditions.as_ref().unwrap();
        let not_before = conditions.not_before.unwrap();
        let not_on_or_after = conditions.not_on_or_after.unwrap();

        assert!(not_before <= assertion.issue_instant);
        assert!(assertion.issue_instant <= not_on_or_after);
        assert_eq!(not_on_or_after - not_before, chrono::Duration::seconds(120));

        let confirmation_expiry = assertion.subject.as_ref().unwrap().subject_confirmations[0]
            .subject_confirmation_data
            .as_ref()
            .unwrap()
            .not_on_or_after
            .unwrap();
        assert!(confirmation_expiry <= not_on_or_after);
    }

    #[tokio::test]
    async fn signing_follows_decision_table() {
        let fixture = fixture(&IssuanceConfig::default());

        for (sign_assertions, want_signed) in [(false, false), (false, true), (true, false), (true, true)] {
            let descriptor = RelyingPartyDescriptor::new(SP_ENTITY_ID).with_sign_assertions(sign_assertions);
            let facade = sp_facade().with_want_assertions_signed(want_signed);

            let assertion = assemble(&fixture, &alice(), &descriptor, &facade).await.unwrap();
            assert_eq!(assertion.is_signed(), sign_assertions || want_signed);
        }
    }

    #[tokio::test]
    async fn identifiers_are_fresh_and_underscore_prefixed() {
        let fixture = fixture(&IssuanceConfig::default());
        let descriptor = RelyingPartyDescriptor::new(SP_ENTITY_ID);

        let a = assemble(&fixture, &alice(), &descriptor, &sp_facade()).await.unwrap();
        let b = assemble(&fixture, &alice(), &descriptor, &sp_facade()).await.unwrap();
        assert!(a.id.starts_with('_'));
        assert_eq!(a.id.len(), 33);
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn builder_failure_names_stage() {
        let fixture = fixture(&IssuanceConfig::default());
        let descriptor = RelyingPartyDescriptor::new(SP_ENTITY_ID);
        let no_acs = TrustFacade::new(SP_ENTITY_ID);

        let err = assemble(&fixture, &alice(), &descriptor, &no_acs).await.unwrap_err();
        assert!(matches!(err, SamlError::Build { stage: BuildStage::Subject, .. }));
    }

    #[tokio::test]
    async fn oversized_lifetime_override_is_a_build_error() {
        let fixture = fixture(&IssuanceConfig::default());
        let mut descriptor = RelyingPartyDescriptor::new(SP_ENTITY_ID);
        descriptor.assertion_lifetime_secs = Some(9_000_000_000_000);

        let err = assemble(&fixture, &alice(), &descriptor, &sp_facade()).await.unwrap_err();
        assert!(matches!(err, SamlError::Build { stage: BuildStage::Subject, .. }));
    }

    #[tokio::test]
    async fn issuer_failure_aborts_assembly() {
        let source = InMemoryMetadataResolver::new();
        let cache = Arc::new(MetadataTrustCache::builder(Arc::new(source)).build());
        let signing = SigningPolicy::new(
            Arc::new(XmlAssertionSigner::new(Arc::new(RsaSigningKey::generate().unwrap()))),
            recording_sink(),
        );
        let assembler =
            AssertionAssembler::new(IssuerResolver::new(cache), signing, &IssuanceConfig::default());

        let err = assembler
            .assemble(
                &IssuanceRequestContext::default(),
                &alice(),
                &RelyingPartyDescriptor::new(SP_ENTITY_ID),
                &sp_facade(),
                SamlBinding::HttpPost,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SamlError::IssuerUnresolved(_)));
    }
}
