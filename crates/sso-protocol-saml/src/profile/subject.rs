use super::{BuildInput, ProfileObjectBuilder, StatementFragment, assertion_lifetime, expiry};
use crate::error::{BuildStage, SamlError, SamlResult};
use crate::types::{NameId, Subject, SubjectConfirmation, SubjectConfirmationData};

/// Builds `<saml2:Subject>` with a bearer confirmation bound to the
/// relying party's assertion consumer service.
#[derive(Debug, Clone)]
pub struct SubjectBuilder {
    lifetime: chrono::Duration,
}

impl SubjectBuilder {
    /// Confirmation data expires `lifetime` after the issue instant unless
    /// the relying party overrides it.
    #[must_use]
    pub const fn new(lifetime: chrono::Duration) -> Self {
        Self { lifetime }
    }
}

impl ProfileObjectBuilder for SubjectBuilder {
    fn stage(&self) -> BuildStage {
        BuildStage::Subject
    }

    fn build(&self, input: &BuildInput<'_>) -> SamlResult<StatementFragment> {
        let descriptor = input.descriptor;
        let lifetime = assertion_lifetime(descriptor, self.lifetime, BuildStage::Subject)?;
        let not_on_or_after = expiry(input.issue_instant, lifetime, BuildStage::Subject)?;

        let acs = input.facade.acs_for(input.binding).ok_or_else(|| {
            SamlError::build(
                BuildStage::Subject,
                format!(
                    "relying party {} has no assertion consumer service for {}",
                    descriptor.entity_id,
                    input.binding.uri()
                ),
            )
        })?;

        let format = descriptor
            .requested_name_id_format()
            .map_err(|e| e.at_stage(BuildStage::Subject))?;
        let name_id = NameId::new(input.principal.name())
            .with_format(format)
            .with_sp_name_qualifier(descriptor.entity_id.clone());

        let confirmation = SubjectConfirmation::bearer(SubjectConfirmationData {
            in_response_to: input.request.in_response_to.clone(),
            not_on_or_after: Some(not_on_or_after),
            recipient: Some(acs.location.clone()),
            address: input.request.client_address.clone(),
        });

        Ok(StatementFragment::Subject(
            Subject::new(name_id).with_confirmation(confirmation),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{IssuanceRequestContext, RelyingPartyDescriptor};
    use crate::metadata::{AcsEndpoint, TrustFacade};
    use crate::testing::{SP_ENTITY_ID, alice, input, sp_facade};
    use crate::types::{NameIdFormat, SamlBinding};

    fn five_minutes() -> SubjectBuilder {
        SubjectBuilder::new(chrono::Duration::minutes(5))
    }

    #[test]
    fn bearer_confirmation_targets_acs() {
        let request = IssuanceRequestContext {
            in_response_to: Some("_req-1".into()),
            client_address: Some("192.0.2.10".into()),
            ..Default::default()
        };
        let principal = alice();
        let mut descriptor = RelyingPartyDescriptor::new(SP_ENTITY_ID);
        descriptor.name_id_format = Some(NameIdFormat::Email.uri().into());
        let facade = sp_facade();
        let input = input(&request, &principal, &descriptor, &facade);

        let subject = five_minutes().build(&input).unwrap().into_subject().unwrap();

        let name_id = subject.name_id.unwrap();
        assert_eq!(name_id.value, "alice");
        assert_eq!(name_id.parsed_format(), NameIdFormat::Email);
        assert_eq!(name_id.sp_name_qualifier.as_deref(), Some(SP_ENTITY_ID));

        let confirmation = &subject.subject_confirmations[0];
        assert_eq!(confirmation.method, SubjectConfirmation::BEARER);
        let data = confirmation.subject_confirmation_data.as_ref().unwrap();
        assert_eq!(data.recipient.as_deref(), Some(SP_ENTITY_ID));
        assert_eq!(data.in_response_to.as_deref(), Some("_req-1"));
        assert_eq!(data.address.as_deref(), Some("192.0.2.10"));
        assert_eq!(
            data.not_on_or_after,
            Some(input.issue_instant + chrono::Duration::minutes(5))
        );
    }

    #[test]
    fn missing_acs_for_binding_fails() {
        let request = IssuanceRequestContext::default();
        let principal = alice();
        let descriptor = RelyingPartyDescriptor::new(SP_ENTITY_ID);
        let facade = TrustFacade::new(SP_ENTITY_ID)
            .with_acs(AcsEndpoint::new("https://sp.example/slo", SamlBinding::HttpRedirect));

        let err = five_minutes()
            .build(&input(&request, &principal, &descriptor, &facade))
            .unwrap_err();
        assert!(matches!(err, SamlError::Build { stage: BuildStage::Subject, .. }));
    }

    #[test]
    fn unknown_name_id_format_fails() {
        let request = IssuanceRequestContext::default();
        let principal = alice();
        let mut descriptor = RelyingPartyDescriptor::new(SP_ENTITY_ID);
        descriptor.name_id_format = Some("urn:bogus".into());
        let facade = sp_facade();

        let err = five_minutes()
            .build(&input(&request, &principal, &descriptor, &facade))
            .unwrap_err();
        assert!(matches!(err, SamlError::Build { stage: BuildStage::Subject, .. }));
    }

    #[test]
    fn confirmation_expiry_out_of_range_fails() {
        let request = IssuanceRequestContext::default();
        let principal = alice();
        let mut descriptor = RelyingPartyDescriptor::new(SP_ENTITY_ID);
        descriptor.assertion_lifetime_secs = Some(9_000_000_000_000);
        let facade = sp_facade();

        let err = five_minutes()
            .build(&input(&request, &principal, &descriptor, &facade))
            .unwrap_err();
        assert!(matches!(err, SamlError::Build { stage: BuildStage::Subject, .. }));
    }
}
