use super::{BuildInput, ProfileObjectBuilder, StatementFragment, assertion_lifetime, expiry};
use crate::error::{BuildStage, SamlResult};
use crate::types::Conditions;

/// Builds `<saml2:Conditions>`: the validity window starting at the issue
/// instant and one audience restriction naming the relying party.
#[derive(Debug, Clone)]
pub struct ConditionsBuilder {
    lifetime: chrono::Duration,
}

impl ConditionsBuilder {
    /// Uses `lifetime` unless the relying party overrides it.
    #[must_use]
    pub const fn new(lifetime: chrono::Duration) -> Self {
        Self { lifetime }
    }
}

impl ProfileObjectBuilder for ConditionsBuilder {
    fn stage(&self) -> BuildStage {
        BuildStage::Conditions
    }

    fn build(&self, input: &BuildInput<'_>) -> SamlResult<StatementFragment> {
        let lifetime = assertion_lifetime(input.descriptor, self.lifetime, BuildStage::Conditions)?;
        let not_on_or_after = expiry(input.issue_instant, lifetime, BuildStage::Conditions)?;
        Ok(StatementFragment::Conditions(
            Conditions::between(input.issue_instant, not_on_or_after)
                .with_audience(input.descriptor.entity_id.clone()),
        ))
    }
}
