use std::sync::Arc;

use super::{BuildInput, ProfileObjectBuilder, StatementFragment};
use crate::encryption::XmlEncrypter;
use crate::error::{BuildStage, SamlError, SamlResult};
use crate::types::{Attribute, AttributeStatement, EncryptedAttribute};
use crate::xml;

/// Builds `<saml2:AttributeStatement>`.
///
/// The statement may come back empty; dropping it is the assembler's call.
#[derive(Clone, Default)]
pub struct AttributeStatementBuilder {
    encrypter: Option<Arc<dyn XmlEncrypter>>,
}

impl AttributeStatementBuilder {
    /// Creates a builder that cannot encrypt.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables attribute encryption through `encrypter`.
    #[must_use]
    pub fn with_encrypter(mut self, encrypter: Arc<dyn XmlEncrypter>) -> Self {
        self.encrypter = Some(encrypter);
        self
    }

    fn encrypt(
        &self,
        attribute: &Attribute,
        input: &BuildInput<'_>,
    ) -> SamlResult<EncryptedAttribute> {
        let encrypter = self.encrypter.as_deref().ok_or_else(|| {
            SamlError::build(
                BuildStage::AttributeStatement,
                "attribute encryption requested but no encrypter is configured",
            )
        })?;
        let plaintext = xml::write_attribute(attribute)?;
        Ok(EncryptedAttribute {
            encrypted_data: encrypter.encrypt(&plaintext, input.facade)?,
        })
    }
}

impl ProfileObjectBuilder for AttributeStatementBuilder {
    fn stage(&self) -> BuildStage {
        BuildStage::AttributeStatement
    }

    fn build(&self, input: &BuildInput<'_>) -> SamlResult<StatementFragment> {
        let descriptor = input.descriptor;
        let mut statement = AttributeStatement::new();

        for (name, values) in input.principal.attributes() {
            if values.is_empty() {
                continue;
            }
            let attribute = Attribute::new(name.clone(), values.clone())
                .with_format(descriptor.attribute_name_format.clone());

            if descriptor.encrypt_attributes {
                let encrypted = self
                    .encrypt(&attribute, input)
                    .map_err(|e| e.at_stage(BuildStage::AttributeStatement))?;
                statement.encrypted_attributes.push(encrypted);
            } else {
                statement.attributes.push(attribute);
            }
        }

        tracing::debug!(
            entity_id = %descriptor.entity_id,
            plain = statement.attributes.len(),
            encrypted = statement.encrypted_attributes.len(),
            "built attribute statement"
        );
        Ok(StatementFragment::Attributes(statement))
    }
}

impl std::fmt::Debug for AttributeStatementBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeStatementBuilder")
            .field("encrypts", &self.encrypter.is_some())
            .finish()
    }
}
