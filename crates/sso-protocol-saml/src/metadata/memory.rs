//! Static, in-process metadata.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::{EntityCriteria, EntityRole, MetadataResolver, TrustFacade};
use crate::error::SamlResult;

/// An identity-provider entity, optionally scoped to some relying parties.
#[derive(Debug, Clone)]
struct IdpEntity {
    entity_id: String,
    /// `None` means visible to every relying party.
    relying_parties: Option<Vec<String>>,
}

/// Metadata held in memory, loaded from configuration or built in tests.
#[derive(Debug, Default)]
pub struct InMemoryMetadataResolver {
    relying_parties: DashMap<String, TrustFacade>,
    idp_entities: RwLock<Vec<IdpEntity>>,
}

impl InMemoryMetadataResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a relying party's metadata.
    pub fn insert(&self, facade: TrustFacade) {
        self.relying_parties.insert(facade.entity_id.clone(), facade);
    }

    /// Removes a relying party.
    pub fn remove(&self, entity_id: &str) -> Option<TrustFacade> {
        self.relying_parties.remove(entity_id).map(|(_, f)| f)
    }

    /// Publishes an IdP entity visible to every relying party.
    pub fn add_idp_entity(&self, entity_id: impl Into<String>) {
        self.idp_entities.write().push(IdpEntity {
            entity_id: entity_id.into(),
            relying_parties: None,
        });
    }

    /// Publishes an IdP entity visible only to the given relying parties.
    pub fn add_scoped_idp_entity<I, S>(&self, entity_id: impl Into<String>, relying_parties: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.idp_entities.write().push(IdpEntity {
            entity_id: entity_id.into(),
            relying_parties: Some(relying_parties.into_iter().map(Into::into).collect()),
        });
    }

    /// Builder form of [`Self::insert`].
    #[must_use]
    pub fn with_relying_party(self, facade: TrustFacade) -> Self {
        self.insert(facade);
        self
    }

    /// Builder form of [`Self::add_idp_entity`].
    #[must_use]
    pub fn with_idp_entity(self, entity_id: impl Into<String>) -> Self {
        self.add_idp_entity(entity_id);
        self
    }
}

#[async_trait]
impl MetadataResolver for InMemoryMetadataResolver {
    async fn resolve(&self, entity_id: &str) -> SamlResult<Option<TrustFacade>> {
        Ok(self.relying_parties.get(entity_id).map(|f| f.value().clone()))
    }

    async fn find_entities(&self, criteria: &EntityCriteria) -> SamlResult<Vec<String>> {
        match criteria.role {
            EntityRole::IdpSso => Ok(self
                .idp_entities
                .read()
                .iter()
                .filter(|idp| {
                    idp.relying_parties
                        .as_ref()
                        .is_none_or(|rps| rps.iter().any(|rp| *rp == criteria.relying_party))
                })
                .map(|idp| idp.entity_id.clone())
                .collect()),
            EntityRole::SpSso => Ok(self
                .relying_parties
                .contains_key(&criteria.relying_party)
                .then(|| criteria.relying_party.clone())
                .into_iter()
                .collect()),
        }
    }
}
