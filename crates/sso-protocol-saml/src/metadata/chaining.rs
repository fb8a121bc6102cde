//! Ordered composition of metadata sources.

use std::sync::Arc;

use async_trait::async_trait;

use super::{EntityCriteria, MetadataResolver, TrustFacade};
use crate::error::{SamlError, SamlResult};

/// Consults metadata sources in declared order.
///
/// - `resolve`: the first source that knows the entity wins. A source that
///   does not know it, or fails, is skipped. If nobody knows the entity the
///   first failure is reported, otherwise "not found".
/// - `find_entities`: the first non-empty answer wins, with the same
///   failure reporting.
#[derive(Clone, Default)]
pub struct ChainingMetadataResolver {
    sources: Vec<Arc<dyn MetadataResolver>>,
}

impl ChainingMetadataResolver {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a source with lower precedence than those already added.
    #[must_use]
    pub fn then(mut self, source: Arc<dyn MetadataResolver>) -> Self {
        self.sources.push(source);
        self
    }

    /// Number of sources in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns true if the chain has no sources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl MetadataResolver for ChainingMetadataResolver {
    async fn resolve(&self, entity_id: &str) -> SamlResult<Option<TrustFacade>> {
        let mut first_error: Option<SamlError> = None;

        for (position, source) in self.sources.iter().enumerate() {
            match source.resolve(entity_id).await {
                Ok(Some(facade)) => return Ok(Some(facade)),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(entity_id, position, error = %e, "metadata source failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(None), Err)
    }

    async fn find_entities(&self, criteria: &EntityCriteria) -> SamlResult<Vec<String>> {
        let mut first_error: Option<SamlError> = None;

        for source in &self.sources {
            match source.find_entities(criteria).await {
                Ok(found) if !found.is_empty() => return Ok(found),
                Ok(_) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(Vec::new()), Err)
    }
}
