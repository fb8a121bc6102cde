//! Static providers loaded from a JSON registry file.
//!
//! The registry carries everything the issuance endpoint needs from the
//! outside world:
//!
//! ```json
//! {
//!   "idpEntities": [{ "entityId": "https://idp.example/idp" }],
//!   "services": [{ "entityId": "https://sp.example/acs", "releasedAttributes": ["email"] }],
//!   "users": [{ "username": "alice", "passwordHash": "$argon2id$...", "attributes": {} }],
//!   "metadata": [{ "entityId": "https://sp.example/acs", "assertionConsumerServices": [] }]
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordVerifier},
};
use async_trait::async_trait;
use serde::Deserialize;
use sso_protocol_saml::endpoints::{
    AttributeReleasePolicy, AuthenticationResult, Authenticator, ServiceRegistry,
};
use sso_protocol_saml::metadata::{InMemoryMetadataResolver, TrustFacade};
use sso_protocol_saml::{RelyingPartyDescriptor, SamlError, SamlResult};

/// On-disk registry layout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryFile {
    /// The IdP's own entity descriptors.
    #[serde(default)]
    pub idp_entities: Vec<IdpEntity>,

    /// Registered relying parties.
    #[serde(default)]
    pub services: Vec<ServiceEntry>,

    /// Local accounts.
    #[serde(default)]
    pub users: Vec<UserEntry>,

    /// Relying-party federation metadata.
    #[serde(default)]
    pub metadata: Vec<TrustFacade>,
}

/// An IdP entity descriptor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpEntity {
    /// Entity ID.
    pub entity_id: String,

    /// Relying parties whose federation includes this entity; all when absent.
    #[serde(default)]
    pub relying_parties: Option<Vec<String>>,
}

/// A registered relying party with its attribute release allow-list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    /// The descriptor.
    #[serde(flatten)]
    pub descriptor: RelyingPartyDescriptor,

    /// Attribute names released to this relying party.
    #[serde(default)]
    pub released_attributes: Vec<String>,
}

/// A local account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntry {
    /// Login name; also the principal name.
    pub username: String,

    /// Argon2 PHC string.
    pub password_hash: String,

    /// Principal attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
}

/// Registry, authenticator and release policy over a [`RegistryFile`].
#[derive(Debug, Clone)]
pub struct StaticProviders {
    services: Arc<HashMap<String, ServiceEntry>>,
    users: Arc<HashMap<String, UserEntry>>,
    registry: Arc<RegistryFile>,
}

impl StaticProviders {
    /// Creates providers from a parsed registry.
    #[must_use]
    pub fn new(registry: RegistryFile) -> Self {
        let services = registry
            .services
            .iter()
            .map(|s| (s.descriptor.entity_id.clone(), s.clone()))
            .collect();
        let users = registry
            .users
            .iter()
            .map(|u| (u.username.clone(), u.clone()))
            .collect();

        Self {
            services: Arc::new(services),
            users: Arc::new(users),
            registry: Arc::new(registry),
        }
    }

    /// Parses a registry document.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// Loads a registry file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to read registry {}: {e}", path.display()))?;
        let providers = Self::from_json(&json)?;

        tracing::info!(
            path = %path.display(),
            services = providers.services.len(),
            users = providers.users.len(),
            metadata = providers.registry.metadata.len(),
            "registry loaded"
        );
        Ok(providers)
    }

    /// Builds the in-memory metadata source for this registry.
    #[must_use]
    pub fn metadata_resolver(&self) -> InMemoryMetadataResolver {
        let resolver = InMemoryMetadataResolver::new();
        for facade in &self.registry.metadata {
            resolver.insert(facade.clone());
        }
        for idp in &self.registry.idp_entities {
            match &idp.relying_parties {
                Some(scope) => resolver.add_scoped_idp_entity(idp.entity_id.clone(), scope.clone()),
                None => resolver.add_idp_entity(idp.entity_id.clone()),
            }
        }
        resolver
    }
}

/// Parses a metadata document: a JSON array of relying-party facades.
///
/// # Errors
///
/// Fails on malformed JSON.
pub fn metadata_from_json(json: &str) -> anyhow::Result<InMemoryMetadataResolver> {
    let facades: Vec<TrustFacade> = serde_json::from_str(json)?;
    let resolver = InMemoryMetadataResolver::new();
    for facade in facades {
        resolver.insert(facade);
    }
    Ok(resolver)
}

/// Loads a metadata file.
///
/// # Errors
///
/// Fails if the file cannot be read or parsed.
pub async fn load_metadata_file(path: &Path) -> anyhow::Result<InMemoryMetadataResolver> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to read metadata {}: {e}", path.display()))?;
    let resolver = metadata_from_json(&json)
        .map_err(|e| anyhow::anyhow!("invalid metadata {}: {e}", path.display()))?;

    tracing::info!(path = %path.display(), "metadata file loaded");
    Ok(resolver)
}

#[async_trait]
impl ServiceRegistry for StaticProviders {
    async fn find_service_by(&self, entity_id: &str) -> SamlResult<Option<RelyingPartyDescriptor>> {
        Ok(self.services.get(entity_id).map(|s| s.descriptor.clone()))
    }
}

#[async_trait]
impl Authenticator for StaticProviders {
    async fn authenticate(
        &self,
        service: &RelyingPartyDescriptor,
        username: &str,
        password: &str,
    ) -> SamlResult<AuthenticationResult> {
        let rejected = || SamlError::Authentication(format!("invalid credentials for {username}"));

        let Some(user) = self.users.get(username) else {
            tracing::debug!(username, "unknown user");
            return Err(rejected());
        };

        let hash = user.password_hash.clone();
        let password = password.to_string();
        let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| SamlError::Authentication(format!("password check aborted: {e}")))?;

        if !verified {
            tracing::debug!(username, entity_id = %service.entity_id, "password mismatch");
            return Err(rejected());
        }

        Ok(AuthenticationResult {
            principal: user.username.clone(),
            attributes: BTreeMap::new(),
            session_index: Some(sso_crypto::generate_assertion_id()),
            authn_context_class: None,
        })
    }
}

#[async_trait]
impl AttributeReleasePolicy for StaticProviders {
    async fn attributes_to_release(
        &self,
        principal: &AuthenticationResult,
        service: &RelyingPartyDescriptor,
    ) -> SamlResult<BTreeMap<String, Vec<String>>> {
        let (Some(user), Some(entry)) = (
            self.users.get(&principal.principal),
            self.services.get(&service.entity_id),
        ) else {
            return Ok(BTreeMap::new());
        };

        Ok(user
            .attributes
            .iter()
            .filter(|(name, _)| entry.released_attributes.iter().any(|r| r == *name))
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect())
    }
}

/// Checks a password against an Argon2 PHC string.
///
/// Malformed hashes never verify.
fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        tracing::warn!("stored password hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
