//! Common test utilities and fixtures.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use aws_lc_rs::encoding::AsDer;
use aws_lc_rs::rsa::{KeySize, PrivateDecryptingKey};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use sso_protocol_saml::signature::RsaSigningKey;
use sso_server::{Server, ServerConfig, StaticProviders, issuance_state};
use tokio::sync::oneshot;
use tokio::time::sleep;

pub const IDP_ENTITY_ID: &str = "https://idp.example/idp";
pub const SP_ENTITY_ID: &str = "https://sp.example/acs";
pub const SEALED_SP_ENTITY_ID: &str = "https://sealed.example/acs";
pub const UNRESOLVABLE_SP_ENTITY_ID: &str = "https://nometadata.example/acs";
pub const DIAGNOSTIC_PATH: &str = "/idp/profile/saml2/diagnostic";

/// Running server plus an HTTP client pointed at it.
pub struct TestEnv {
    /// Base URL of the running server.
    pub base_url: String,
    /// HTTP client for testing.
    pub client: Client,
    /// Server shutdown signal.
    _shutdown_tx: oneshot::Sender<()>,
}

impl TestEnv {
    /// Starts a server over the fixture registry.
    pub async fn new() -> anyhow::Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("sso_server=debug,sso_protocol_saml=debug")
            .try_init();

        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        drop(listener);
        let base_url = format!("http://127.0.0.1:{port}");

        let mut config = ServerConfig::for_testing("registry.json", "idp.key");
        config.port = port;

        let providers = StaticProviders::from_json(&registry()?.to_string())?;
        let key = RsaSigningKey::generate()?;
        let state = issuance_state(&config.issuance, providers, Vec::new(), Arc::new(key));
        let server = Server::from_state(config, state);

        let (_shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            tokio::select! {
                result = server.run() => {
                    if let Err(e) = result {
                        tracing::error!("Server error: {}", e);
                    }
                }
                _ = shutdown_rx => {
                    tracing::info!("Server shutdown requested");
                }
            }
        });

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        wait_for_server(&client, &base_url).await?;

        Ok(Self {
            base_url,
            client,
            _shutdown_tx,
        })
    }

    /// URL of the diagnostic endpoint.
    pub fn diagnostic_url(&self) -> String {
        format!("{}{DIAGNOSTIC_PATH}", self.base_url)
    }

    /// Issues a GET against the diagnostic endpoint.
    pub async fn issue(
        &self,
        username: &str,
        password: &str,
        entity_id: &str,
        encrypt: bool,
    ) -> anyhow::Result<reqwest::Response> {
        let encrypt = encrypt.to_string();
        let response = self
            .client
            .get(self.diagnostic_url())
            .query(&[
                ("username", username),
                ("password", password),
                ("entityId", entity_id),
                ("encrypt", encrypt.as_str()),
            ])
            .send()
            .await?;
        Ok(response)
    }
}

/// The fixture registry: alice/wonderland, one signing SP, one SP with an
/// encryption key, and one SP with no metadata.
fn registry() -> anyhow::Result<serde_json::Value> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(b"wonderland", &salt)
        .map_err(|e| anyhow::anyhow!("hashing failed: {e}"))?
        .to_string();

    let recipient = PrivateDecryptingKey::generate(KeySize::Rsa2048)?;
    let spki = STANDARD.encode(recipient.public_key().as_der()?.as_ref());

    let post = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";
    Ok(serde_json::json!({
        "idpEntities": [{ "entityId": IDP_ENTITY_ID }],
        "services": [
            { "entityId": SP_ENTITY_ID, "releasedAttributes": ["email"] },
            { "entityId": SEALED_SP_ENTITY_ID, "releasedAttributes": ["email"] },
            { "entityId": UNRESOLVABLE_SP_ENTITY_ID, "releasedAttributes": ["email"] }
        ],
        "users": [{
            "username": "alice",
            "passwordHash": hash,
            "attributes": {
                "email": ["alice@example.org"],
                "employeeNumber": ["4711"]
            }
        }],
        "metadata": [
            {
                "entityId": SP_ENTITY_ID,
                "assertionConsumerServices": [{ "location": SP_ENTITY_ID, "binding": post }],
                "wantAssertionsSigned": true
            },
            {
                "entityId": SEALED_SP_ENTITY_ID,
                "assertionConsumerServices": [{ "location": SEALED_SP_ENTITY_ID, "binding": post }],
                "encryptionKey": spki
            }
        ]
    }))
}

async fn wait_for_server(client: &Client, base_url: &str) -> anyhow::Result<()> {
    let health = format!("{base_url}/health");
    for _ in 0..50 {
        if let Ok(response) = client.get(&health).send().await {
            if response.status().is_success() {
                return Ok(());
            }
        }
        sleep(Duration::from_millis(100)).await;
    }
    anyhow::bail!("server did not become ready at {base_url}")
}
