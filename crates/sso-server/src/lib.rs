//! # sso-server
//!
//! Axum server exposing the SAML assertion issuance pipeline.
//!
//! Services, users and relying-party metadata come from a JSON registry
//! file, optionally extended by metadata files; the IdP signing key from a
//! PEM file.
//!
//! ## Usage
//!
//! ```ignore
//! use sso_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::from_env()?;
//! let server = Server::new(config).await?;
//! server.run().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod providers;
pub mod router;
pub mod state;

pub use config::ServerConfig;
pub use providers::StaticProviders;
pub use router::create_router;
pub use state::issuance_state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use sso_protocol_saml::endpoints::IssuanceState;
use sso_protocol_saml::metadata::MetadataResolver;
use sso_protocol_saml::signature::RsaSigningKey;
use tokio::net::TcpListener;

use crate::providers::load_metadata_file;

/// The issuance server.
pub struct Server {
    config: ServerConfig,
    state: IssuanceState,
}

impl Server {
    /// Loads the registry and signing key and wires the pipeline.
    ///
    /// # Errors
    ///
    /// Fails if the registry or key files cannot be read or parsed.
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let providers = StaticProviders::load(&config.registry_file).await?;

        let key_pem = tokio::fs::read_to_string(&config.signing_key_file)
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "failed to read signing key {}: {e}",
                    config.signing_key_file.display()
                )
            })?;
        let cert_pem = match &config.signing_cert_file {
            Some(path) => Some(tokio::fs::read_to_string(path).await.map_err(|e| {
                anyhow::anyhow!("failed to read signing certificate {}: {e}", path.display())
            })?),
            None => None,
        };
        let key = RsaSigningKey::from_pem(&key_pem, cert_pem.as_deref())?;

        tracing::info!(
            certificate = cert_pem.is_some(),
            "signing key loaded"
        );

        let mut metadata_sources: Vec<Arc<dyn MetadataResolver>> = Vec::new();
        for path in &config.metadata_files {
            metadata_sources.push(Arc::new(load_metadata_file(path).await?));
        }

        let state = issuance_state(&config.issuance, providers, metadata_sources, Arc::new(key));
        Ok(Self { config, state })
    }

    /// Creates a server from already-built state.
    #[must_use]
    pub const fn from_state(config: ServerConfig, state: IssuanceState) -> Self {
        Self { config, state }
    }

    /// Runs the server until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Fails if the listener cannot be bound.
    pub async fn run(self) -> anyhow::Result<()> {
        let app = create_router(self.state);

        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on http://{}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Returns the server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Creates the router without binding a socket.
    pub fn test_router(&self) -> Router {
        create_router(self.state.clone())
    }
}

/// Waits for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
