//! SAML 2.0 assertion issuance.
//!
//! Turns an authenticated principal and a relying party into a
//! protocol-ready `<saml2:Assertion>`:
//!
//! - [`metadata`] - Relying-party trust resolution with a single-flight cache
//! - [`profile`] - Statement builders, issuer resolution and assertion assembly
//! - [`signature`] - Signing policy and the enveloped XML-DSig signer
//! - [`encryption`] - XML Encryption of attributes and assertions
//! - [`xml`] - Wire serialization of the assertion model
//! - [`endpoints`] - Axum handlers for the diagnostic issuance endpoint
//! - [`error`] - Error types for the pipeline
//!
//! # Example
//!
//! ```rust,ignore
//! use sso_protocol_saml::endpoints::issuance_router;
//!
//! let app = axum::Router::new().merge(issuance_router(state));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod encryption;
pub mod endpoints;
pub mod error;
pub mod metadata;
pub mod profile;
pub mod signature;
pub mod types;
pub mod xml;

#[cfg(test)]
mod testing;

pub use context::{
    AuthenticatedAssertionContext, DescriptorOverrides, IssuanceRequestContext,
    RelyingPartyDescriptor,
};
pub use error::{BuildStage, SamlError, SamlResult};
pub use types::*;
