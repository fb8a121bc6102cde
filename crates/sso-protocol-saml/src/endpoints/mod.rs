//! Issuance endpoint handlers.
//!
//! One diagnostic route drives the whole pipeline from a username, a
//! password and a relying-party entity ID.
//!
//! # Example
//!
//! ```rust,ignore
//! use sso_protocol_saml::endpoints::{IssuanceState, issuance_router};
//!
//! let app = axum::Router::new().merge(issuance_router(state));
//! ```

mod issuance;
mod router;
mod state;

pub use issuance::*;
pub use router::*;
pub use state::*;
