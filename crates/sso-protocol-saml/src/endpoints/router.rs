//! Issuance router.

use axum::{Router, routing::get};

use super::issuance::{issue_get, issue_post};
use super::state::IssuanceState;

/// Path of the diagnostic issuance endpoint.
pub const DIAGNOSTIC_PATH: &str = "/idp/profile/saml2/diagnostic";

/// Creates the issuance router.
///
/// | Method   | Path                               | Handler                     |
/// |----------|------------------------------------|-----------------------------|
/// | GET/POST | `/idp/profile/saml2/diagnostic`    | `issue_get` / `issue_post`  |
pub fn issuance_router(state: IssuanceState) -> Router {
    Router::new()
        .route(DIAGNOSTIC_PATH, get(issue_get).post(issue_post))
        .with_state(state)
}
