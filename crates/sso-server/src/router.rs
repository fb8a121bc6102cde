//! Router configuration.

use axum::{Router, http::StatusCode, response::Json, routing::get};
use serde::Serialize;
use sso_protocol_saml::endpoints::{IssuanceState, issuance_router};
use tower_http::trace::TraceLayer;

/// Creates the application router.
pub fn create_router(state: IssuanceState) -> Router {
    let health = Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness_check));

    Router::new()
        .merge(issuance_router(state))
        .merge(health)
        .layer(TraceLayer::new_for_http())
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn liveness_check() -> StatusCode {
    StatusCode::OK
}
