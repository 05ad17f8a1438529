//! Health check handler.

use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health: liveness probe for containers and load balancers.
/// Unauthenticated by design; carries no tenant data.
pub async fn health_check() -> Response {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
    .into_response()
}
