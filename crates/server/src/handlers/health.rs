//! Health endpoint.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub sites_root_writable: bool,
}

/// GET /v1/health - Health check.
///
/// Unauthenticated so load balancers and uptime checks can reach it. Returns only
/// non-sensitive information. An unreachable metadata store is an error; an
/// unwritable sites root reports `degraded`.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.metadata.health_check().await?;

    let sites_root_writable = match state.storage.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Sites root health check failed");
            false
        }
    };

    Ok(Json(HealthResponse {
        status: if sites_root_writable { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        sites_root_writable,
    }))
}
