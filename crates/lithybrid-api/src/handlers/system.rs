//! Health and API description endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::{OpenApi, ToSchema};

use crate::openapi::ApiDoc;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StoreHealth {
    pub backend: String,
    pub reachable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_jobs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` or `unhealthy`.
    pub status: String,
    pub version: String,
    pub store: StoreHealth,
}

/// Liveness plus job store reachability.
#[utoipa::path(get, path = "/health", tag = "System",
    responses(
        (status = 200, description = "Server and store are up", body = HealthResponse),
        (status = 503, description = "Store unreachable", body = HealthResponse)
    ))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let backend = state.store.backend_name().to_string();
    let reachable = match state.store.health_check().await {
        Ok(()) => true,
        Err(e) => {
            warn!(subsystem = "api", backend = %backend, error = %e, "Store health check failed");
            false
        }
    };
    let pending_jobs = if reachable {
        state.store.pending_count().await.ok()
    } else {
        None
    };

    let status = if reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthResponse {
        status: if reachable { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: StoreHealth {
            backend,
            reachable,
            pending_jobs,
        },
    };
    (status, Json(body))
}

/// OpenAPI document for this server.
pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
