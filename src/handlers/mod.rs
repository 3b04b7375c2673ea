//! # API Handlers
//!
//! HTTP endpoint handlers for the ATS sync API.

use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{Value as JsonValue, json};

use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod integrations;
pub mod providers;
pub mod sync;
pub mod webhooks;

pub use crate::auth::TenantHeader;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness plus a database round trip
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service and database are reachable"),
        (status = 503, description = "Database unreachable")
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<JsonValue>) {
    match crate::db::health_check(&state.db).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(err) => {
            tracing::warn!(error = %err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "database": "unreachable" })),
            )
        }
    }
}
