//! # Integrations API Handlers
//!
//! Per-tenant integration management: status, sync history, error summaries
//! and connecting or disconnecting a provider.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{OperatorAuth, TenantExtension, TenantHeader};
use crate::error::{ApiError, validation_error};
use crate::models::integration_credential;
use crate::models::sync_log::{self, SyncStatus};
use crate::repositories::ErrorSummaryEntry;
use crate::server::AppState;
use crate::sync::{IntegrationStatus, integration_status};

const DEFAULT_LOG_LIMIT: u64 = 50;
const MAX_LOG_LIMIT: u64 = 200;
const DEFAULT_ERROR_LIMIT: usize = 10;
const MAX_ERROR_WINDOW_HOURS: i64 = 24 * 30;

/// Provider slug path parameter
#[derive(Debug, Deserialize, IntoParams)]
pub struct ProviderPath {
    /// Provider slug (e.g., "lever")
    #[param(min_length = 1, example = "lever")]
    pub provider: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListLogsQuery {
    /// Maximum number of entries (default: 50, max: 200)
    pub limit: Option<u64>,
    /// Only entries in this state (pending, in_progress, success, failed, retrying)
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ErrorSummaryQuery {
    /// Maximum number of distinct errors (default: 10, max: 100)
    pub limit: Option<usize>,
    /// Look-back window in hours (default: 24, max: 720)
    pub hours: Option<i64>,
}

/// One sync attempt
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    #[schema(value_type = String)]
    pub id: Uuid,
    pub event_type: String,
    pub direction: String,
    pub entity_type: String,
    pub entity_id: String,
    pub external_id: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub skipped: bool,
    pub request_payload: Option<JsonValue>,
    pub response_payload: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<sync_log::Model> for SyncLogEntry {
    fn from(model: sync_log::Model) -> Self {
        Self {
            id: model.id,
            event_type: model.event_type,
            direction: model.direction,
            entity_type: model.entity_type,
            entity_id: model.entity_id,
            external_id: model.external_id,
            status: model.status,
            error_message: model.error_message,
            retry_count: model.retry_count,
            skipped: model.skipped,
            request_payload: model.request_payload,
            response_payload: model.response_payload,
            created_at: model.created_at.with_timezone(&Utc),
            completed_at: model.completed_at.map(|at| at.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncLogsResponse {
    /// Newest first
    pub logs: Vec<SyncLogEntry>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummaryResponse {
    pub since: DateTime<Utc>,
    /// Distinct failure messages, most frequent first
    pub errors: Vec<ErrorSummaryEntry>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OAuthExchangeRequest {
    /// Authorization code returned to the redirect URI
    pub code: String,
    #[serde(alias = "redirect_uri")]
    pub redirect_uri: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRequest {
    #[serde(alias = "api_key")]
    pub api_key: String,
    /// Basic-auth username; the key is then sent as the password
    #[serde(default)]
    pub username: Option<String>,
}

impl std::fmt::Debug for ApiKeyRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyRequest")
            .field("api_key", &"[REDACTED]")
            .field("username", &self.username)
            .finish()
    }
}

/// Connection state after a connect call
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedResponse {
    pub provider: String,
    pub status: String,
    pub auth_kind: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<integration_credential::Model> for ConnectedResponse {
    fn from(model: integration_credential::Model) -> Self {
        Self {
            provider: model.provider,
            status: model.status,
            auth_kind: model.auth_kind,
            expires_at: model.expires_at.map(|at| at.with_timezone(&Utc)),
        }
    }
}

/// One open job on the provider side
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RemoteJob {
    /// Provider-side job id
    pub id: String,
    /// Job as returned by the provider
    pub raw: JsonValue,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobsResponse {
    pub jobs: Vec<RemoteJob>,
}

/// Connection health and 24h sync statistics
#[utoipa::path(
    get,
    path = "/integrations/{provider}/status",
    security(("bearer_auth" = [])),
    params(TenantHeader, ProviderPath),
    responses(
        (status = 200, description = "Integration status", body = IntegrationStatus, example = json!({
            "connected": true,
            "tokenValid": true,
            "tokenExpiresAt": "2026-01-01T12:00:00Z",
            "lastSyncAt": "2026-01-01T11:00:00Z",
            "stats24h": { "total": 10, "success": 7, "failed": 3, "successRate": 70 }
        })),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown provider", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn get_status(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    tenant: TenantExtension,
    Path(ProviderPath { provider }): Path<ProviderPath>,
) -> Result<Json<IntegrationStatus>, ApiError> {
    state.registry.get(&provider)?;
    let status = integration_status(&state.credentials, &state.logs, tenant.id(), &provider).await?;
    Ok(Json(status))
}

/// Recent sync attempts, newest first
#[utoipa::path(
    get,
    path = "/integrations/{provider}/logs",
    security(("bearer_auth" = [])),
    params(TenantHeader, ProviderPath, ListLogsQuery),
    responses(
        (status = 200, description = "Recent sync attempts", body = SyncLogsResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown provider", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn list_logs(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    tenant: TenantExtension,
    Path(ProviderPath { provider }): Path<ProviderPath>,
    Query(query): Query<ListLogsQuery>,
) -> Result<Json<SyncLogsResponse>, ApiError> {
    state.registry.get(&provider)?;

    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    if !(1..=MAX_LOG_LIMIT).contains(&limit) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "limit must be between 1 and 200",
        ));
    }
    let status = query
        .status
        .as_deref()
        .map(str::parse::<SyncStatus>)
        .transpose()
        .map_err(|err| validation_error("Invalid status filter", serde_json::json!({ "status": err })))?;

    let logs = state
        .logs
        .list_recent(tenant.id(), &provider, status, limit)
        .await?
        .into_iter()
        .map(SyncLogEntry::from)
        .collect();
    Ok(Json(SyncLogsResponse { logs }))
}

/// Distinct failure messages within a look-back window
#[utoipa::path(
    get,
    path = "/integrations/{provider}/errors",
    security(("bearer_auth" = [])),
    params(TenantHeader, ProviderPath, ErrorSummaryQuery),
    responses(
        (status = 200, description = "Error summary", body = ErrorSummaryResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown provider", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn list_errors(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    tenant: TenantExtension,
    Path(ProviderPath { provider }): Path<ProviderPath>,
    Query(query): Query<ErrorSummaryQuery>,
) -> Result<Json<ErrorSummaryResponse>, ApiError> {
    state.registry.get(&provider)?;

    let limit = query.limit.unwrap_or(DEFAULT_ERROR_LIMIT);
    let hours = query.hours.unwrap_or(24);
    if !(1..=100).contains(&limit) || !(1..=MAX_ERROR_WINDOW_HOURS).contains(&hours) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "limit must be between 1 and 100 and hours between 1 and 720",
        ));
    }

    let since = Utc::now() - Duration::hours(hours);
    let errors = state
        .logs
        .error_summary(tenant.id(), &provider, since, limit)
        .await?;
    Ok(Json(ErrorSummaryResponse { since, errors }))
}

/// Open jobs pulled from a provider with job sync
#[utoipa::path(
    get,
    path = "/integrations/{provider}/jobs",
    security(("bearer_auth" = [])),
    params(TenantHeader, ProviderPath),
    responses(
        (status = 200, description = "Open jobs", body = JobsResponse),
        (status = 400, description = "Provider does not pull jobs", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown or unconnected provider", body = ApiError),
        (status = 502, description = "Provider failed", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    tenant: TenantExtension,
    Path(ProviderPath { provider }): Path<ProviderPath>,
) -> Result<Json<JobsResponse>, ApiError> {
    let adapter = state.registry.get(&provider)?;
    if !adapter.capabilities().job_sync.pulls() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "UNSUPPORTED",
            &format!("{} does not sync jobs", provider),
        ));
    }
    if !state.credentials.is_connected(tenant.id(), &provider).await? {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_CONNECTED",
            &format!("{} is not connected for this tenant", provider),
        ));
    }

    let jobs = state
        .sync
        .list_jobs(tenant.id(), &provider)
        .await?
        .into_iter()
        .map(|record| RemoteJob {
            id: record.id,
            raw: record.raw,
        })
        .collect();
    Ok(Json(JobsResponse { jobs }))
}

/// Complete an OAuth connection with the authorization code
#[utoipa::path(
    post,
    path = "/integrations/{provider}/oauth/exchange",
    security(("bearer_auth" = [])),
    params(TenantHeader, ProviderPath),
    request_body = OAuthExchangeRequest,
    responses(
        (status = 200, description = "Integration connected", body = ConnectedResponse),
        (status = 400, description = "Provider does not use OAuth", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 502, description = "Provider rejected the code", body = ApiError),
        (status = 503, description = "OAuth client not configured", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn exchange_code(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    tenant: TenantExtension,
    Path(ProviderPath { provider }): Path<ProviderPath>,
    Json(body): Json<OAuthExchangeRequest>,
) -> Result<Json<ConnectedResponse>, ApiError> {
    if body.code.trim().is_empty() || body.redirect_uri.trim().is_empty() {
        return Err(validation_error(
            "Validation failed",
            serde_json::json!({ "code": "required", "redirectUri": "required" }),
        ));
    }
    let row = state
        .credentials
        .exchange_code(tenant.id(), &provider, body.code.trim(), body.redirect_uri.trim())
        .await?;
    Ok(Json(row.into()))
}

/// Store an API key for providers that authenticate with one
#[utoipa::path(
    put,
    path = "/integrations/{provider}/api-key",
    security(("bearer_auth" = [])),
    params(TenantHeader, ProviderPath),
    request_body = ApiKeyRequest,
    responses(
        (status = 200, description = "Integration connected", body = ConnectedResponse),
        (status = 400, description = "Validation error or OAuth-only provider", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown provider", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn save_api_key(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    tenant: TenantExtension,
    Path(ProviderPath { provider }): Path<ProviderPath>,
    Json(body): Json<ApiKeyRequest>,
) -> Result<Json<ConnectedResponse>, ApiError> {
    let api_key = body.api_key.trim().to_string();
    if api_key.is_empty() {
        return Err(validation_error(
            "Validation failed",
            serde_json::json!({ "apiKey": "required" }),
        ));
    }
    let username = body.username.filter(|u| !u.trim().is_empty());
    let row = state
        .credentials
        .save_api_key(tenant.id(), &provider, api_key, username)
        .await?;
    Ok(Json(row.into()))
}

/// Remove stored credentials
#[utoipa::path(
    delete,
    path = "/integrations/{provider}",
    security(("bearer_auth" = [])),
    params(TenantHeader, ProviderPath),
    responses(
        (status = 204, description = "Integration disconnected"),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Nothing stored for this provider", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn disconnect(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    tenant: TenantExtension,
    Path(ProviderPath { provider }): Path<ProviderPath>,
) -> Result<StatusCode, ApiError> {
    state.registry.get(&provider)?;
    if state.credentials.disconnect(tenant.id(), &provider).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_CONNECTED",
            &format!("{} is not connected for this tenant", provider),
        ))
    }
}
