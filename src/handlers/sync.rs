//! # Sync Trigger Handlers
//!
//! Manual candidate and interview sync. Requests may carry a snapshot of the
//! internal record; without one the event is run against whatever snapshot
//! was pushed earlier. Triggers are throttled per tenant.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{OperatorAuth, TenantExtension, TenantHeader};
use crate::error::{ApiError, validation_error};
use crate::providers::{CandidatePhoto, CandidateRecord, InterviewRecord};
use crate::server::AppState;
use crate::sync::{
    CandidateEvent, CandidateEventData, DispatchResult, InterviewEvent, SyncError, SyncOutcome,
};

const TRIGGER_WINDOW: Duration = Duration::from_secs(60);
const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Deserialize, IntoParams)]
pub struct EntityPath {
    /// Internal entity identifier
    pub id: String,
}

/// Candidate photo for the hire handoff, base64 encoded
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PhotoPayload {
    #[serde(alias = "content_type")]
    pub content_type: String,
    pub data: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSyncRequest {
    /// Target a single provider; every connected provider when absent
    #[serde(default)]
    pub provider: Option<String>,
    pub event: CandidateEvent,
    #[serde(default)]
    pub data: Option<CandidateEventData>,
    /// Current state of the candidate
    #[serde(default)]
    pub candidate: Option<CandidateRecord>,
    #[serde(default)]
    pub photo: Option<PhotoPayload>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSyncRequest {
    #[serde(default)]
    pub provider: Option<String>,
    pub event: InterviewEvent,
    #[serde(default)]
    pub interview: Option<InterviewRecord>,
    /// The interviewed candidate, needed when it has not been synced yet
    #[serde(default)]
    pub candidate: Option<CandidateRecord>,
}

/// Outcome for one provider
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProviderSyncResult {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SyncOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<DispatchResult> for ProviderSyncResult {
    fn from(dispatch: DispatchResult) -> Self {
        match dispatch.result {
            Ok(outcome) => Self {
                provider: dispatch.provider,
                result: Some(outcome),
                error: None,
            },
            Err(err) => Self {
                provider: dispatch.provider,
                result: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncResponse {
    pub results: Vec<ProviderSyncResult>,
}

/// Sync one candidate event
#[utoipa::path(
    post,
    path = "/sync/candidates/{id}",
    security(("bearer_auth" = [])),
    params(TenantHeader, EntityPath),
    request_body = CandidateSyncRequest,
    responses(
        (status = 200, description = "Per-provider outcomes", body = SyncResponse, example = json!({
            "results": [
                { "provider": "greenhouse", "result": { "outcome": "synced", "externalId": "4711" } }
            ]
        })),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown provider or candidate", body = ApiError),
        (status = 429, description = "Too many sync triggers", body = ApiError),
        (status = 502, description = "Provider failed", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn sync_candidate(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    tenant: TenantExtension,
    Path(EntityPath { id }): Path<EntityPath>,
    Json(body): Json<CandidateSyncRequest>,
) -> Result<Json<SyncResponse>, ApiError> {
    let tenant_id = tenant.id();
    throttle(&state, tenant_id).await?;

    if let Some(candidate) = body.candidate {
        ensure_same_id("candidate.id", &candidate.id, &id)?;
        state.snapshots.put_candidate(tenant_id, candidate);
    }
    if let Some(photo) = body.photo {
        state
            .snapshots
            .put_photo(tenant_id, &id, decode_photo(photo)?);
    }

    let results = match body.provider {
        Some(provider) => {
            let outcome = state
                .sync
                .sync_candidate(tenant_id, &provider, &id, body.event, body.data)
                .await?;
            vec![ProviderSyncResult {
                provider,
                result: Some(outcome),
                error: None,
            }]
        }
        None => collect(
            state
                .sync
                .dispatch_candidate(tenant_id, &id, body.event, body.data)
                .await?,
        ),
    };

    Ok(Json(SyncResponse { results }))
}

/// Sync one interview event
#[utoipa::path(
    post,
    path = "/sync/interviews/{id}",
    security(("bearer_auth" = [])),
    params(TenantHeader, EntityPath),
    request_body = InterviewSyncRequest,
    responses(
        (status = 200, description = "Per-provider outcomes", body = SyncResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown provider or interview", body = ApiError),
        (status = 429, description = "Too many sync triggers", body = ApiError),
        (status = 502, description = "Provider failed", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn sync_interview(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    tenant: TenantExtension,
    Path(EntityPath { id }): Path<EntityPath>,
    Json(body): Json<InterviewSyncRequest>,
) -> Result<Json<SyncResponse>, ApiError> {
    let tenant_id = tenant.id();
    throttle(&state, tenant_id).await?;

    if let Some(interview) = body.interview {
        ensure_same_id("interview.id", &interview.id, &id)?;
        if let Some(ref candidate) = body.candidate {
            ensure_same_id("candidate.id", &candidate.id, &interview.candidate_id)?;
        }
        state.snapshots.put_interview(tenant_id, interview);
    }
    if let Some(candidate) = body.candidate {
        state.snapshots.put_candidate(tenant_id, candidate);
    }

    let results = match body.provider {
        Some(provider) => {
            let outcome = state
                .sync
                .sync_interview(tenant_id, &provider, &id, body.event)
                .await?;
            vec![ProviderSyncResult {
                provider,
                result: Some(outcome),
                error: None,
            }]
        }
        None => collect(
            state
                .sync
                .dispatch_interview(tenant_id, &id, body.event)
                .await?,
        ),
    };

    Ok(Json(SyncResponse { results }))
}

fn collect(results: Vec<DispatchResult>) -> Vec<ProviderSyncResult> {
    for dispatch in &results {
        if let Err(SyncError::Provider(err)) = &dispatch.result {
            tracing::warn!(provider = %dispatch.provider, error = %err, "provider sync failed");
        }
    }
    results.into_iter().map(ProviderSyncResult::from).collect()
}

async fn throttle(state: &AppState, tenant_id: Uuid) -> Result<(), ApiError> {
    let limit = state.config.sync_trigger_limit_per_minute;
    let decision = state
        .throttle
        .hit(&format!("sync-trigger:{tenant_id}"), limit, TRIGGER_WINDOW)
        .await?;
    if decision.allowed {
        return Ok(());
    }

    let retry_after = decision.retry_after(Utc::now()).as_secs().max(1);
    tracing::info!(tenant_id = %tenant_id, count = decision.count, "sync trigger throttled");
    Err(ApiError::new(
        StatusCode::TOO_MANY_REQUESTS,
        "RATE_LIMITED",
        &format!("at most {} sync triggers per minute", limit),
    )
    .with_retry_after(retry_after))
}

fn ensure_same_id(field: &str, actual: &str, expected: &str) -> Result<(), ApiError> {
    if actual == expected {
        Ok(())
    } else {
        Err(validation_error(
            "Snapshot does not match the path",
            json!({ field: format!("expected '{}', got '{}'", expected, actual) }),
        ))
    }
}

fn decode_photo(photo: PhotoPayload) -> Result<CandidatePhoto, ApiError> {
    let bytes = general_purpose::STANDARD
        .decode(photo.data.trim())
        .map_err(|_| validation_error("Invalid photo", json!({ "photo.data": "must be base64" })))?;
    if bytes.is_empty() || bytes.len() > MAX_PHOTO_BYTES {
        return Err(validation_error(
            "Invalid photo",
            json!({ "photo.data": "must be between 1 byte and 5 MiB" }),
        ));
    }
    if !photo.content_type.starts_with("image/") {
        return Err(validation_error(
            "Invalid photo",
            json!({ "photo.contentType": "must be an image type" }),
        ));
    }
    Ok(CandidatePhoto {
        content_type: photo.content_type,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_accepts_snake_and_camel_case() {
        let body: CandidateSyncRequest = serde_json::from_value(json!({
            "provider": "lever",
            "event": "stage_changed",
            "data": { "new_stage": "hired" }
        }))
        .unwrap();
        assert_eq!(body.event, CandidateEvent::StageChanged);
        assert_eq!(body.data.unwrap().new_stage.as_deref(), Some("hired"));
    }

    #[test]
    fn photo_must_be_base64_image() {
        let ok = decode_photo(PhotoPayload {
            content_type: "image/png".into(),
            data: general_purpose::STANDARD.encode(b"png-bytes"),
        })
        .unwrap();
        assert_eq!(ok.bytes, b"png-bytes");

        assert!(
            decode_photo(PhotoPayload {
                content_type: "image/png".into(),
                data: "%%%".into(),
            })
            .is_err()
        );
        assert!(
            decode_photo(PhotoPayload {
                content_type: "text/plain".into(),
                data: general_purpose::STANDARD.encode(b"x"),
            })
            .is_err()
        );
    }

    #[test]
    fn dispatch_errors_become_messages() {
        let result: ProviderSyncResult = DispatchResult {
            provider: "hubspot".into(),
            result: Err(SyncError::EntityNotFound {
                entity_type: "candidate",
                id: "c-1".into(),
            }),
        }
        .into();
        assert_eq!(result.error.as_deref(), Some("candidate c-1 not found"));
        assert!(result.result.is_none());
    }
}
