//! # Webhook Handlers
//!
//! Public endpoint for provider callbacks. The tenant is part of the path,
//! the body must carry a valid signature, and every accepted delivery is
//! recorded as an inbound sync log entry.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{ApiError, validation_error};
use crate::models::sync_log::SyncDirection;
use crate::repositories::NewSyncLog;
use crate::server::AppState;
use crate::webhook_verification::verify_request;

const WEBHOOK_ENTITY: &str = "webhook";

/// Path parameters for public webhook routes
#[derive(Debug, Deserialize, IntoParams)]
pub struct ProviderTenantPath {
    /// Provider slug (e.g., "greenhouse")
    #[param(min_length = 1, example = "greenhouse")]
    pub provider: String,
    /// Tenant the webhook belongs to
    #[param(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub tenant_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAcceptResponse {
    pub status: String,
    #[schema(value_type = String)]
    pub log_id: Uuid,
}

/// Receive a signed provider webhook
#[utoipa::path(
    post,
    path = "/webhooks/{provider}/{tenant_id}",
    params(ProviderTenantPath),
    request_body(content = String, description = "Raw provider payload", content_type = "application/json"),
    responses(
        (status = 202, description = "Webhook accepted", body = WebhookAcceptResponse),
        (status = 400, description = "Invalid tenant or payload", body = ApiError),
        (status = 401, description = "Missing or invalid signature", body = ApiError),
        (status = 404, description = "Unknown provider or provider without webhooks", body = ApiError),
        (status = 503, description = "Webhook secret not configured", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(path): Path<ProviderTenantPath>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookAcceptResponse>), ApiError> {
    let adapter = state.registry.get(&path.provider)?;
    let tenant_id = Uuid::parse_str(&path.tenant_id).map_err(|_| {
        validation_error(
            "Invalid tenant ID",
            serde_json::json!({ "tenant_id": "Must be a valid UUID" }),
        )
    })?;

    let secret = state.config.provider(adapter.slug()).webhook_secret;
    if let Err(err) = verify_request(adapter.as_ref(), &headers, &body, secret.as_deref()) {
        warn!(provider = adapter.slug(), tenant_id = %tenant_id, error = %err, "webhook rejected");
        return Err(err.into());
    }

    let payload: JsonValue = serde_json::from_slice(&body).map_err(|err| {
        validation_error(
            "Invalid webhook payload",
            serde_json::json!({ "body": err.to_string() }),
        )
    })?;

    let log = state
        .logs
        .create_log(NewSyncLog {
            tenant_id,
            provider: adapter.slug().to_string(),
            event_type: event_type(&payload),
            direction: SyncDirection::Inbound,
            entity_type: WEBHOOK_ENTITY.to_string(),
            entity_id: entity_id(&payload),
            request_payload: Some(payload),
        })
        .await?;
    state.logs.mark_in_progress(log.id).await?;
    state.logs.mark_success(log.id, None, None, false).await?;

    info!(
        provider = adapter.slug(),
        tenant_id = %tenant_id,
        log_id = %log.id,
        event_type = %log.event_type,
        "webhook accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookAcceptResponse {
            status: "accepted".to_string(),
            log_id: log.id,
        }),
    ))
}

/// Providers batch events in arrays; the first element describes the delivery.
fn first_event(payload: &JsonValue) -> &JsonValue {
    match payload {
        JsonValue::Array(items) => items.first().unwrap_or(payload),
        _ => payload,
    }
}

fn event_type(payload: &JsonValue) -> String {
    let event = first_event(payload);
    ["event", "type", "action", "subscriptionType"]
        .iter()
        .find_map(|key| event.get(key).and_then(JsonValue::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| "webhook".to_string())
}

fn entity_id(payload: &JsonValue) -> String {
    let event = first_event(payload);
    let candidates = [
        event.get("id"),
        event.get("objectId"),
        event.get("data").and_then(|d| d.get("id")),
        event.pointer("/payload/application/id"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|value| match value {
            JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| "unknown".to_string())
}
