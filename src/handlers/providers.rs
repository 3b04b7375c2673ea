//! # Providers API Handlers
//!
//! Capability descriptors for every registered provider.

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{OperatorAuth, TenantExtension, TenantHeader};
use crate::error::ApiError;
use crate::providers::{AtsProvider, ProviderCapabilities};
use crate::server::AppState;

/// Provider descriptor as seen by operators
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    /// Provider slug (e.g., "greenhouse")
    pub name: String,
    pub display_name: String,
    /// `oauth2`, `api_key` or `basic`
    pub auth_type: String,
    pub capabilities: ProviderCapabilities,
    /// Stage used when an internal stage has no mapping entry
    pub default_stage: String,
    /// Whether the calling tenant has a usable connection
    pub connected: bool,
}

impl ProviderInfo {
    fn describe(provider: &dyn AtsProvider, connected: bool) -> Self {
        Self {
            name: provider.slug().to_string(),
            display_name: provider.display_name().to_string(),
            auth_type: provider.auth_style().auth_kind().as_str().to_string(),
            capabilities: provider.capabilities(),
            default_stage: provider.stage_mapping().default_stage().to_string(),
            connected,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProvidersResponse {
    /// Providers ordered by name
    pub providers: Vec<ProviderInfo>,
}

/// List registered providers with their capabilities
#[utoipa::path(
    get,
    path = "/providers",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    responses(
        (status = 200, description = "Registered providers", body = ProvidersResponse, example = json!({
            "providers": [
                {
                    "name": "greenhouse",
                    "displayName": "Greenhouse",
                    "authType": "api_key",
                    "capabilities": {
                        "candidateSync": "write",
                        "jobSync": "pull",
                        "interviewSync": "write",
                        "supportsWebhooks": true
                    },
                    "defaultStage": "Application Review",
                    "connected": false
                }
            ]
        })),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "providers"
)]
pub async fn list_providers(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    tenant: TenantExtension,
) -> Result<Json<ProvidersResponse>, ApiError> {
    let connected = state.credentials.connected_providers(tenant.id()).await?;

    let providers = state
        .registry
        .list()
        .iter()
        .map(|provider| {
            let is_connected = connected.iter().any(|slug| slug == provider.slug());
            ProviderInfo::describe(provider.as_ref(), is_connected)
        })
        .collect();

    Ok(Json(ProvidersResponse { providers }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use crate::providers::GreenhouseProvider;

    #[test]
    fn describes_provider_in_camel_case() {
        let provider = GreenhouseProvider::new(&ProviderSettings::default());
        let info = ProviderInfo::describe(&provider, true);
        let value = serde_json::to_value(&info).unwrap();

        assert_eq!(value["name"], "greenhouse");
        assert_eq!(value["authType"], "api_key");
        assert_eq!(value["capabilities"]["candidateSync"], "write");
        assert_eq!(value["defaultStage"], "Application Review");
        assert_eq!(value["connected"], true);
    }
}
