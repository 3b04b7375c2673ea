//! Operator-facing integration status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::credentials::{CredentialError, CredentialStore};
use crate::repositories::{SyncLogRepository, SyncSummary};

/// Rolling 24h counters shown on the status endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Stats24h {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub success_rate: u32,
}

impl From<SyncSummary> for Stats24h {
    fn from(summary: SyncSummary) -> Self {
        Self {
            total: summary.total,
            success: summary.success,
            failed: summary.failed,
            success_rate: summary.success_rate,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationStatus {
    pub connected: bool,
    pub token_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(rename = "stats24h")]
    pub stats_24h: Stats24h,
}

/// Assemble the status of one tenant's integration with `provider`.
///
/// A credential error (failed refresh, rejected key) takes precedence over the
/// most recent failed sync when reporting `last_error`.
pub async fn integration_status(
    credentials: &CredentialStore,
    logs: &SyncLogRepository,
    tenant_id: Uuid,
    provider: &str,
) -> Result<IntegrationStatus, CredentialError> {
    let token = credentials.token_status(tenant_id, provider).await?;
    let summary = logs.summary_24h(tenant_id, provider, Utc::now()).await?;
    let last_error = match token.last_error {
        Some(err) => Some(err),
        None => logs.last_error(tenant_id, provider).await?,
    };

    Ok(IntegrationStatus {
        connected: token.connected,
        token_valid: token.token_valid,
        token_expires_at: token.token_expires_at,
        last_sync_at: token.last_sync_at,
        last_error,
        stats_24h: summary.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_camel_case_keys() {
        let status = IntegrationStatus {
            connected: true,
            token_valid: false,
            stats_24h: Stats24h {
                total: 10,
                success: 7,
                failed: 3,
                success_rate: 70,
            },
            ..Default::default()
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["tokenValid"], false);
        assert_eq!(value["stats24h"]["successRate"], 70);
        assert!(value.get("lastError").is_none());
    }
}
