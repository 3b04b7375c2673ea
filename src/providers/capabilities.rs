//! Provider capability descriptors
//!
//! Static per-provider description of which entities sync in which direction.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Direction an entity syncs with a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    None,
    /// Outbound only
    Push,
    /// Inbound only
    Pull,
    /// Outbound with remote edits read back
    Write,
}

impl SyncMode {
    pub fn is_enabled(self) -> bool {
        self != SyncMode::None
    }

    /// Whether events for the entity are pushed to the provider.
    pub fn pushes(self) -> bool {
        matches!(self, SyncMode::Push | SyncMode::Write)
    }

    pub fn pulls(self) -> bool {
        matches!(self, SyncMode::Pull | SyncMode::Write)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCapabilities {
    pub candidate_sync: SyncMode,
    pub job_sync: SyncMode,
    pub interview_sync: SyncMode,
    pub supports_webhooks: bool,
}

impl ProviderCapabilities {
    pub const fn new(
        candidate_sync: SyncMode,
        job_sync: SyncMode,
        interview_sync: SyncMode,
        supports_webhooks: bool,
    ) -> Self {
        Self {
            candidate_sync,
            job_sync,
            interview_sync,
            supports_webhooks,
        }
    }
}
