//! # Data Models
//!
//! SeaORM entities for credentials, sync logs, external-id mappings and
//! throttle counters, plus small shared response types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod external_id_mapping;
pub mod integration_credential;
pub mod sync_log;
pub mod throttle_counter;

pub use external_id_mapping::Entity as ExternalIdMapping;
pub use integration_credential::Entity as IntegrationCredential;
pub use sync_log::Entity as SyncLog;
pub use throttle_counter::Entity as ThrottleCounter;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "ats-sync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
