//! SyncLog entity model
//!
//! Audit trail of every sync attempt. Rows move forward through
//! pending → in_progress → {success, failed, retrying}; `retrying` may loop
//! back to `in_progress`. A row with `completed_at` set is never modified.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub provider: String,

    /// Domain event that triggered the attempt (e.g. candidate_created)
    pub event_type: String,

    /// outbound or inbound
    pub direction: String,

    pub entity_type: String,

    /// Internal identifier of the entity being synced
    pub entity_id: String,

    /// Provider-side identifier, set once the attempt succeeds
    pub external_id: Option<String>,

    pub status: String,

    pub error_message: Option<String>,

    pub retry_count: i32,

    /// True when the attempt was a no-op because the entity was already synced
    pub skipped: bool,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub request_payload: Option<JsonValue>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub response_payload: Option<JsonValue>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,

    pub completed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn sync_status(&self) -> Option<SyncStatus> {
        self.status.parse().ok()
    }
}

/// Lifecycle state of a sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Retrying,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::InProgress => "in_progress",
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
            SyncStatus::Retrying => "retrying",
        }
    }

    /// Terminal rows are the only ones the retention sweep may delete.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Success | SyncStatus::Failed)
    }

    /// Whether moving from `self` to `next` respects the forward-only lifecycle.
    pub fn can_transition_to(&self, next: SyncStatus) -> bool {
        use SyncStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Failed)
                | (InProgress, Success)
                | (InProgress, Failed)
                | (InProgress, Retrying)
                | (Retrying, InProgress)
                | (Retrying, Failed)
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "in_progress" => Ok(SyncStatus::InProgress),
            "success" => Ok(SyncStatus::Success),
            "failed" => Ok(SyncStatus::Failed),
            "retrying" => Ok(SyncStatus::Retrying),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// Direction of data flow for a sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    Outbound,
    Inbound,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::Outbound => "outbound",
            SyncDirection::Inbound => "inbound",
        }
    }
}
