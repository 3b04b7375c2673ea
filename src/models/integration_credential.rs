//! IntegrationCredential entity model
//!
//! One row per (tenant, provider) holding the encrypted token blob for that
//! integration plus the connection status shown to operators.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Stored credential for a tenant's integration with one provider
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "integration_credentials")]
pub struct Model {
    /// Unique identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Tenant owning the integration
    pub tenant_id: Uuid,

    /// Provider slug (e.g. "greenhouse")
    pub provider: String,

    /// How the stored material authenticates: oauth2, api_key or basic
    pub auth_kind: String,

    /// Encrypted JSON token set
    pub token_ciphertext: Option<Vec<u8>>,

    /// connected, disconnected or error
    pub status: String,

    /// Reason for the last failure that flipped the status
    pub last_error: Option<String>,

    /// Last time a sync against this integration succeeded
    pub last_synced_at: Option<DateTimeWithTimeZone>,

    /// Access token expiry, mirrored outside the ciphertext for status queries
    pub expires_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parsed status, treating unknown values as `Error`.
    pub fn credential_status(&self) -> CredentialStatus {
        self.status.parse().unwrap_or(CredentialStatus::Error)
    }
}

/// Connection status of a credential record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Connected,
    Disconnected,
    Error,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Connected => "connected",
            CredentialStatus::Disconnected => "disconnected",
            CredentialStatus::Error => "error",
        }
    }
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(CredentialStatus::Connected),
            "disconnected" => Ok(CredentialStatus::Disconnected),
            "error" => Ok(CredentialStatus::Error),
            other => Err(format!("unknown credential status: {other}")),
        }
    }
}

/// Kind of authentication material stored in the token blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    #[serde(rename = "oauth2")]
    OAuth2,
    ApiKey,
    Basic,
}

impl AuthKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthKind::OAuth2 => "oauth2",
            AuthKind::ApiKey => "api_key",
            AuthKind::Basic => "basic",
        }
    }
}

impl FromStr for AuthKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oauth2" => Ok(AuthKind::OAuth2),
            "api_key" => Ok(AuthKind::ApiKey),
            "basic" => Ok(AuthKind::Basic),
            other => Err(format!("unknown auth kind: {other}")),
        }
    }
}
