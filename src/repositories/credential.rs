//! # Integration Credential Repository
//!
//! Tenant-scoped access to `integration_credentials`. At most one row exists
//! per (tenant, provider); writes upsert on that pair.

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::integration_credential::{
    self, ActiveModel, AuthKind, Column, CredentialStatus, Entity, Model,
};

/// Repository for integration credential rows
#[derive(Debug, Clone)]
pub struct CredentialRepository {
    db: Arc<DatabaseConnection>,
}

impl CredentialRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find(&self, tenant_id: Uuid, provider: &str) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Provider.eq(provider))
            .one(&*self.db)
            .await
    }

    pub async fn list_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .order_by_asc(Column::Provider)
            .all(&*self.db)
            .await
    }

    /// Providers the tenant currently has a usable connection to.
    pub async fn list_connected(&self, tenant_id: Uuid) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Status.eq(CredentialStatus::Connected.as_str()))
            .order_by_asc(Column::Provider)
            .all(&*self.db)
            .await
    }

    /// Store a fresh encrypted token set and mark the integration connected.
    pub async fn save_connected(
        &self,
        tenant_id: Uuid,
        provider: &str,
        auth_kind: AuthKind,
        token_ciphertext: Vec<u8>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Model, DbErr> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let row = ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            provider: Set(provider.to_string()),
            auth_kind: Set(auth_kind.as_str().to_string()),
            token_ciphertext: Set(Some(token_ciphertext)),
            status: Set(CredentialStatus::Connected.as_str().to_string()),
            last_error: Set(None),
            last_synced_at: Set(None),
            expires_at: Set(expires_at.map(Into::into)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Entity::insert(row)
            .on_conflict(
                OnConflict::columns([Column::TenantId, Column::Provider])
                    .update_columns([
                        Column::AuthKind,
                        Column::TokenCiphertext,
                        Column::Status,
                        Column::LastError,
                        Column::ExpiresAt,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        self.require(tenant_id, provider).await
    }

    /// Flip the integration to `error`, creating the row if the failure
    /// happened before any credentials were stored.
    pub async fn mark_error(
        &self,
        tenant_id: Uuid,
        provider: &str,
        auth_kind: AuthKind,
        message: &str,
    ) -> Result<Model, DbErr> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let row = ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            provider: Set(provider.to_string()),
            auth_kind: Set(auth_kind.as_str().to_string()),
            token_ciphertext: Set(None),
            status: Set(CredentialStatus::Error.as_str().to_string()),
            last_error: Set(Some(message.to_string())),
            last_synced_at: Set(None),
            expires_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Entity::insert(row)
            .on_conflict(
                OnConflict::columns([Column::TenantId, Column::Provider])
                    .update_columns([Column::Status, Column::LastError, Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        self.require(tenant_id, provider).await
    }

    /// Drop stored secrets and mark the integration disconnected.
    pub async fn mark_disconnected(&self, tenant_id: Uuid, provider: &str) -> Result<bool, DbErr> {
        let result = Entity::update_many()
            .set(integration_credential::ActiveModel {
                token_ciphertext: Set(None),
                status: Set(CredentialStatus::Disconnected.as_str().to_string()),
                expires_at: Set(None),
                updated_at: Set(Utc::now().into()),
                ..Default::default()
            })
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Provider.eq(provider))
            .filter(Column::Status.ne(CredentialStatus::Disconnected.as_str()))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn touch_last_synced(
        &self,
        tenant_id: Uuid,
        provider: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbErr> {
        Entity::update_many()
            .set(integration_credential::ActiveModel {
                last_synced_at: Set(Some(at.into())),
                updated_at: Set(Utc::now().into()),
                ..Default::default()
            })
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Provider.eq(provider))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    async fn require(&self, tenant_id: Uuid, provider: &str) -> Result<Model, DbErr> {
        self.find(tenant_id, provider).await?.ok_or_else(|| {
            DbErr::RecordNotFound(format!("credential for {tenant_id}/{provider}"))
        })
    }
}
