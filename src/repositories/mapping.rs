//! # External-ID Mapping Repository
//!
//! Idempotency keyspace linking an internal entity to its provider record,
//! unique on (tenant, provider, entity type, entity id).

use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::external_id_mapping::{ActiveModel, Column, Entity, Model};

/// Composite key of a mapping row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MappingKey {
    pub tenant_id: Uuid,
    pub provider: String,
    pub entity_type: String,
    pub entity_id: String,
}

impl MappingKey {
    pub fn new(
        tenant_id: Uuid,
        provider: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            provider: provider.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MappingRepository {
    db: Arc<DatabaseConnection>,
}

impl MappingRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find(&self, key: &MappingKey) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::TenantId.eq(key.tenant_id))
            .filter(Column::Provider.eq(key.provider.as_str()))
            .filter(Column::EntityType.eq(key.entity_type.as_str()))
            .filter(Column::EntityId.eq(key.entity_id.as_str()))
            .one(&*self.db)
            .await
    }

    pub async fn external_id(&self, key: &MappingKey) -> Result<Option<String>, DbErr> {
        Ok(self.find(key).await?.map(|m| m.external_id))
    }

    /// Insert the mapping or, if the key exists, point it at `external_id`.
    pub async fn upsert(&self, key: &MappingKey, external_id: &str) -> Result<Model, DbErr> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let row = ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(key.tenant_id),
            provider: Set(key.provider.clone()),
            entity_type: Set(key.entity_type.clone()),
            entity_id: Set(key.entity_id.clone()),
            external_id: Set(external_id.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    Column::TenantId,
                    Column::Provider,
                    Column::EntityType,
                    Column::EntityId,
                ])
                .update_columns([Column::ExternalId, Column::UpdatedAt])
                .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        self.find(key)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("mapping {key:?}")))
    }

    pub async fn count_for_entity(&self, key: &MappingKey) -> Result<u64, DbErr> {
        Entity::find()
            .filter(Column::TenantId.eq(key.tenant_id))
            .filter(Column::Provider.eq(key.provider.as_str()))
            .filter(Column::EntityType.eq(key.entity_type.as_str()))
            .filter(Column::EntityId.eq(key.entity_id.as_str()))
            .count(&*self.db)
            .await
    }
}
