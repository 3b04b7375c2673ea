//! ExternalIdMapping entity model
//!
//! Links an internal entity to its counterpart in a provider. Unique on
//! (tenant_id, provider, entity_type, entity_id).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "external_id_mappings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub provider: String,

    /// candidate, interview, employee, ...
    pub entity_type: String,

    /// Internal identifier
    pub entity_id: String,

    /// Identifier assigned by the provider
    pub external_id: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
