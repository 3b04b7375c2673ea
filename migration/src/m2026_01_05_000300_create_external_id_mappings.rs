//! Migration to create the external_id_mappings table.
//!
//! The composite unique index is what makes mapping upserts idempotent.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExternalIdMappings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExternalIdMappings::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ExternalIdMappings::TenantId).uuid().not_null())
                    .col(ColumnDef::new(ExternalIdMappings::Provider).text().not_null())
                    .col(ColumnDef::new(ExternalIdMappings::EntityType).text().not_null())
                    .col(ColumnDef::new(ExternalIdMappings::EntityId).text().not_null())
                    .col(ColumnDef::new(ExternalIdMappings::ExternalId).text().not_null())
                    .col(
                        ColumnDef::new(ExternalIdMappings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ExternalIdMappings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_external_id_mappings_key")
                    .table(ExternalIdMappings::Table)
                    .col(ExternalIdMappings::TenantId)
                    .col(ExternalIdMappings::Provider)
                    .col(ExternalIdMappings::EntityType)
                    .col(ExternalIdMappings::EntityId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_external_id_mappings_key").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ExternalIdMappings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ExternalIdMappings {
    Table,
    Id,
    TenantId,
    Provider,
    EntityType,
    EntityId,
    ExternalId,
    CreatedAt,
    UpdatedAt,
}
