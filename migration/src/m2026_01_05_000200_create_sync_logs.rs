//! Migration to create the sync_logs audit table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncLogs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncLogs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(SyncLogs::TenantId).uuid().not_null())
                    .col(ColumnDef::new(SyncLogs::Provider).text().not_null())
                    .col(ColumnDef::new(SyncLogs::EventType).text().not_null())
                    .col(
                        ColumnDef::new(SyncLogs::Direction)
                            .text()
                            .not_null()
                            .default("outbound"),
                    )
                    .col(ColumnDef::new(SyncLogs::EntityType).text().not_null())
                    .col(ColumnDef::new(SyncLogs::EntityId).text().not_null())
                    .col(ColumnDef::new(SyncLogs::ExternalId).text().null())
                    .col(
                        ColumnDef::new(SyncLogs::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(SyncLogs::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(SyncLogs::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncLogs::Skipped)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(SyncLogs::RequestPayload).json_binary().null())
                    .col(ColumnDef::new(SyncLogs::ResponsePayload).json_binary().null())
                    .col(
                        ColumnDef::new(SyncLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncLogs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncLogs::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Operator queries: recent logs for one integration
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_logs_tenant_provider_created")
                    .table(SyncLogs::Table)
                    .col(SyncLogs::TenantId)
                    .col(SyncLogs::Provider)
                    .col(SyncLogs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Retention sweep scans by status and age
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_logs_status_created")
                    .table(SyncLogs::Table)
                    .col(SyncLogs::Status)
                    .col(SyncLogs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_sync_logs_tenant_provider_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_sync_logs_status_created").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(SyncLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncLogs {
    Table,
    Id,
    TenantId,
    Provider,
    EventType,
    Direction,
    EntityType,
    EntityId,
    ExternalId,
    Status,
    ErrorMessage,
    RetryCount,
    Skipped,
    RequestPayload,
    ResponsePayload,
    CreatedAt,
    UpdatedAt,
    CompletedAt,
}
