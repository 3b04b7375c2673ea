//! Migration to create the integration_credentials table.
//!
//! One row per (tenant, provider) holding the encrypted token blob and the
//! connection status surfaced to operators.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IntegrationCredentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IntegrationCredentials::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(IntegrationCredentials::TenantId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationCredentials::Provider)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationCredentials::AuthKind)
                            .text()
                            .not_null()
                            .default("oauth2"),
                    )
                    .col(
                        ColumnDef::new(IntegrationCredentials::TokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationCredentials::Status)
                            .text()
                            .not_null()
                            .default("connected"),
                    )
                    .col(
                        ColumnDef::new(IntegrationCredentials::LastError)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationCredentials::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationCredentials::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationCredentials::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(IntegrationCredentials::UpdatedAt)
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
                    .name("idx_integration_credentials_tenant_provider")
                    .table(IntegrationCredentials::Table)
                    .col(IntegrationCredentials::TenantId)
                    .col(IntegrationCredentials::Provider)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_integration_credentials_tenant_provider")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(
                Table::drop()
                    .table(IntegrationCredentials::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum IntegrationCredentials {
    Table,
    Id,
    TenantId,
    Provider,
    AuthKind,
    TokenCiphertext,
    Status,
    LastError,
    LastSyncedAt,
    ExpiresAt,
    CreatedAt,
    UpdatedAt,
}
