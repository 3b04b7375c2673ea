//! Database migrations for the ATS sync service.

pub use sea_orm_migration::prelude::*;

mod m2026_01_05_000100_create_integration_credentials;
mod m2026_01_05_000200_create_sync_logs;
mod m2026_01_05_000300_create_external_id_mappings;
mod m2026_01_05_000400_create_throttle_counters;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_01_05_000100_create_integration_credentials::Migration),
            Box::new(m2026_01_05_000200_create_sync_logs::Migration),
            Box::new(m2026_01_05_000300_create_external_id_mappings::Migration),
            Box::new(m2026_01_05_000400_create_throttle_counters::Migration),
        ]
    }
}
