//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations for the sync
//! engine's tables, providing a tenant-aware API for data access.

pub mod credential;
pub mod mapping;
pub mod sync_log;

pub use credential::CredentialRepository;
pub use mapping::{MappingKey, MappingRepository};
pub use sync_log::{
    ErrorSummaryEntry, NewSyncLog, SyncLogError, SyncLogRepository, SyncSummary,
};
