//! # ATS Sync
//!
//! Keeps candidates and interviews in step with external recruiting and HR
//! systems: a retrying provider client, an encrypted per-tenant credential
//! store, an auditable sync log, external-id mappings and the HTTP surface
//! operators use to manage integrations.

pub mod auth;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod key_lock;
pub mod models;
pub mod providers;
pub mod repositories;
pub mod retention;
pub mod server;
pub mod sync;
pub mod telemetry;
pub mod throttle;
pub mod webhook_verification;
pub use migration;
