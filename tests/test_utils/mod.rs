//! Shared fixtures for integration tests.
//!
//! Every test gets its own in-memory SQLite database with migrations applied
//! and, where providers are involved, a wiremock server standing in for all
//! provider APIs and token endpoints.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use ats_sync::config::{AppConfig, ProviderSettings, RetryPolicyConfig};
use ats_sync::credentials::CredentialStore;
use ats_sync::providers::{ProviderRegistry, RecordingSleeper};
use ats_sync::server::AppState;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use wiremock::MockServer;

pub const OPERATOR_TOKEN: &str = "test-operator-token";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Same as [`setup_test_db`], wrapped in an `Arc`.
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

/// Configuration pointing every provider at `server`.
///
/// Retries are fast and jitter-free so recorded delays are deterministic.
pub fn test_config(server: &MockServer) -> AppConfig {
    let mut providers = BTreeMap::new();
    for slug in ["hubspot", "greenhouse", "lever", "workday", "bamboohr", "whatsapp"] {
        providers.insert(
            slug.to_string(),
            ProviderSettings {
                api_base: Some(server.uri()),
                token_url: Some(format!("{}/oauth/token", server.uri())),
                client_id: Some(format!("{slug}-client")),
                client_secret: Some(format!("{slug}-secret")),
                webhook_secret: Some(WEBHOOK_SECRET.to_string()),
                account: None,
            },
        );
    }

    AppConfig {
        profile: "test".to_string(),
        operator_tokens: vec![OPERATOR_TOKEN.to_string()],
        crypto_key: Some(vec![7u8; 32]),
        sync_trigger_limit_per_minute: 3,
        retry: RetryPolicyConfig {
            max_attempts: 3,
            base_delay_ms: 1000,
            rate_limit_multiplier: 5,
            max_jitter_ms: 0,
            http_timeout_seconds: 5,
        },
        providers,
        ..AppConfig::default()
    }
}

/// Everything a test needs to drive the sync engine against a mock provider
pub struct TestContext {
    pub server: MockServer,
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub sleeper: Arc<RecordingSleeper>,
    pub state: AppState,
}

impl TestContext {
    pub async fn new() -> Result<Self> {
        let server = MockServer::start().await;
        let config = Arc::new(test_config(&server));
        Self::with_config(server, config).await
    }

    pub async fn with_config(server: MockServer, config: Arc<AppConfig>) -> Result<Self> {
        let db = setup_test_db_arc().await?;
        let sleeper = Arc::new(RecordingSleeper::new());
        let registry = Arc::new(ProviderRegistry::from_config(&config)?.with_sleeper(sleeper.clone()));
        let state = AppState::new(config.clone(), db.clone(), registry)?;
        Ok(Self {
            server,
            db,
            config,
            sleeper,
            state,
        })
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.state.credentials
    }
}
