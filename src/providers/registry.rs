//! Provider registry
//!
//! Holds one adapter per provider slug plus the shared HTTP client and retry
//! policy used to build [`ProviderClient`]s.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::bamboohr::BambooHrProvider;
use super::client::{CredentialProvider, ProviderClient, RetryPolicy, Sleeper, TokioSleeper};
use super::greenhouse::GreenhouseProvider;
use super::hubspot::HubSpotProvider;
use super::lever::LeverProvider;
use super::trait_::AtsProvider;
use super::whatsapp::WhatsAppProvider;
use super::workday::WorkdayProvider;
use crate::config::AppConfig;

/// Error type for registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("Provider '{name}' not found")]
    ProviderNotFound { name: String },
    #[error("Provider '{provider}' is not configured: {reason}")]
    NotConfigured { provider: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, Arc<dyn AtsProvider>>,
    http: reqwest::Client,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ProviderRegistry {
    /// Empty registry around an existing HTTP client.
    pub fn new(http: reqwest::Client, policy: RetryPolicy) -> Self {
        Self {
            providers: BTreeMap::new(),
            http,
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Registry with all six adapters configured from `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .timeout(config.retry.http_timeout())
            .user_agent(concat!("ats-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::HttpClient(e.to_string()))?;

        let mut registry = Self::new(http, RetryPolicy::from_config(&config.retry));
        registry.register(Arc::new(HubSpotProvider::new(&config.provider("hubspot"))));
        registry.register(Arc::new(GreenhouseProvider::new(&config.provider("greenhouse"))));
        registry.register(Arc::new(LeverProvider::new(&config.provider("lever"))));
        registry.register(Arc::new(WorkdayProvider::new(&config.provider("workday"))));
        registry.register(Arc::new(BambooHrProvider::new(&config.provider("bamboohr"))));
        registry.register(Arc::new(WhatsAppProvider::new(&config.provider("whatsapp"))));

        for provider in registry.providers.values() {
            if provider.api_base().is_empty() {
                warn!(
                    provider = provider.slug(),
                    "provider has no API base; set its ACCOUNT or API_BASE to enable sync"
                );
            }
        }

        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn AtsProvider>) {
        debug!(provider = provider.slug(), "registering provider");
        self.providers.insert(provider.slug(), provider);
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn AtsProvider>, RegistryError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::ProviderNotFound {
                name: name.to_string(),
            })
    }

    /// All providers, ordered by slug.
    pub fn list(&self) -> Vec<Arc<dyn AtsProvider>> {
        self.providers.values().cloned().collect()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Retrying client for `provider` drawing credentials from `credentials`.
    pub fn client_for(
        &self,
        provider: &dyn AtsProvider,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<ProviderClient, RegistryError> {
        if provider.api_base().is_empty() {
            return Err(RegistryError::NotConfigured {
                provider: provider.slug().to_string(),
                reason: "no API base URL or account configured".to_string(),
            });
        }
        Ok(ProviderClient::new(
            provider.slug(),
            provider.api_base(),
            provider.auth_style(),
            self.http.clone(),
            credentials,
            self.policy.clone(),
        )
        .with_sleeper(self.sleeper.clone()))
    }
}
