//! Credential store service: load, refresh and persist provider credentials.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::oauth::{OAuthApp, OAuthClient};
use super::{CredentialError, StoredCredentials};
use crate::config::AppConfig;
use crate::crypto::{self, CryptoKey};
use crate::key_lock::KeyedLock;
use crate::models::integration_credential::{AuthKind, CredentialStatus, Model};
use crate::providers::{AtsProvider, AuthMaterial, CredentialProvider, ProviderRegistry};
use crate::repositories::CredentialRepository;

/// Token health for the status endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatus {
    pub connected: bool,
    pub token_valid: bool,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

pub struct CredentialStore {
    repo: CredentialRepository,
    key: Option<CryptoKey>,
    registry: Arc<ProviderRegistry>,
    config: Arc<AppConfig>,
    oauth: OAuthClient,
    expiry_buffer: Duration,
    refresh_lock: KeyedLock<(Uuid, String)>,
}

impl CredentialStore {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        registry: Arc<ProviderRegistry>,
    ) -> Result<Self, CredentialError> {
        let key = config.crypto_key.clone().map(CryptoKey::new).transpose()?;
        let expiry_buffer = Duration::seconds(config.credentials.expiry_buffer_seconds as i64);
        Ok(Self {
            repo: CredentialRepository::new(db),
            key,
            oauth: OAuthClient::new(registry.http().clone()),
            registry,
            config,
            expiry_buffer,
            refresh_lock: KeyedLock::new(),
        })
    }

    pub fn expiry_buffer(&self) -> Duration {
        self.expiry_buffer
    }

    fn key(&self) -> Result<&CryptoKey, CredentialError> {
        self.key.as_ref().ok_or(CredentialError::MissingKey)
    }

    fn seal(
        &self,
        tenant_id: Uuid,
        provider: &str,
        creds: &StoredCredentials,
    ) -> Result<Vec<u8>, CredentialError> {
        let aad = crypto::credential_aad(tenant_id, provider);
        Ok(crypto::encrypt_object(self.key()?, aad.as_bytes(), creds)?)
    }

    fn open(
        &self,
        tenant_id: Uuid,
        provider: &str,
        sealed: &[u8],
    ) -> Result<StoredCredentials, CredentialError> {
        let aad = crypto::credential_aad(tenant_id, provider);
        Ok(crypto::decrypt_object(self.key()?, aad.as_bytes(), sealed)?)
    }

    fn provider(&self, provider: &str) -> Result<Arc<dyn AtsProvider>, CredentialError> {
        self.registry
            .get(provider)
            .map_err(|_| CredentialError::UnknownProvider(provider.to_string()))
    }

    fn oauth_app(&self, provider: &dyn AtsProvider) -> Result<OAuthApp, CredentialError> {
        let not_configured = || CredentialError::OAuthNotConfigured {
            provider: provider.slug().to_string(),
        };
        let settings = self.config.provider(provider.slug());
        let token_url = provider.token_url().ok_or_else(not_configured)?;
        Ok(OAuthApp {
            token_url: token_url.to_string(),
            client_id: settings.client_id.ok_or_else(not_configured)?,
            client_secret: settings.client_secret.ok_or_else(not_configured)?,
        })
    }

    /// Decrypt the stored credentials of a connected integration.
    async fn load(
        &self,
        tenant_id: Uuid,
        provider: &str,
    ) -> Result<(Model, StoredCredentials), CredentialError> {
        let row = self
            .repo
            .find(tenant_id, provider)
            .await?
            .ok_or_else(|| CredentialError::NotConnected {
                provider: provider.to_string(),
            })?;

        match row.credential_status() {
            CredentialStatus::Connected => {}
            CredentialStatus::Error => {
                return Err(CredentialError::ReconnectRequired {
                    provider: provider.to_string(),
                    reason: row
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "integration is in error state".to_string()),
                });
            }
            CredentialStatus::Disconnected => {
                return Err(CredentialError::NotConnected {
                    provider: provider.to_string(),
                });
            }
        }

        let sealed = row
            .token_ciphertext
            .as_deref()
            .ok_or_else(|| CredentialError::NotConnected {
                provider: provider.to_string(),
            })?;
        let creds = self.open(tenant_id, provider, sealed)?;
        Ok((row, creds))
    }

    /// Credentials that stay valid beyond the expiry buffer, refreshing once if
    /// the stored token is about to expire.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, provider = %provider))]
    pub async fn get_valid_credentials(
        &self,
        tenant_id: Uuid,
        provider: &str,
    ) -> Result<StoredCredentials, CredentialError> {
        let mut refreshed = false;
        loop {
            let (_, creds) = self.load(tenant_id, provider).await?;
            let now = Utc::now();
            if !creds.expires_within(self.expiry_buffer, now) {
                return Ok(creds);
            }
            if refreshed {
                // Short-lived tokens may land inside the buffer right after a
                // refresh; they are still usable until they actually expire.
                if creds.expires_at.is_some_and(|at| at > now) {
                    return Ok(creds);
                }
                return Err(CredentialError::ReconnectRequired {
                    provider: provider.to_string(),
                    reason: "token expired immediately after refresh".to_string(),
                });
            }
            debug!("stored token is inside the expiry buffer; refreshing");
            self.refresh_inner(tenant_id, provider, false).await?;
            refreshed = true;
        }
    }

    /// Exchange the stored refresh token for a new token set. A failure marks
    /// the integration `error`; the user has to reconnect.
    pub async fn refresh_tokens(
        &self,
        tenant_id: Uuid,
        provider: &str,
    ) -> Result<StoredCredentials, CredentialError> {
        self.refresh_inner(tenant_id, provider, true).await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, provider = %provider))]
    async fn refresh_inner(
        &self,
        tenant_id: Uuid,
        provider: &str,
        force: bool,
    ) -> Result<StoredCredentials, CredentialError> {
        let adapter = self.provider(provider)?;
        if !adapter.auth_style().uses_oauth() {
            return Err(CredentialError::NotOAuth {
                provider: provider.to_string(),
            });
        }

        let _guard = self
            .refresh_lock
            .lock((tenant_id, provider.to_string()))
            .await;

        let (_, current) = self.load(tenant_id, provider).await?;
        // A concurrent caller may have refreshed while we waited for the lock.
        if !force && !current.expires_within(self.expiry_buffer, Utc::now()) {
            return Ok(current);
        }

        let Some(refresh_token) = current.refresh_token.clone() else {
            let reason = "no refresh token stored";
            self.repo
                .mark_error(tenant_id, provider, AuthKind::OAuth2, reason)
                .await?;
            record_refresh(provider, "missing_refresh_token");
            return Err(CredentialError::ReconnectRequired {
                provider: provider.to_string(),
                reason: reason.to_string(),
            });
        };

        let app = self.oauth_app(adapter.as_ref())?;
        match self.oauth.refresh(&app, &refresh_token).await {
            Ok(token) => {
                let creds = token.into_credentials(Some(refresh_token), Utc::now());
                let sealed = self.seal(tenant_id, provider, &creds)?;
                self.repo
                    .save_connected(tenant_id, provider, AuthKind::OAuth2, sealed, creds.expires_at)
                    .await?;
                record_refresh(provider, "success");
                info!(expires_at = ?creds.expires_at, "refreshed provider token");
                Ok(creds)
            }
            Err(err) => {
                let message = err.to_string();
                warn!(error = %message, permanent = err.is_permanent(), "token refresh failed");
                self.repo
                    .mark_error(
                        tenant_id,
                        provider,
                        AuthKind::OAuth2,
                        &format!("token refresh failed: {message}"),
                    )
                    .await?;
                record_refresh(provider, "failure");
                if err.is_permanent() {
                    Err(CredentialError::ReconnectRequired {
                        provider: provider.to_string(),
                        reason: message,
                    })
                } else {
                    Err(CredentialError::Refresh {
                        provider: provider.to_string(),
                        message,
                    })
                }
            }
        }
    }

    /// Turn an OAuth authorization code into stored credentials. A failed
    /// exchange leaves the integration in `error` with the reason recorded.
    #[instrument(skip(self, code, redirect_uri), fields(tenant_id = %tenant_id, provider = %provider))]
    pub async fn exchange_code(
        &self,
        tenant_id: Uuid,
        provider: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Model, CredentialError> {
        let adapter = self.provider(provider)?;
        if !adapter.auth_style().uses_oauth() {
            return Err(CredentialError::NotOAuth {
                provider: provider.to_string(),
            });
        }
        let app = self.oauth_app(adapter.as_ref())?;

        let token = match self.oauth.exchange_code(&app, code, redirect_uri).await {
            Ok(token) => token,
            Err(err) => {
                let message = err.to_string();
                warn!(error = %message, "authorization code exchange failed");
                self.repo
                    .mark_error(
                        tenant_id,
                        provider,
                        AuthKind::OAuth2,
                        &format!("authorization failed: {message}"),
                    )
                    .await?;
                return Err(CredentialError::Exchange {
                    provider: provider.to_string(),
                    message,
                });
            }
        };

        let creds = token.into_credentials(None, Utc::now());
        let sealed = self.seal(tenant_id, provider, &creds)?;
        let row = self
            .repo
            .save_connected(tenant_id, provider, AuthKind::OAuth2, sealed, creds.expires_at)
            .await?;
        info!("integration connected via OAuth");
        Ok(row)
    }

    /// Store a static API key, replacing whatever was stored before.
    #[instrument(skip(self, api_key), fields(tenant_id = %tenant_id, provider = %provider))]
    pub async fn save_api_key(
        &self,
        tenant_id: Uuid,
        provider: &str,
        api_key: String,
        username: Option<String>,
    ) -> Result<Model, CredentialError> {
        let adapter = self.provider(provider)?;
        if adapter.auth_style().uses_oauth() {
            return Err(CredentialError::OAuthOnly {
                provider: provider.to_string(),
            });
        }
        let kind = if username.is_some() {
            AuthKind::Basic
        } else {
            AuthKind::ApiKey
        };
        let creds = StoredCredentials::from_api_key(api_key, username);
        let sealed = self.seal(tenant_id, provider, &creds)?;
        let row = self
            .repo
            .save_connected(tenant_id, provider, kind, sealed, None)
            .await?;
        info!("integration connected via API key");
        Ok(row)
    }

    /// Forget stored secrets. Returns false when nothing was stored.
    pub async fn disconnect(&self, tenant_id: Uuid, provider: &str) -> Result<bool, CredentialError> {
        let removed = self.repo.mark_disconnected(tenant_id, provider).await?;
        if removed {
            info!(tenant_id = %tenant_id, provider, "integration disconnected");
        }
        Ok(removed)
    }

    pub async fn mark_synced(&self, tenant_id: Uuid, provider: &str) -> Result<(), CredentialError> {
        self.repo
            .touch_last_synced(tenant_id, provider, Utc::now())
            .await?;
        Ok(())
    }

    pub async fn is_connected(&self, tenant_id: Uuid, provider: &str) -> Result<bool, CredentialError> {
        Ok(self
            .repo
            .find(tenant_id, provider)
            .await?
            .is_some_and(|row| {
                row.credential_status() == CredentialStatus::Connected
                    && row.token_ciphertext.is_some()
            }))
    }

    /// Slugs of every provider the tenant is connected to.
    pub async fn connected_providers(&self, tenant_id: Uuid) -> Result<Vec<String>, CredentialError> {
        Ok(self
            .repo
            .list_connected(tenant_id)
            .await?
            .into_iter()
            .filter(|row| row.token_ciphertext.is_some())
            .map(|row| row.provider)
            .collect())
    }

    /// Connection and token health without decrypting anything.
    pub async fn token_status(
        &self,
        tenant_id: Uuid,
        provider: &str,
    ) -> Result<TokenStatus, CredentialError> {
        let Some(row) = self.repo.find(tenant_id, provider).await? else {
            return Ok(TokenStatus::default());
        };
        let connected = row.credential_status() == CredentialStatus::Connected
            && row.token_ciphertext.is_some();
        let expires_at = row.expires_at.map(|at| at.with_timezone(&Utc));
        let token_valid = connected && expires_at.is_none_or(|at| at > Utc::now());
        Ok(TokenStatus {
            connected,
            token_valid,
            token_expires_at: expires_at,
            last_sync_at: row.last_synced_at.map(|at| at.with_timezone(&Utc)),
            last_error: row.last_error,
        })
    }
}

fn record_refresh(provider: &str, outcome: &'static str) {
    counter!(
        "ats_sync_credential_refresh_total",
        "provider" => provider.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

#[async_trait]
impl CredentialProvider for CredentialStore {
    async fn credentials(
        &self,
        tenant_id: Uuid,
        provider: &str,
    ) -> Result<AuthMaterial, CredentialError> {
        let style = self.provider(provider)?.auth_style();
        let creds = self.get_valid_credentials(tenant_id, provider).await?;
        creds
            .auth_material(style)
            .ok_or_else(|| CredentialError::ReconnectRequired {
                provider: provider.to_string(),
                reason: "stored credentials do not match the provider's auth style".to_string(),
            })
    }

    async fn force_refresh(&self, tenant_id: Uuid, provider: &str) -> Result<(), CredentialError> {
        let adapter = self.provider(provider)?;
        if adapter.auth_style().uses_oauth() {
            self.refresh_tokens(tenant_id, provider).await.map(|_| ())
        } else {
            // API keys cannot be refreshed; a rejected key needs a new one.
            let reason = "provider rejected the stored API key";
            self.repo
                .mark_error(tenant_id, provider, adapter.auth_style().auth_kind(), reason)
                .await?;
            Err(CredentialError::ReconnectRequired {
                provider: provider.to_string(),
                reason: reason.to_string(),
            })
        }
    }
}
