//! # Credential Store
//!
//! Per-tenant provider credentials. Token sets are sealed with the process
//! key before they reach the database; plaintext only exists inside a
//! [`StoredCredentials`] value for the duration of one operation.

use chrono::{DateTime, Duration, Utc};
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use zeroize::Zeroize;

use crate::crypto::CryptoError;
use crate::providers::{AuthMaterial, AuthStyle};

pub mod oauth;
pub mod store;

pub use oauth::{OAuthApp, OAuthClient, OAuthError, TokenResponse};
pub use store::{CredentialStore, TokenStatus};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("{provider} is not connected for this tenant")]
    NotConnected { provider: String },
    #[error("{provider} needs to be reconnected: {reason}")]
    ReconnectRequired { provider: String, reason: String },
    #[error("{provider} has no OAuth client configured")]
    OAuthNotConfigured { provider: String },
    #[error("{provider} does not use OAuth")]
    NotOAuth { provider: String },
    #[error("{provider} only accepts OAuth connections")]
    OAuthOnly { provider: String },
    #[error("authorization code exchange with {provider} failed: {message}")]
    Exchange { provider: String, message: String },
    #[error("token refresh with {provider} failed: {message}")]
    Refresh { provider: String, message: String },
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),
    #[error("encryption key is not configured")]
    MissingKey,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Storage(#[from] DbErr),
}

/// Decrypted token blob as persisted in `token_ciphertext`
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Explicit Basic-auth user; when absent the API key is sent as the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<JsonValue>,
}

impl StoredCredentials {
    pub fn from_api_key(api_key: String, username: Option<String>) -> Self {
        let mut creds = Self::default();
        creds.api_key = Some(api_key);
        creds.username = username;
        creds
    }

    pub fn from_access_token(access_token: String, expires_at: Option<DateTime<Utc>>) -> Self {
        let mut creds = Self::default();
        creds.access_token = Some(access_token);
        creds.expires_at = expires_at;
        creds
    }

    /// True when the token expires before `now + buffer`. Tokens without an
    /// expiry never need a proactive refresh.
    pub fn expires_within(&self, buffer: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now + buffer)
    }

    /// Material the provider client attaches to requests.
    pub fn auth_material(&self, style: AuthStyle) -> Option<AuthMaterial> {
        if style.uses_oauth() {
            return self.access_token.clone().map(AuthMaterial::Bearer);
        }
        let key = self.api_key.clone()?;
        match &self.username {
            Some(username) => Some(AuthMaterial::Basic {
                username: username.clone(),
                password: key,
            }),
            None => Some(AuthMaterial::ApiKey(key)),
        }
    }
}

impl std::fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("StoredCredentials")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("api_key", &redact(&self.api_key))
            .field("username", &self.username)
            .finish()
    }
}

impl Drop for StoredCredentials {
    fn drop(&mut self) {
        self.access_token.zeroize();
        self.refresh_token.zeroize();
        self.api_key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_buffer_is_inclusive() {
        let now = Utc::now();
        let creds =
            StoredCredentials::from_access_token("at".into(), Some(now + Duration::minutes(5)));
        assert!(creds.expires_within(Duration::minutes(5), now));
        assert!(!creds.expires_within(Duration::minutes(4), now));

        let no_expiry = StoredCredentials::from_api_key("k".into(), None);
        assert!(!no_expiry.expires_within(Duration::minutes(5), now));
    }

    #[test]
    fn auth_material_follows_auth_style() {
        let oauth = StoredCredentials::from_access_token("at".into(), None);
        assert_eq!(
            oauth.auth_material(AuthStyle::OAuth2),
            Some(AuthMaterial::Bearer("at".into()))
        );
        assert_eq!(oauth.auth_material(AuthStyle::ApiKeyBearer), None);

        let key = StoredCredentials::from_api_key("k".into(), None);
        assert_eq!(
            key.auth_material(AuthStyle::ApiKeyBasic { password: "x" }),
            Some(AuthMaterial::ApiKey("k".into()))
        );

        let basic = StoredCredentials::from_api_key("secret".into(), Some("svc".into()));
        assert_eq!(
            basic.auth_material(AuthStyle::ApiKeyBasic { password: "" }),
            Some(AuthMaterial::Basic {
                username: "svc".into(),
                password: "secret".into()
            })
        );
    }

    #[test]
    fn debug_never_prints_secrets() {
        let mut creds = StoredCredentials::from_access_token("super-secret-access".into(), None);
        creds.refresh_token = Some("super-secret-refresh".into());
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("super-secret"));
    }
}
