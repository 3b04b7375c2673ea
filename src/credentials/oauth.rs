//! OAuth 2.0 authorization-code exchange and refresh-token grant.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::StoredCredentials;

/// Client registration for one provider
#[derive(Clone)]
pub struct OAuthApp {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for OAuthApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthApp")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("token endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("token endpoint unreachable: {0}")]
    Transport(String),
    #[error("token endpoint returned an unusable response: {0}")]
    InvalidResponse(String),
}

impl OAuthError {
    /// `invalid_grant` and friends mean the user has to reconnect.
    pub fn is_permanent(&self) -> bool {
        match self {
            OAuthError::Rejected { status, body } => {
                let body = body.to_ascii_lowercase();
                *status == 400 || *status == 401 || body.contains("invalid_grant")
            }
            OAuthError::InvalidResponse(_) => true,
            OAuthError::Transport(_) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Convert into the stored shape. Providers that do not rotate refresh
    /// tokens omit them from refresh responses, so the previous one is kept.
    pub fn into_credentials(
        self,
        previous_refresh: Option<String>,
        now: DateTime<Utc>,
    ) -> StoredCredentials {
        StoredCredentials {
            access_token: Some(self.access_token),
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: self.expires_in.map(|secs| now + Duration::seconds(secs)),
            token_type: self.token_type,
            scope: self.scope,
            api_key: None,
            username: None,
            extra: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub async fn exchange_code(
        &self,
        app: &OAuthApp,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", app.client_id.as_str()),
            ("client_secret", app.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        self.post_form(app, &params).await
    }

    pub async fn refresh(
        &self,
        app: &OAuthApp,
        refresh_token: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", app.client_id.as_str()),
            ("client_secret", app.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.post_form(app, &params).await
    }

    async fn post_form(
        &self,
        app: &OAuthApp,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, OAuthError> {
        debug!(token_url = %app.token_url, "calling token endpoint");
        let response = self
            .http
            .post(&app.token_url)
            .header("Accept", "application/json")
            .form(params)
            .send()
            .await
            .map_err(|e| OAuthError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::InvalidResponse(e.to_string()))?;
        if token.access_token.is_empty() {
            return Err(OAuthError::InvalidResponse(
                "empty access_token".to_string(),
            ));
        }
        Ok(token)
    }
}
