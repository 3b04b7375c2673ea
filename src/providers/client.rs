//! Retrying provider API client
//!
//! [`ProviderClient::execute`] runs a unit of work against one provider with
//! fresh credentials on every attempt. Failures are classified by
//! [`ErrorKind`]: auth errors trigger a single credential refresh on the first
//! attempt, rate limits and transient errors back off exponentially with
//! jitter, and permanent errors fail at once. Whatever escapes the loop is a
//! [`ProviderError::Failed`] naming the provider and the attempt count.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use rand::Rng;
use reqwest::header::{self, HeaderMap};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{ErrorKind, ProviderError};
use super::trait_::AuthStyle;
use crate::config::RetryPolicyConfig;
use crate::credentials::CredentialError;

/// Authentication material handed to a single attempt
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMaterial {
    /// OAuth access token
    Bearer(String),
    /// Static API key; placement depends on the provider's [`AuthStyle`]
    ApiKey(String),
    Basic { username: String, password: String },
}

impl fmt::Debug for AuthMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMaterial::Bearer(_) => f.write_str("Bearer([REDACTED])"),
            AuthMaterial::ApiKey(_) => f.write_str("ApiKey([REDACTED])"),
            AuthMaterial::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Source of per-tenant credentials for the retry loop
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Currently valid credentials, refreshed transparently when close to expiry.
    async fn credentials(
        &self,
        tenant_id: Uuid,
        provider: &str,
    ) -> Result<AuthMaterial, CredentialError>;

    /// Refresh after the provider rejected the current credentials.
    async fn force_refresh(&self, tenant_id: Uuid, provider: &str)
    -> Result<(), CredentialError>;
}

/// Hook notified when the loop backs off and when it resumes.
#[async_trait]
pub trait RetryObserver: Send + Sync {
    async fn retrying(&self, attempt: u32, error: &ProviderError, delay: Duration);
    async fn resumed(&self, attempt: u32);
}

/// Performs the backoff wait.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays instead of waiting. Used by tests.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}

/// Backoff parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub rate_limit_multiplier: u32,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryPolicyConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryPolicyConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            rate_limit_multiplier: config.rate_limit_multiplier.max(1),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
        }
    }

    /// Deterministic part of the delay after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32, kind: ErrorKind) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        match kind {
            ErrorKind::RateLimit => delay.saturating_mul(self.rate_limit_multiplier),
            _ => delay,
        }
    }

    /// Full delay before the next attempt, honoring a larger `Retry-After`.
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        let mut delay = self.backoff(attempt, error.kind());
        if let Some(retry_after) = error.retry_after()
            && retry_after > delay
        {
            delay = retry_after;
        }
        delay + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}

/// HTTP client bound to one provider, base URL and set of credentials.
#[derive(Clone)]
pub struct AuthenticatedClient {
    provider: String,
    http: reqwest::Client,
    base_url: String,
    auth: AuthMaterial,
    style: AuthStyle,
}

impl fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("auth", &self.auth)
            .finish()
    }
}

impl AuthenticatedClient {
    pub fn new(
        provider: impl Into<String>,
        http: reqwest::Client,
        base_url: impl Into<String>,
        auth: AuthMaterial,
        style: AuthStyle,
    ) -> Self {
        Self {
            provider: provider.into(),
            http,
            base_url: base_url.into(),
            auth,
            style,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Authorized request builder for `path` relative to the base URL.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, self.url(path))
            .header(header::ACCEPT, "application/json");
        self.authorize(builder)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match (&self.auth, self.style) {
            (AuthMaterial::Bearer(token), _) => builder.bearer_auth(token),
            (AuthMaterial::Basic { username, password }, _) => {
                builder.basic_auth(username, Some(password))
            }
            (AuthMaterial::ApiKey(key), AuthStyle::ApiKeyBasic { password }) => {
                builder.basic_auth(key, Some(password))
            }
            (AuthMaterial::ApiKey(key), _) => builder.bearer_auth(key),
        }
    }

    /// Send the request, mapping non-2xx statuses to [`ProviderError::Http`].
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ProviderError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.provider, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        debug!(provider = %self.provider, status = status.as_u16(), "provider returned error status");
        Err(ProviderError::http(
            &self.provider,
            status.as_u16(),
            &body,
            retry_after,
        ))
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let response = self.send(self.request(Method::GET, path).query(query)).await?;
        self.read_json(response).await
    }

    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(self.request(method, path).json(body)).await?;
        self.read_json(response).await
    }

    /// Send a JSON body and ignore whatever comes back.
    pub async fn send_json_empty<B>(&self, method: Method, path: &str, body: &B) -> Result<(), ProviderError>
    where
        B: Serialize + ?Sized,
    {
        self.send(self.request(method, path).json(body)).await?;
        Ok(())
    }

    pub async fn send_bytes(
        &self,
        method: Method,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), ProviderError> {
        let builder = self
            .request(method, path)
            .header(header::CONTENT_TYPE, content_type)
            .body(bytes);
        self.send(builder).await?;
        Ok(())
    }

    pub async fn read_json<T: DeserializeOwned>(&self, response: Response) -> Result<T, ProviderError> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.provider, e))?;
        let body: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
        serde_json::from_slice(body).map_err(|e| ProviderError::malformed(&self.provider, e.to_string()))
    }
}

/// `Retry-After` in delta-seconds form; HTTP dates are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Retrying executor for one provider
#[derive(Clone)]
pub struct ProviderClient {
    provider: String,
    base_url: String,
    style: AuthStyle,
    http: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ProviderClient {
    pub fn new(
        provider: impl Into<String>,
        base_url: impl Into<String>,
        style: AuthStyle,
        http: reqwest::Client,
        credentials: Arc<dyn CredentialProvider>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provider: provider.into(),
            base_url: base_url.into(),
            style,
            http,
            credentials,
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn execute<T, F, Fut>(&self, tenant_id: Uuid, op: F) -> Result<T, ProviderError>
    where
        F: FnMut(AuthenticatedClient) -> Fut + Send,
        Fut: Future<Output = Result<T, ProviderError>> + Send,
        T: Send,
    {
        self.execute_observed(tenant_id, None, op).await
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn execute_observed<T, F, Fut>(
        &self,
        tenant_id: Uuid,
        observer: Option<&dyn RetryObserver>,
        mut op: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut(AuthenticatedClient) -> Fut + Send,
        Fut: Future<Output = Result<T, ProviderError>> + Send,
        T: Send,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let auth = match self.credentials.credentials(tenant_id, &self.provider).await {
                Ok(auth) => auth,
                Err(err) => {
                    self.record_request("credentials_unavailable");
                    return Err(self.fail(attempt, ErrorKind::Auth, None, err.to_string()));
                }
            };
            let api = AuthenticatedClient::new(
                self.provider.clone(),
                self.http.clone(),
                self.base_url.clone(),
                auth,
                self.style,
            );

            let error = match op(api).await {
                Ok(value) => {
                    self.record_request("success");
                    return Ok(value);
                }
                Err(error) => error,
            };

            let kind = error.kind();
            self.record_request(kind.as_str());

            let delay = match kind {
                ErrorKind::Permanent => return Err(self.exhausted(attempt, &error)),
                ErrorKind::Auth => {
                    if attempt > 1 || attempt >= max_attempts {
                        return Err(self.exhausted(attempt, &error));
                    }
                    debug!(
                        tenant_id = %tenant_id,
                        provider = %self.provider,
                        "provider rejected credentials; refreshing once"
                    );
                    if let Err(refresh_err) =
                        self.credentials.force_refresh(tenant_id, &self.provider).await
                    {
                        return Err(self.fail(
                            attempt,
                            ErrorKind::Auth,
                            error.status(),
                            format!("{}; credential refresh failed: {refresh_err}", error.detail()),
                        ));
                    }
                    Duration::ZERO
                }
                ErrorKind::RateLimit | ErrorKind::Transient => {
                    if attempt >= max_attempts {
                        return Err(self.exhausted(attempt, &error));
                    }
                    self.policy.delay_for(attempt, &error)
                }
            };

            counter!(
                "ats_sync_provider_retries_total",
                "provider" => self.provider.clone(),
                "kind" => kind.as_str()
            )
            .increment(1);
            warn!(
                tenant_id = %tenant_id,
                provider = %self.provider,
                attempt,
                kind = %kind,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "provider call failed; retrying"
            );

            if let Some(observer) = observer {
                observer.retrying(attempt, &error, delay).await;
            }
            if !delay.is_zero() {
                self.sleeper.sleep(delay).await;
            }
            if let Some(observer) = observer {
                observer.resumed(attempt + 1).await;
            }
        }
    }

    fn record_request(&self, outcome: &'static str) {
        counter!(
            "ats_sync_provider_requests_total",
            "provider" => self.provider.clone(),
            "outcome" => outcome
        )
        .increment(1);
    }

    fn exhausted(&self, attempts: u32, error: &ProviderError) -> ProviderError {
        self.fail(attempts, error.kind(), error.status(), error.detail())
    }

    fn fail(&self, attempts: u32, kind: ErrorKind, status: Option<u16>, message: String) -> ProviderError {
        ProviderError::Failed {
            provider: self.provider.clone(),
            attempts,
            kind,
            status,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StaticCredentials {
        refreshes: AtomicU32,
        fail_refresh: bool,
    }

    impl StaticCredentials {
        fn new() -> Self {
            Self {
                refreshes: AtomicU32::new(0),
                fail_refresh: false,
            }
        }
    }

    #[async_trait]
    impl CredentialProvider for StaticCredentials {
        async fn credentials(&self, _: Uuid, _: &str) -> Result<AuthMaterial, CredentialError> {
            let generation = self.refreshes.load(Ordering::SeqCst);
            Ok(AuthMaterial::Bearer(format!("token-{generation}")))
        }

        async fn force_refresh(&self, _: Uuid, provider: &str) -> Result<(), CredentialError> {
            if self.fail_refresh {
                return Err(CredentialError::ReconnectRequired {
                    provider: provider.to_string(),
                    reason: "refresh token revoked".into(),
                });
            }
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            rate_limit_multiplier: 5,
            max_jitter: Duration::ZERO,
        }
    }

    fn client(creds: Arc<StaticCredentials>, sleeper: Arc<RecordingSleeper>) -> ProviderClient {
        ProviderClient::new(
            "lever",
            "https://api.lever.test/v1",
            AuthStyle::OAuth2,
            reqwest::Client::new(),
            creds,
            policy(),
        )
        .with_sleeper(sleeper)
    }

    fn http_error(status: u16) -> ProviderError {
        ProviderError::http("lever", status, "boom", None)
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let p = policy();
        assert_eq!(p.backoff(1, ErrorKind::Transient), Duration::from_millis(1000));
        assert_eq!(p.backoff(2, ErrorKind::Transient), Duration::from_millis(2000));
        assert_eq!(p.backoff(3, ErrorKind::Transient), Duration::from_millis(4000));
        assert_eq!(p.backoff(2, ErrorKind::RateLimit), Duration::from_millis(10_000));
    }

    #[test]
    fn larger_retry_after_wins() {
        let p = policy();
        let err = ProviderError::http("lever", 429, "", Some(Duration::from_secs(30)));
        assert_eq!(p.delay_for(1, &err), Duration::from_secs(30));
        let err = ProviderError::http("lever", 429, "", Some(Duration::from_secs(1)));
        assert_eq!(p.delay_for(1, &err), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_below_bound() {
        let p = RetryPolicy {
            max_jitter: Duration::from_millis(1000),
            ..policy()
        };
        for _ in 0..50 {
            let delay = p.delay_for(1, &http_error(503));
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay < Duration::from_millis(2000));
        }
    }

    #[test]
    fn auth_material_debug_is_redacted() {
        let text = format!("{:?}", AuthMaterial::Bearer("secret-token".into()));
        assert!(!text.contains("secret-token"));
        let text = format!(
            "{:?}",
            AuthMaterial::Basic {
                username: "svc".into(),
                password: "hunter2".into()
            }
        );
        assert!(text.contains("svc"));
        assert!(!text.contains("hunter2"));
    }

    #[tokio::test]
    async fn rate_limit_waits_five_times_base() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let client = client(Arc::new(StaticCredentials::new()), sleeper.clone());
        let calls = AtomicU32::new(0);

        let result = client
            .execute(Uuid::new_v4(), |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n == 0 { Err(http_error(429)) } else { Ok("done") } }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(5000)]);
    }

    #[tokio::test]
    async fn transient_errors_exhaust_after_three_attempts() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let client = client(Arc::new(StaticCredentials::new()), sleeper.clone());
        let calls = AtomicU32::new(0);

        let err = client
            .execute(Uuid::new_v4(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(http_error(503)) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.to_string().starts_with("lever request failed after 3 attempt(s)"));
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let client = client(Arc::new(StaticCredentials::new()), sleeper.clone());
        let calls = AtomicU32::new(0);

        let err = client
            .execute(Uuid::new_v4(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(http_error(422)) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays().is_empty());
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert_eq!(err.status(), Some(422));
    }

    #[tokio::test]
    async fn auth_error_refreshes_exactly_once() {
        let creds = Arc::new(StaticCredentials::new());
        let sleeper = Arc::new(RecordingSleeper::new());
        let client = client(creds.clone(), sleeper.clone());
        let seen = Mutex::new(Vec::new());

        let err = client
            .execute(Uuid::new_v4(), |api| {
                seen.lock().unwrap().push(format!("{:?}", api.auth));
                async { Err::<(), _>(http_error(401)) }
            })
            .await
            .unwrap_err();

        assert_eq!(creds.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(err.attempts(), 2);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn refreshed_token_is_used_on_retry() {
        let creds = Arc::new(StaticCredentials::new());
        let client = client(creds.clone(), Arc::new(RecordingSleeper::new()));

        let result = client
            .execute(Uuid::new_v4(), |api| async move {
                match &api.auth {
                    AuthMaterial::Bearer(token) if token == "token-1" => Ok(token.clone()),
                    _ => Err(http_error(403)),
                }
            })
            .await;

        assert_eq!(result.unwrap(), "token-1");
    }

    #[tokio::test]
    async fn failed_refresh_ends_the_call() {
        let creds = Arc::new(StaticCredentials {
            refreshes: AtomicU32::new(0),
            fail_refresh: true,
        });
        let client = client(creds, Arc::new(RecordingSleeper::new()));

        let err = client
            .execute(Uuid::new_v4(), |_| async { Err::<(), _>(http_error(401)) })
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 1);
        assert!(err.to_string().contains("credential refresh failed"));
    }

    #[tokio::test]
    async fn auth_error_after_first_attempt_is_terminal() {
        let creds = Arc::new(StaticCredentials::new());
        let sleeper = Arc::new(RecordingSleeper::new());
        let client = client(creds.clone(), sleeper.clone());
        let calls = AtomicU32::new(0);

        let err = client
            .execute(Uuid::new_v4(), |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err::<(), _>(http_error(503))
                    } else {
                        Err(http_error(401))
                    }
                }
            })
            .await
            .unwrap_err();

        assert_eq!(creds.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(err.attempts(), 2);
    }

    #[test]
    fn retry_after_header_is_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::RETRY_AFTER, "12".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));

        headers.insert(
            header::RETRY_AFTER,
            "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap(),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }
}
