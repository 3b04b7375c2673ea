//! Provider error classification
//!
//! Every failure coming back from a provider call is reduced to one of four
//! [`ErrorKind`]s, which decide whether the retrying client refreshes
//! credentials, backs off, or gives up.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Failure class driving the retry decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 401/403: refresh credentials once, then fail
    Auth,
    /// 429: retry with amplified backoff
    RateLimit,
    /// Other 4xx: fail immediately
    Permanent,
    /// 5xx, timeouts, dropped connections: retry with backoff
    Transient,
}

impl ErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorKind::Auth,
            429 => ErrorKind::RateLimit,
            400..=499 => ErrorKind::Permanent,
            _ => ErrorKind::Transient,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Transient => "transient",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by provider adapters and the retrying client
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("{provider} returned HTTP {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    #[error("{provider} request failed: {message}")]
    Network {
        provider: String,
        message: String,
        timeout: bool,
    },

    /// A 2xx whose body could not be read. The remote side already applied
    /// the request, so it is never repeated.
    #[error("{provider} returned an unexpected response: {message}")]
    MalformedResponse { provider: String, message: String },

    /// The request could not be built from the record we were given.
    #[error("{provider} request is invalid: {message}")]
    InvalidRequest { provider: String, message: String },

    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: String,
        operation: &'static str,
    },

    /// Terminal outcome of a retried call.
    #[error("{provider} request failed after {attempts} attempt(s) ({kind}): {message}")]
    Failed {
        provider: String,
        attempts: u32,
        kind: ErrorKind,
        status: Option<u16>,
        message: String,
    },
}

const BODY_SNIPPET_CHARS: usize = 200;

impl ProviderError {
    /// Build an HTTP error, truncating the body so logs stay bounded.
    pub fn http(
        provider: impl Into<String>,
        status: u16,
        body: &str,
        retry_after: Option<Duration>,
    ) -> Self {
        let body = if body.chars().count() > BODY_SNIPPET_CHARS {
            let truncated: String = body.chars().take(BODY_SNIPPET_CHARS).collect();
            format!("{truncated}...")
        } else {
            body.to_string()
        };
        ProviderError::Http {
            provider: provider.into(),
            status,
            body,
            retry_after,
        }
    }

    pub fn from_reqwest(provider: impl Into<String>, err: reqwest::Error) -> Self {
        let provider = provider.into();
        if err.is_decode() {
            return ProviderError::MalformedResponse {
                provider,
                message: err.to_string(),
            };
        }
        if let Some(status) = err.status() {
            return ProviderError::http(provider, status.as_u16(), &err.to_string(), None);
        }
        ProviderError::Network {
            provider,
            timeout: err.is_timeout(),
            message: err.to_string(),
        }
    }

    pub fn malformed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::MalformedResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn invalid_request(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::InvalidRequest {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(provider: impl Into<String>, operation: &'static str) -> Self {
        ProviderError::Unsupported {
            provider: provider.into(),
            operation,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Http { status, .. } => ErrorKind::from_status(*status),
            ProviderError::Network { .. } => ErrorKind::Transient,
            ProviderError::MalformedResponse { .. }
            | ProviderError::InvalidRequest { .. }
            | ProviderError::Unsupported { .. } => ErrorKind::Permanent,
            ProviderError::Failed { kind, .. } => *kind,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            ProviderError::Failed { status, .. } => *status,
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Number of attempts recorded on a terminal error, 1 otherwise.
    pub fn attempts(&self) -> u32 {
        match self {
            ProviderError::Failed { attempts, .. } => *attempts,
            _ => 1,
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Http { provider, .. }
            | ProviderError::Network { provider, .. }
            | ProviderError::MalformedResponse { provider, .. }
            | ProviderError::InvalidRequest { provider, .. }
            | ProviderError::Unsupported { provider, .. }
            | ProviderError::Failed { provider, .. } => provider,
        }
    }

    /// Short description without the provider prefix.
    pub fn detail(&self) -> String {
        match self {
            ProviderError::Http { status, body, .. } if body.is_empty() => {
                format!("HTTP {status}")
            }
            ProviderError::Http { status, body, .. } => format!("HTTP {status}: {body}"),
            ProviderError::Network { message, .. }
            | ProviderError::MalformedResponse { message, .. }
            | ProviderError::InvalidRequest { message, .. }
            | ProviderError::Failed { message, .. } => message.clone(),
            ProviderError::Unsupported { operation, .. } => {
                format!("operation {operation} is not supported")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_classify_into_kinds() {
        assert_eq!(ErrorKind::from_status(401), ErrorKind::Auth);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::Auth);
        assert_eq!(ErrorKind::from_status(429), ErrorKind::RateLimit);
        assert_eq!(ErrorKind::from_status(400), ErrorKind::Permanent);
        assert_eq!(ErrorKind::from_status(404), ErrorKind::Permanent);
        assert_eq!(ErrorKind::from_status(422), ErrorKind::Permanent);
        assert_eq!(ErrorKind::from_status(500), ErrorKind::Transient);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::Transient);
    }

    #[test]
    fn network_errors_are_transient() {
        let network = ProviderError::Network {
            provider: "lever".into(),
            message: "connection reset".into(),
            timeout: false,
        };
        assert_eq!(network.kind(), ErrorKind::Transient);
    }

    #[test]
    fn unreadable_success_is_never_retried() {
        assert_eq!(
            ProviderError::malformed("lever", "missing id").kind(),
            ErrorKind::Permanent
        );
    }

    #[test]
    fn invalid_requests_are_permanent() {
        let err = ProviderError::invalid_request("whatsapp", "candidate has no phone number");
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert_eq!(err.detail(), "candidate has no phone number");
    }

    #[test]
    fn http_body_is_truncated() {
        let body = "x".repeat(500);
        let err = ProviderError::http("hubspot", 500, &body, None);
        match err {
            ProviderError::Http { body, .. } => assert_eq!(body.chars().count(), 203),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn failed_message_names_provider_and_attempts() {
        let err = ProviderError::Failed {
            provider: "greenhouse".into(),
            attempts: 3,
            kind: ErrorKind::Transient,
            status: Some(503),
            message: "HTTP 503".into(),
        };
        assert_eq!(
            err.to_string(),
            "greenhouse request failed after 3 attempt(s) (transient): HTTP 503"
        );
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.status(), Some(503));
    }
}
