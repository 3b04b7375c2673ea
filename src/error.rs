//! # Error Handling
//!
//! Every handler failure becomes an [`ApiError`] rendered as
//! `application/problem+json`, carrying the request trace id.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::credentials::CredentialError;
use crate::providers::{ProviderError as UpstreamError, RegistryError};
use crate::repositories::SyncLogError;
use crate::sync::SyncError;
use crate::telemetry;
use crate::webhook_verification::VerificationError;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Extract current trace ID from the active tracing span (falls back to generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                // Fallback: generate a correlation ID for basic client-server log correlation
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const MYSQL_DUPLICATE_CODES: &[&str] = &["1022", "1062", "1169", "1586"];
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    if let Some(code) = db_error.code() {
        let code_str = code.as_ref();
        if code_str == PG_UNIQUE
            || MYSQL_DUPLICATE_CODES.contains(&code_str)
            || SQLITE_DUPLICATE_CODES.contains(&code_str)
        {
            return true;
        }

        if let Ok(code_number) = code_str.parse::<u32>()
            && (MYSQL_DUPLICATE_CODES
                .iter()
                .filter_map(|value| value.parse::<u32>().ok())
                .any(|known| known == code_number)
                || SQLITE_DUPLICATE_CODES
                    .iter()
                    .filter_map(|value| value.parse::<u32>().ok())
                    .any(|known| known == code_number))
        {
            return true;
        }
    }

    false
}

/// Standard error types with predefined status codes
#[derive(Debug, Error)]
pub enum ErrorType {
    #[error("Bad Request")]
    BadRequest,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Not Found")]
    NotFound,
    #[error("Conflict")]
    Conflict,
    #[error("Too Many Requests")]
    TooManyRequests,
    #[error("Internal Server Error")]
    InternalServerError,
    #[error("Bad Gateway")]
    BadGateway,
    #[error("Service Unavailable")]
    ServiceUnavailable,
}

impl ErrorType {
    /// Get the appropriate HTTP status code for this error type
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorType::BadRequest => StatusCode::BAD_REQUEST,
            ErrorType::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorType::Forbidden => StatusCode::FORBIDDEN,
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::Conflict => StatusCode::CONFLICT,
            ErrorType::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorType::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorType::BadGateway => StatusCode::BAD_GATEWAY,
            ErrorType::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the error code string for this error type in SCREAMING_SNAKE_CASE
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorType::BadRequest => "VALIDATION_FAILED",
            ErrorType::Unauthorized => "UNAUTHORIZED",
            ErrorType::Forbidden => "FORBIDDEN",
            ErrorType::NotFound => "NOT_FOUND",
            ErrorType::Conflict => "CONFLICT",
            ErrorType::TooManyRequests => "RATE_LIMITED",
            ErrorType::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorType::BadGateway => "PROVIDER_ERROR",
            ErrorType::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

/// Upstream provider error information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderError {
    /// Provider slug (e.g., "greenhouse", "lever")
    pub provider: String,
    /// HTTP status code from upstream
    pub status: u16,
    /// Response body snippet from upstream (truncated for security)
    pub body_snippet: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        // Add Retry-After header if present
        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

// Error mappers for common sources

impl From<ErrorType> for ApiError {
    fn from(error_type: ErrorType) -> Self {
        Self::new(
            error_type.status_code(),
            error_type.error_code(),
            &error_type.to_string(),
        )
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        // Log the full error for debugging
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Query(query_err) => {
                tracing::error!("Database query error: {:?}", query_err);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
            sea_orm::DbErr::Exec(exec_err) => {
                tracing::error!("Database execution error: {:?}", exec_err);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

/// Create a provider upstream error
pub fn provider_error(provider: String, status: u16, body: Option<String>) -> ApiError {
    let provider_error = ProviderError {
        provider: provider.clone(),
        status,
        body_snippet: body.map(|b| {
            if b.chars().count() > 200 {
                let truncated: String = b.chars().take(200).collect();
                format!("{}...", truncated)
            } else {
                b
            }
        }),
    };

    // Every upstream failure is a 502, whatever the provider returned.
    let api_status = StatusCode::BAD_GATEWAY;
    let api_code = "PROVIDER_ERROR";

    let message = if status == 0 {
        format!("Provider {} request failed", provider)
    } else {
        format!("Provider {} returned error status {}", provider, status)
    };
    ApiError::new(api_status, api_code, &message)
    .with_details(json!(provider_error))
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create an unauthorized error (401) with explicit trace_id
pub fn unauthorized_with_trace_id(message: Option<&str>, trace_id: String) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    let mut error = ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg);
    error.trace_id = Some(trace_id.into_boxed_str());
    error
}

/// Create a forbidden error (403)
pub fn forbidden(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Insufficient permissions");
    ApiError::new(StatusCode::FORBIDDEN, "FORBIDDEN", msg)
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}


impl From<UpstreamError> for ApiError {
    fn from(error: UpstreamError) -> Self {
        tracing::warn!(error = %error, kind = %error.kind(), "provider call failed");
        provider_error(
            error.provider().to_string(),
            error.status().unwrap_or(0),
            Some(error.detail()),
        )
    }
}

impl From<RegistryError> for ApiError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::ProviderNotFound { name } => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Unknown provider '{}'", name),
            ),
            RegistryError::NotConfigured { .. } => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "PROVIDER_NOT_CONFIGURED",
                &error.to_string(),
            ),
            RegistryError::HttpClient(_) => {
                tracing::error!(error = %error, "registry failure");
                ErrorType::InternalServerError.into()
            }
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(error: CredentialError) -> Self {
        match error {
            CredentialError::NotConnected { .. } => {
                Self::new(StatusCode::NOT_FOUND, "NOT_CONNECTED", &error.to_string())
            }
            CredentialError::ReconnectRequired { .. } => Self::new(
                StatusCode::CONFLICT,
                "RECONNECT_REQUIRED",
                &error.to_string(),
            ),
            CredentialError::UnknownProvider(ref name) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Unknown provider '{}'", name),
            ),
            CredentialError::NotOAuth { .. } | CredentialError::OAuthOnly { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &error.to_string())
            }
            CredentialError::OAuthNotConfigured { .. } => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "PROVIDER_NOT_CONFIGURED",
                &error.to_string(),
            ),
            CredentialError::Exchange { .. } | CredentialError::Refresh { .. } => {
                Self::new(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", &error.to_string())
            }
            CredentialError::Storage(db) => db.into(),
            CredentialError::MissingKey | CredentialError::Crypto(_) => {
                tracing::error!(error = %error, "credential sealing failed");
                ErrorType::InternalServerError.into()
            }
        }
    }
}

impl From<SyncLogError> for ApiError {
    fn from(error: SyncLogError) -> Self {
        match error {
            SyncLogError::NotFound(id) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Sync log {} not found", id),
            ),
            SyncLogError::InvalidTransition { .. } | SyncLogError::AlreadyCompleted(_) => {
                Self::new(StatusCode::CONFLICT, "CONFLICT", &error.to_string())
            }
            SyncLogError::Database(db) => db.into(),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::EntityNotFound { .. } => {
                Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", &error.to_string())
            }
            SyncError::Provider(err) => err.into(),
            SyncError::Registry(err) => err.into(),
            SyncError::Credentials(err) => err.into(),
            SyncError::Log(err) => err.into(),
            SyncError::Storage(err) => err.into(),
            SyncError::Source(err) => {
                tracing::error!(error = %err, "candidate source failed");
                ErrorType::InternalServerError.into()
            }
        }
    }
}

impl From<VerificationError> for ApiError {
    fn from(error: VerificationError) -> Self {
        let code = match error {
            VerificationError::UnsupportedProvider { .. } => "NOT_FOUND",
            VerificationError::NotConfigured { .. } => "WEBHOOK_NOT_CONFIGURED",
            _ => "INVALID_SIGNATURE",
        };
        Self::new(error.status_code(), code, &error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_api_error_with_details_and_retry_after() {
        let error = ApiError::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", "Slow down")
            .with_details(json!({"limit": 30}))
            .with_retry_after(42);

        assert_eq!(error.details, Some(Box::new(json!({"limit": 30}))));
        assert_eq!(error.retry_after, Some(42));
    }

    #[test]
    fn test_retry_after_and_content_type_headers() {
        let response = ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Rate limit exceeded",
        )
        .with_retry_after(60)
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("retry-after").unwrap(), "60");
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn test_trace_id_falls_back_to_correlation_id() {
        let error = ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR", "x");
        let trace_id = error.trace_id.unwrap();
        assert!(trace_id.starts_with("corr-"));
        assert_eq!(trace_id.len(), 13);
    }

    #[tokio::test]
    async fn test_trace_id_uses_active_context() {
        let error = telemetry::with_trace_context(
            telemetry::TraceContext {
                trace_id: "req-123".into(),
            },
            async { ApiError::from(ErrorType::NotFound) },
        )
        .await;
        assert_eq!(error.trace_id.as_deref(), Some("req-123"));
    }

    #[test]
    fn test_from_anyhow_hides_details() {
        let api_error: ApiError = anyhow::anyhow!("db password wrong").into();
        assert_eq!(api_error.code, Box::from("INTERNAL_SERVER_ERROR"));
        assert_eq!(api_error.message, Box::from("An internal error occurred"));
    }

    #[test]
    fn test_all_provider_errors_map_to_bad_gateway() {
        for status in [400, 401, 429, 500, 503] {
            let error = provider_error("lever".to_string(), status, Some("nope".to_string()));
            assert_eq!(error.status, StatusCode::BAD_GATEWAY);
            assert_eq!(error.code, Box::from("PROVIDER_ERROR"));
            let details = error.details.unwrap();
            assert_eq!(details["provider"], "lever");
            assert_eq!(details["status"], status);
        }
    }

    #[test]
    fn test_body_snippet_truncates_on_char_boundaries() {
        let body = "候选人🚀 ".repeat(100);
        let error = provider_error("greenhouse".to_string(), 500, Some(body));
        let details = error.details.unwrap();
        let snippet = details["body_snippet"].as_str().unwrap();
        assert!(snippet.ends_with("..."));
        assert_eq!(snippet.chars().count(), 203);
    }

    #[test]
    fn test_upstream_failure_carries_provider_and_status() {
        let upstream = UpstreamError::Failed {
            provider: "greenhouse".into(),
            attempts: 3,
            kind: crate::providers::ErrorKind::Transient,
            status: Some(503),
            message: "HTTP 503".into(),
        };
        let error: ApiError = SyncError::Provider(upstream).into();
        assert_eq!(error.status, StatusCode::BAD_GATEWAY);
        let details = error.details.unwrap();
        assert_eq!(details["provider"], "greenhouse");
        assert_eq!(details["status"], 503);
    }

    #[test]
    fn test_domain_errors_map_to_status_codes() {
        let cases: Vec<(ApiError, StatusCode, &str)> = vec![
            (
                RegistryError::ProviderNotFound { name: "x".into() }.into(),
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
            ),
            (
                CredentialError::ReconnectRequired {
                    provider: "hubspot".into(),
                    reason: "invalid_grant".into(),
                }
                .into(),
                StatusCode::CONFLICT,
                "RECONNECT_REQUIRED",
            ),
            (
                CredentialError::OAuthOnly {
                    provider: "hubspot".into(),
                }
                .into(),
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
            ),
            (
                SyncLogError::NotFound(Uuid::nil()).into(),
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
            ),
            (
                SyncError::EntityNotFound {
                    entity_type: "candidate",
                    id: "c-1".into(),
                }
                .into(),
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
            ),
            (
                VerificationError::VerificationFailed.into(),
                StatusCode::UNAUTHORIZED,
                "INVALID_SIGNATURE",
            ),
        ];

        for (error, status, code) in cases {
            assert_eq!(error.status, status, "{}", error.message);
            assert_eq!(error.code.as_ref(), code);
        }
    }

    #[test]
    fn test_database_not_found_maps_to_404() {
        let api_error: ApiError = sea_orm::DbErr::RecordNotFound("credential".to_string()).into();
        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert!(api_error.message.contains("credential"));
    }

    #[test]
    fn test_auth_error_helpers() {
        assert_eq!(unauthorized(None).message, Box::from("Authentication required"));
        assert_eq!(unauthorized(Some("Invalid token")).status, StatusCode::UNAUTHORIZED);
        assert_eq!(forbidden(None).status, StatusCode::FORBIDDEN);
        let err = validation_error("bad", json!({"event": "unknown"}));
        assert_eq!(err.code, Box::from("VALIDATION_FAILED"));
        assert!(err.details.is_some());
    }
}
