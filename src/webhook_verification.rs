//! # Webhook Signature Verification
//!
//! Inbound provider webhooks carry an HMAC-SHA256 of the raw body, hex
//! encoded, in a provider-specific header. Comparison is constant time.

use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::providers::AtsProvider;

type HmacSha256 = Hmac<Sha256>;

/// Errors that can occur during webhook signature verification
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Missing required signature header: {header}")]
    MissingSignature { header: String },

    #[error("Invalid signature format: {header}")]
    InvalidSignatureFormat { header: String },

    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Provider {provider} does not send webhooks")]
    UnsupportedProvider { provider: String },

    #[error("Webhook verification not configured for provider: {provider}")]
    NotConfigured { provider: String },
}

impl VerificationError {
    /// Returns the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            VerificationError::UnsupportedProvider { .. } => StatusCode::NOT_FOUND,
            VerificationError::NotConfigured { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

pub type VerificationResult<T> = Result<T, VerificationError>;

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(body: &[u8], secret: &str) -> VerificationResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| VerificationError::VerificationFailed)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check `signature` against the body. Accepts bare hex or a `sha256=` prefix.
pub fn verify_signature(
    body: &[u8],
    header: &str,
    signature: &str,
    secret: &str,
) -> VerificationResult<()> {
    let signature = signature.trim();
    if signature.is_empty() {
        return Err(VerificationError::MissingSignature {
            header: header.to_string(),
        });
    }
    let hex_part = signature
        .strip_prefix("sha256=")
        .or_else(|| signature.strip_prefix("sha256 "))
        .unwrap_or(signature);

    let provided = hex::decode(hex_part).map_err(|_| VerificationError::InvalidSignatureFormat {
        header: format!("{header} contains invalid hex"),
    })?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| VerificationError::VerificationFailed)?;
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    if expected.as_slice().ct_eq(&provided).into() {
        Ok(())
    } else {
        Err(VerificationError::VerificationFailed)
    }
}

/// Verify an inbound request for `provider` using its configured secret.
pub fn verify_request(
    provider: &dyn AtsProvider,
    headers: &HeaderMap,
    body: &[u8],
    secret: Option<&str>,
) -> VerificationResult<()> {
    let header = provider
        .webhook_signature_header()
        .filter(|_| provider.capabilities().supports_webhooks)
        .ok_or_else(|| VerificationError::UnsupportedProvider {
            provider: provider.slug().to_string(),
        })?;
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or_else(|| VerificationError::NotConfigured {
            provider: provider.slug().to_string(),
        })?;

    let signature = headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| VerificationError::MissingSignature {
            header: header.to_string(),
        })?;

    debug!(provider = provider.slug(), body_size = body.len(), "verifying webhook signature");
    verify_signature(body, header, signature, secret)
}
