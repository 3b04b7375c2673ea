//! Provider adapter trait
//!
//! Every ATS/CRM integration implements [`AtsProvider`]. Operations receive an
//! [`AuthenticatedClient`] built for the current attempt so that they can be
//! run as the unit of work inside [`super::ProviderClient::execute`].

use async_trait::async_trait;

use super::capabilities::ProviderCapabilities;
use super::client::AuthenticatedClient;
use super::error::ProviderError;
use super::stage_mapping::StageMapping;
use super::types::{CandidatePhoto, CandidateRecord, InterviewRecord, RemoteRecord};
use crate::models::integration_credential::AuthKind;

/// How stored credentials are presented to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// OAuth access token sent as a Bearer token
    OAuth2,
    /// API key as the Basic username with a fixed password
    ApiKeyBasic { password: &'static str },
    /// API key sent as a Bearer token
    ApiKeyBearer,
}

impl AuthStyle {
    pub fn auth_kind(self) -> AuthKind {
        match self {
            AuthStyle::OAuth2 => AuthKind::OAuth2,
            AuthStyle::ApiKeyBasic { .. } | AuthStyle::ApiKeyBearer => AuthKind::ApiKey,
        }
    }

    pub fn uses_oauth(self) -> bool {
        self == AuthStyle::OAuth2
    }
}

#[async_trait]
pub trait AtsProvider: Send + Sync {
    fn slug(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    fn capabilities(&self) -> ProviderCapabilities;

    fn auth_style(&self) -> AuthStyle;

    /// REST base URL; empty when the account is not configured.
    fn api_base(&self) -> &str;

    /// OAuth token endpoint, `None` for API-key providers.
    fn token_url(&self) -> Option<&str> {
        None
    }

    fn stage_mapping(&self) -> &StageMapping;

    /// Header carrying the webhook HMAC, `None` when webhooks are unsupported.
    fn webhook_signature_header(&self) -> Option<&'static str> {
        None
    }

    /// Look up an existing remote candidate by email before creating one.
    async fn find_candidate_by_email(
        &self,
        _api: &AuthenticatedClient,
        _email: &str,
    ) -> Result<Option<RemoteRecord>, ProviderError> {
        Ok(None)
    }

    async fn create_candidate(
        &self,
        _api: &AuthenticatedClient,
        _candidate: &CandidateRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        Err(ProviderError::unsupported(self.slug(), "create_candidate"))
    }

    async fn update_candidate(
        &self,
        _api: &AuthenticatedClient,
        _external_id: &str,
        _candidate: &CandidateRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        Err(ProviderError::unsupported(self.slug(), "update_candidate"))
    }

    /// Push an already translated provider stage.
    async fn update_stage(
        &self,
        _api: &AuthenticatedClient,
        _external_id: &str,
        _stage: &str,
    ) -> Result<(), ProviderError> {
        Err(ProviderError::unsupported(self.slug(), "update_stage"))
    }

    async fn create_interview(
        &self,
        _api: &AuthenticatedClient,
        _candidate_external_id: &str,
        _candidate: &CandidateRecord,
        _interview: &InterviewRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        Err(ProviderError::unsupported(self.slug(), "create_interview"))
    }

    async fn complete_interview(
        &self,
        _api: &AuthenticatedClient,
        _interview_external_id: &str,
        _candidate_external_id: &str,
        _candidate: &CandidateRecord,
        _interview: &InterviewRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        Err(ProviderError::unsupported(self.slug(), "complete_interview"))
    }

    /// Open jobs for providers that expose job sync.
    async fn list_jobs(&self, _api: &AuthenticatedClient) -> Result<Vec<RemoteRecord>, ProviderError> {
        Err(ProviderError::unsupported(self.slug(), "list_jobs"))
    }

    /// Whether a hired candidate is handed off as an employee.
    fn supports_handoff(&self) -> bool {
        false
    }

    async fn create_employee(
        &self,
        _api: &AuthenticatedClient,
        _candidate: &CandidateRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        Err(ProviderError::unsupported(self.slug(), "create_employee"))
    }

    async fn upload_employee_photo(
        &self,
        _api: &AuthenticatedClient,
        _employee_id: &str,
        _photo: &CandidatePhoto,
    ) -> Result<(), ProviderError> {
        Err(ProviderError::unsupported(self.slug(), "upload_employee_photo"))
    }
}
