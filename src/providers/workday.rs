//! Workday Recruiting adapter
//!
//! URLs embed the Workday tenant name, taken from the provider account
//! setting unless an explicit base URL is configured. Hired candidates are
//! handed off as pre-hires.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};

use super::capabilities::{ProviderCapabilities, SyncMode};
use super::client::AuthenticatedClient;
use super::error::ProviderError;
use super::stage_mapping::StageMapping;
use super::trait_::{AtsProvider, AuthStyle};
use super::types::{CandidatePhoto, CandidateRecord, RemoteRecord};
use crate::config::ProviderSettings;

pub const WORKDAY_SLUG: &str = "workday";

const DEFAULT_HOST: &str = "https://wd2-impl-services1.workday.com";

const STAGES: StageMapping = StageMapping::new(
    &[
        ("applied", "Review"),
        ("screening", "Screen"),
        ("assessment", "Assessment"),
        ("interview", "Interview"),
        ("offer", "Offer"),
        ("hired", "Ready for Hire"),
        ("rejected", "Declined"),
    ],
    "Screen",
);

pub struct WorkdayProvider {
    api_base: String,
    token_url: Option<String>,
}

impl WorkdayProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        let tenant = settings.account.as_deref();
        let api_base = match (&settings.api_base, tenant) {
            (Some(base), _) => base.clone(),
            (None, Some(tenant)) => format!("{DEFAULT_HOST}/ccx/api/recruiting/v4/{tenant}"),
            (None, None) => String::new(),
        };
        let token_url = settings
            .token_url
            .clone()
            .or_else(|| tenant.map(|t| format!("{DEFAULT_HOST}/ccx/oauth2/{t}/token")));
        Self {
            api_base,
            token_url,
        }
    }

    fn candidate_body(candidate: &CandidateRecord) -> Value {
        json!({
            "name": {
                "firstName": candidate.first_name,
                "lastName": candidate.last_name,
            },
            "contact": {
                "email": candidate.email,
                "phone": candidate.phone,
            },
            "source": { "descriptor": candidate.source.as_deref().unwrap_or("ATS Sync") },
        })
    }
}

#[async_trait]
impl AtsProvider for WorkdayProvider {
    fn slug(&self) -> &'static str {
        WORKDAY_SLUG
    }

    fn display_name(&self) -> &'static str {
        "Workday"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::new(SyncMode::Push, SyncMode::Pull, SyncMode::None, false)
    }

    fn auth_style(&self) -> AuthStyle {
        AuthStyle::OAuth2
    }

    fn api_base(&self) -> &str {
        &self.api_base
    }

    fn token_url(&self) -> Option<&str> {
        self.token_url.as_deref()
    }

    fn stage_mapping(&self) -> &StageMapping {
        &STAGES
    }

    async fn find_candidate_by_email(
        &self,
        api: &AuthenticatedClient,
        email: &str,
    ) -> Result<Option<RemoteRecord>, ProviderError> {
        let response: Value = api
            .get_json("/candidates", &[("email", email), ("limit", "1")])
            .await?;
        match response.pointer("/data/0") {
            Some(found) => RemoteRecord::from_json(WORKDAY_SLUG, found.clone(), "/id").map(Some),
            None => Ok(None),
        }
    }

    async fn create_candidate(
        &self,
        api: &AuthenticatedClient,
        candidate: &CandidateRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        let response: Value = api
            .send_json(Method::POST, "/candidates", &Self::candidate_body(candidate))
            .await?;
        RemoteRecord::from_json(WORKDAY_SLUG, response, "/id")
    }

    async fn update_candidate(
        &self,
        api: &AuthenticatedClient,
        external_id: &str,
        candidate: &CandidateRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        let response: Value = api
            .send_json(
                Method::PATCH,
                &format!("/candidates/{external_id}"),
                &Self::candidate_body(candidate),
            )
            .await?;
        Ok(RemoteRecord::new(external_id, response))
    }

    async fn update_stage(
        &self,
        api: &AuthenticatedClient,
        external_id: &str,
        stage: &str,
    ) -> Result<(), ProviderError> {
        api.send_json_empty(
            Method::PATCH,
            &format!("/candidates/{external_id}"),
            &json!({ "recruitingStage": { "descriptor": stage } }),
        )
        .await
    }

    async fn list_jobs(&self, api: &AuthenticatedClient) -> Result<Vec<RemoteRecord>, ProviderError> {
        let response: Value = api.get_json("/jobPostings", &[("limit", "100")]).await?;
        let postings = match response.get("data") {
            Some(Value::Array(items)) => items.clone(),
            _ => {
                return Err(ProviderError::malformed(
                    WORKDAY_SLUG,
                    "jobPostings response has no data array",
                ));
            }
        };
        postings
            .into_iter()
            .map(|posting| RemoteRecord::from_json(WORKDAY_SLUG, posting, "/id"))
            .collect()
    }

    fn supports_handoff(&self) -> bool {
        true
    }

    async fn create_employee(
        &self,
        api: &AuthenticatedClient,
        candidate: &CandidateRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        let mut body = Self::candidate_body(candidate);
        if let Some(title) = &candidate.job_title {
            body["position"] = json!({ "descriptor": title });
        }
        if let Some(start) = candidate.start_date {
            body["hireDate"] = json!(start.to_string());
        }
        let response: Value = api.send_json(Method::POST, "/preHires", &body).await?;
        RemoteRecord::from_json(WORKDAY_SLUG, response, "/id")
    }

    async fn upload_employee_photo(
        &self,
        api: &AuthenticatedClient,
        employee_id: &str,
        photo: &CandidatePhoto,
    ) -> Result<(), ProviderError> {
        api.send_bytes(
            Method::PUT,
            &format!("/preHires/{employee_id}/photo"),
            &photo.content_type,
            photo.bytes.clone(),
        )
        .await
    }
}
