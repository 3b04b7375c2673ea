//! Greenhouse Harvest adapter
//!
//! Harvest authenticates with the API key as the Basic username and an empty
//! password. Write calls carry an `On-Behalf-Of` user id taken from the
//! provider account setting.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde_json::{Value, json};

use super::capabilities::{ProviderCapabilities, SyncMode};
use super::client::AuthenticatedClient;
use super::error::ProviderError;
use super::stage_mapping::StageMapping;
use super::trait_::{AtsProvider, AuthStyle};
use super::types::{CandidateRecord, InterviewRecord, RemoteRecord};
use crate::config::ProviderSettings;

pub const GREENHOUSE_SLUG: &str = "greenhouse";

const DEFAULT_API_BASE: &str = "https://harvest.greenhouse.io/v1";
const STAGE_FIELD: &str = "ats_stage";

// Greenhouse has no "hired" stage; hires go through the offer flow.
const STAGES: StageMapping = StageMapping::new(
    &[
        ("applied", "Application Review"),
        ("screening", "Phone Screen"),
        ("interview", "Face to Face"),
        ("assessment", "Take Home Test"),
        ("offer", "Offer"),
    ],
    "Application Review",
);

pub struct GreenhouseProvider {
    api_base: String,
    on_behalf_of: Option<String>,
}

impl GreenhouseProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            api_base: settings
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            on_behalf_of: settings.account.clone(),
        }
    }

    fn write_request(&self, api: &AuthenticatedClient, method: Method, path: &str) -> RequestBuilder {
        let builder = api.request(method, path);
        match &self.on_behalf_of {
            Some(user_id) => builder.header("On-Behalf-Of", user_id),
            None => builder,
        }
    }

    fn candidate_body(candidate: &CandidateRecord) -> Value {
        let mut body = json!({
            "first_name": candidate.first_name,
            "last_name": candidate.last_name,
        });
        if let Some(email) = &candidate.email {
            body["email_addresses"] = json!([{ "value": email, "type": "personal" }]);
        }
        if let Some(phone) = &candidate.phone {
            body["phone_numbers"] = json!([{ "value": phone, "type": "mobile" }]);
        }
        if !candidate.tags.is_empty() {
            body["tags"] = json!(candidate.tags);
        }
        body
    }

    async fn write_json(
        &self,
        api: &AuthenticatedClient,
        method: Method,
        path: &str,
        body: &Value,
    ) -> Result<Value, ProviderError> {
        let response = api.send(self.write_request(api, method, path).json(body)).await?;
        api.read_json(response).await
    }
}

#[async_trait]
impl AtsProvider for GreenhouseProvider {
    fn slug(&self) -> &'static str {
        GREENHOUSE_SLUG
    }

    fn display_name(&self) -> &'static str {
        "Greenhouse"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::new(SyncMode::Write, SyncMode::Pull, SyncMode::Write, true)
    }

    fn auth_style(&self) -> AuthStyle {
        AuthStyle::ApiKeyBasic { password: "" }
    }

    fn api_base(&self) -> &str {
        &self.api_base
    }

    fn stage_mapping(&self) -> &StageMapping {
        &STAGES
    }

    fn webhook_signature_header(&self) -> Option<&'static str> {
        Some("Signature")
    }

    async fn find_candidate_by_email(
        &self,
        api: &AuthenticatedClient,
        email: &str,
    ) -> Result<Option<RemoteRecord>, ProviderError> {
        let candidates: Value = api
            .get_json("/candidates", &[("email", email), ("per_page", "1")])
            .await?;
        match candidates.pointer("/0") {
            Some(found) => RemoteRecord::from_json(GREENHOUSE_SLUG, found.clone(), "/id").map(Some),
            None => Ok(None),
        }
    }

    async fn create_candidate(
        &self,
        api: &AuthenticatedClient,
        candidate: &CandidateRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        let response = self
            .write_json(api, Method::POST, "/candidates", &Self::candidate_body(candidate))
            .await?;
        RemoteRecord::from_json(GREENHOUSE_SLUG, response, "/id")
    }

    async fn update_candidate(
        &self,
        api: &AuthenticatedClient,
        external_id: &str,
        candidate: &CandidateRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        let response = self
            .write_json(
                api,
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
        let body = json!({
            "custom_fields": [{ "name_key": STAGE_FIELD, "value": stage }]
        });
        self.write_json(api, Method::PATCH, &format!("/candidates/{external_id}"), &body)
            .await?;
        Ok(())
    }

    async fn create_interview(
        &self,
        api: &AuthenticatedClient,
        candidate_external_id: &str,
        _candidate: &CandidateRecord,
        interview: &InterviewRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        let interviewers: Vec<Value> = interview
            .interviewer_emails
            .iter()
            .map(|email| json!({ "email": email }))
            .collect();
        let body = json!({
            "candidate_id": candidate_external_id,
            "external_event_id": interview.id,
            "interview_name": interview.title,
            "start": { "date_time": interview.scheduled_at.to_rfc3339() },
            "end": { "date_time": interview.ends_at().to_rfc3339() },
            "location": interview.location,
            "interviewers": interviewers,
        });
        let response = self
            .write_json(api, Method::POST, "/scheduled_interviews", &body)
            .await?;
        RemoteRecord::from_json(GREENHOUSE_SLUG, response, "/id")
    }

    async fn complete_interview(
        &self,
        api: &AuthenticatedClient,
        interview_external_id: &str,
        _candidate_external_id: &str,
        _candidate: &CandidateRecord,
        interview: &InterviewRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        let mut body = json!({ "status": "complete" });
        if let Some(feedback) = &interview.feedback {
            body["notes"] = json!(feedback);
        }
        let response = self
            .write_json(
                api,
                Method::PATCH,
                &format!("/scheduled_interviews/{interview_external_id}"),
                &body,
            )
            .await?;
        Ok(RemoteRecord::new(interview_external_id, response))
    }

    async fn list_jobs(&self, api: &AuthenticatedClient) -> Result<Vec<RemoteRecord>, ProviderError> {
        let jobs: Vec<Value> = api
            .get_json("/jobs", &[("status", "open"), ("per_page", "100")])
            .await?;
        jobs.into_iter()
            .map(|job| RemoteRecord::from_json(GREENHOUSE_SLUG, job, "/id"))
            .collect()
    }
}
