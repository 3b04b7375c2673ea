//! Lever adapter
//!
//! Candidates are Lever opportunities. Interviews are pushed as externally
//! managed interview panels on the opportunity.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};

use super::capabilities::{ProviderCapabilities, SyncMode};
use super::client::AuthenticatedClient;
use super::error::ProviderError;
use super::stage_mapping::StageMapping;
use super::trait_::{AtsProvider, AuthStyle};
use super::types::{CandidateRecord, InterviewRecord, RemoteRecord};
use crate::config::ProviderSettings;

pub const LEVER_SLUG: &str = "lever";

const DEFAULT_API_BASE: &str = "https://api.lever.co/v1";
const DEFAULT_TOKEN_URL: &str = "https://auth.lever.co/oauth/token";

const STAGES: StageMapping = StageMapping::new(
    &[
        ("applied", "applicant-new"),
        ("screening", "recruiter-screen"),
        ("interview", "on-site-interview"),
        ("offer", "offer"),
        ("hired", "hired"),
    ],
    "applicant-new",
);

pub struct LeverProvider {
    api_base: String,
    token_url: String,
    /// Lever user the writes are performed as
    perform_as: Option<String>,
}

impl LeverProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            api_base: settings
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            token_url: settings
                .token_url
                .clone()
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            perform_as: settings.account.clone(),
        }
    }

    fn with_perform_as(&self, path: &str) -> String {
        match &self.perform_as {
            Some(user) => format!("{path}?perform_as={user}"),
            None => path.to_string(),
        }
    }
}

#[async_trait]
impl AtsProvider for LeverProvider {
    fn slug(&self) -> &'static str {
        LEVER_SLUG
    }

    fn display_name(&self) -> &'static str {
        "Lever"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::new(SyncMode::Write, SyncMode::Pull, SyncMode::Push, true)
    }

    fn auth_style(&self) -> AuthStyle {
        AuthStyle::OAuth2
    }

    fn api_base(&self) -> &str {
        &self.api_base
    }

    fn token_url(&self) -> Option<&str> {
        Some(&self.token_url)
    }

    fn stage_mapping(&self) -> &StageMapping {
        &STAGES
    }

    fn webhook_signature_header(&self) -> Option<&'static str> {
        Some("X-Lever-Signature")
    }

    async fn find_candidate_by_email(
        &self,
        api: &AuthenticatedClient,
        email: &str,
    ) -> Result<Option<RemoteRecord>, ProviderError> {
        let response: Value = api
            .get_json("/opportunities", &[("email", email), ("limit", "1")])
            .await?;
        match response.pointer("/data/0") {
            Some(found) => RemoteRecord::from_json(LEVER_SLUG, found.clone(), "/id").map(Some),
            None => Ok(None),
        }
    }

    async fn create_candidate(
        &self,
        api: &AuthenticatedClient,
        candidate: &CandidateRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        let mut body = json!({
            "name": candidate.full_name(),
            "emails": candidate.email.iter().collect::<Vec<_>>(),
            "phones": candidate.phone.iter().map(|p| json!({ "value": p })).collect::<Vec<_>>(),
            "tags": candidate.tags,
            "origin": "sourced",
        });
        if let Some(title) = &candidate.job_title {
            body["headline"] = json!(title);
        }
        if let Some(source) = &candidate.source {
            body["sources"] = json!([source]);
        }
        if let Some(stage) = &candidate.stage {
            body["stage"] = json!(STAGES.translate(stage));
        }
        let response: Value = api
            .send_json(Method::POST, &self.with_perform_as("/opportunities"), &body)
            .await?;
        RemoteRecord::from_json(LEVER_SLUG, response, "/data/id")
    }

    async fn update_candidate(
        &self,
        api: &AuthenticatedClient,
        external_id: &str,
        candidate: &CandidateRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        // Contact fields are read-only once the opportunity exists; tags are not.
        let response: Value = api
            .send_json(
                Method::POST,
                &self.with_perform_as(&format!("/opportunities/{external_id}/addTags")),
                &json!({ "tags": candidate.tags }),
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
            Method::PUT,
            &self.with_perform_as(&format!("/opportunities/{external_id}/stage")),
            &json!({ "stage": stage }),
        )
        .await
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
            "timezone": "UTC",
            "externallyManaged": true,
            "externalUrl": interview.location,
            "note": interview.notes,
            "interviews": [{
                "subject": interview.title,
                "date": interview.scheduled_at.timestamp_millis(),
                "duration": interview.duration_minutes,
                "location": interview.location,
                "interviewers": interviewers,
            }]
        });
        let response: Value = api
            .send_json(
                Method::POST,
                &self.with_perform_as(&format!("/opportunities/{candidate_external_id}/panels")),
                &body,
            )
            .await?;
        RemoteRecord::from_json(LEVER_SLUG, response, "/data/id")
    }

    async fn complete_interview(
        &self,
        api: &AuthenticatedClient,
        interview_external_id: &str,
        candidate_external_id: &str,
        _candidate: &CandidateRecord,
        interview: &InterviewRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        // Panels cannot be closed through the API; completion is recorded as a note.
        let summary = match &interview.feedback {
            Some(feedback) => format!("Interview \"{}\" completed: {feedback}", interview.title),
            None => format!("Interview \"{}\" completed", interview.title),
        };
        let response: Value = api
            .send_json(
                Method::POST,
                &self.with_perform_as(&format!("/opportunities/{candidate_external_id}/notes")),
                &json!({ "value": summary }),
            )
            .await?;
        Ok(RemoteRecord::new(interview_external_id, response))
    }

    async fn list_jobs(&self, api: &AuthenticatedClient) -> Result<Vec<RemoteRecord>, ProviderError> {
        let response: Value = api
            .get_json("/postings", &[("state", "published"), ("limit", "100")])
            .await?;
        let postings = match response.get("data") {
            Some(Value::Array(items)) => items.clone(),
            _ => return Err(ProviderError::malformed(LEVER_SLUG, "postings response has no data array")),
        };
        postings
            .into_iter()
            .map(|posting| RemoteRecord::from_json(LEVER_SLUG, posting, "/id"))
            .collect()
    }
}
