//! HubSpot CRM adapter
//!
//! Candidates are pushed as contacts, interviews as meetings associated with
//! the contact. Existing contacts are found through the CRM search API.

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

pub const HUBSPOT_SLUG: &str = "hubspot";

const DEFAULT_API_BASE: &str = "https://api.hubapi.com";
const DEFAULT_TOKEN_URL: &str = "https://api.hubapi.com/oauth/v1/token";

/// HubSpot-defined association type: meeting to contact
const MEETING_TO_CONTACT: u32 = 200;

const STAGES: StageMapping = StageMapping::new(
    &[
        ("applied", "appointmentscheduled"),
        ("screening", "qualifiedtobuy"),
        ("interview", "presentationscheduled"),
        ("offer", "decisionmakerboughtin"),
        ("hired", "closedwon"),
        ("rejected", "closedlost"),
    ],
    "appointmentscheduled",
);

pub struct HubSpotProvider {
    api_base: String,
    token_url: String,
}

impl HubSpotProvider {
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
        }
    }

    fn contact_properties(candidate: &CandidateRecord, stage: Option<&str>) -> Value {
        let mut properties = json!({
            "firstname": candidate.first_name,
            "lastname": candidate.last_name,
        });
        if let Some(email) = &candidate.email {
            properties["email"] = json!(email);
        }
        if let Some(phone) = &candidate.phone {
            properties["phone"] = json!(phone);
        }
        if let Some(title) = &candidate.job_title {
            properties["jobtitle"] = json!(title);
        }
        if let Some(stage) = stage {
            properties["recruiting_stage"] = json!(stage);
        }
        properties
    }

    fn meeting_properties(interview: &InterviewRecord, outcome: &str) -> Value {
        let mut properties = json!({
            "hs_timestamp": interview.scheduled_at.to_rfc3339(),
            "hs_meeting_title": interview.title,
            "hs_meeting_start_time": interview.scheduled_at.to_rfc3339(),
            "hs_meeting_end_time": interview.ends_at().to_rfc3339(),
            "hs_meeting_outcome": outcome,
        });
        if let Some(location) = &interview.location {
            properties["hs_meeting_location"] = json!(location);
        }
        if let Some(notes) = &interview.notes {
            properties["hs_meeting_body"] = json!(notes);
        }
        if let Some(feedback) = &interview.feedback {
            properties["hs_internal_meeting_notes"] = json!(feedback);
        }
        properties
    }
}

#[async_trait]
impl AtsProvider for HubSpotProvider {
    fn slug(&self) -> &'static str {
        HUBSPOT_SLUG
    }

    fn display_name(&self) -> &'static str {
        "HubSpot"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::new(SyncMode::Push, SyncMode::None, SyncMode::Push, true)
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
        Some("X-HubSpot-Signature-256")
    }

    async fn find_candidate_by_email(
        &self,
        api: &AuthenticatedClient,
        email: &str,
    ) -> Result<Option<RemoteRecord>, ProviderError> {
        let body = json!({
            "filterGroups": [{
                "filters": [{"propertyName": "email", "operator": "EQ", "value": email}]
            }],
            "properties": ["email", "firstname", "lastname"],
            "limit": 1
        });
        let response: Value = api
            .send_json(Method::POST, "/crm/v3/objects/contacts/search", &body)
            .await?;

        match response.pointer("/results/0") {
            Some(contact) => RemoteRecord::from_json(HUBSPOT_SLUG, contact.clone(), "/id").map(Some),
            None => Ok(None),
        }
    }

    async fn create_candidate(
        &self,
        api: &AuthenticatedClient,
        candidate: &CandidateRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        let stage = candidate.stage.as_deref().map(|s| STAGES.translate(s));
        let body = json!({ "properties": Self::contact_properties(candidate, stage) });
        let response: Value = api
            .send_json(Method::POST, "/crm/v3/objects/contacts", &body)
            .await?;
        RemoteRecord::from_json(HUBSPOT_SLUG, response, "/id")
    }

    async fn update_candidate(
        &self,
        api: &AuthenticatedClient,
        external_id: &str,
        candidate: &CandidateRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        let body = json!({ "properties": Self::contact_properties(candidate, None) });
        let response: Value = api
            .send_json(
                Method::PATCH,
                &format!("/crm/v3/objects/contacts/{external_id}"),
                &body,
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
            &format!("/crm/v3/objects/contacts/{external_id}"),
            &json!({ "properties": { "recruiting_stage": stage } }),
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
        let body = json!({
            "properties": Self::meeting_properties(interview, "SCHEDULED"),
            "associations": [{
                "to": {"id": candidate_external_id},
                "types": [{
                    "associationCategory": "HUBSPOT_DEFINED",
                    "associationTypeId": MEETING_TO_CONTACT
                }]
            }]
        });
        let response: Value = api
            .send_json(Method::POST, "/crm/v3/objects/meetings", &body)
            .await?;
        RemoteRecord::from_json(HUBSPOT_SLUG, response, "/id")
    }

    async fn complete_interview(
        &self,
        api: &AuthenticatedClient,
        interview_external_id: &str,
        _candidate_external_id: &str,
        _candidate: &CandidateRecord,
        interview: &InterviewRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        let body = json!({ "properties": Self::meeting_properties(interview, "COMPLETED") });
        let response: Value = api
            .send_json(
                Method::PATCH,
                &format!("/crm/v3/objects/meetings/{interview_external_id}"),
                &body,
            )
            .await?;
        Ok(RemoteRecord::new(interview_external_id, response))
    }
}
