//! BambooHR adapter
//!
//! Candidates are pushed as applicant-tracking applications. The hire handoff
//! creates the employee record, whose id BambooHR only returns in the
//! `Location` header.

use async_trait::async_trait;
use reqwest::{Method, header};
use serde_json::{Value, json};

use super::capabilities::{ProviderCapabilities, SyncMode};
use super::client::AuthenticatedClient;
use super::error::ProviderError;
use super::stage_mapping::StageMapping;
use super::trait_::{AtsProvider, AuthStyle};
use super::types::{CandidatePhoto, CandidateRecord, RemoteRecord};
use crate::config::ProviderSettings;

pub const BAMBOOHR_SLUG: &str = "bamboohr";

const DEFAULT_HOST: &str = "https://api.bamboohr.com/api/gateway.php";

const STAGES: StageMapping = StageMapping::new(
    &[
        ("applied", "New"),
        ("screening", "Reviewed"),
        ("phone_screen", "Schedule Phone Screen"),
        ("interview", "Interviewed"),
        ("offer", "Offer Sent"),
        ("hired", "Hired"),
        ("rejected", "Not a Fit"),
    ],
    "New",
);

pub struct BambooHrProvider {
    api_base: String,
}

impl BambooHrProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        let api_base = match (&settings.api_base, &settings.account) {
            (Some(base), _) => base.clone(),
            (None, Some(company)) => format!("{DEFAULT_HOST}/{company}/v1"),
            (None, None) => String::new(),
        };
        Self { api_base }
    }
}

#[async_trait]
impl AtsProvider for BambooHrProvider {
    fn slug(&self) -> &'static str {
        BAMBOOHR_SLUG
    }

    fn display_name(&self) -> &'static str {
        "BambooHR"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::new(SyncMode::Push, SyncMode::None, SyncMode::None, false)
    }

    fn auth_style(&self) -> AuthStyle {
        AuthStyle::ApiKeyBasic { password: "x" }
    }

    fn api_base(&self) -> &str {
        &self.api_base
    }

    fn stage_mapping(&self) -> &StageMapping {
        &STAGES
    }

    async fn create_candidate(
        &self,
        api: &AuthenticatedClient,
        candidate: &CandidateRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        let body = json!({
            "firstName": candidate.first_name,
            "lastName": candidate.last_name,
            "email": candidate.email,
            "phoneNumber": candidate.phone,
            "source": candidate.source,
        });
        let response: Value = api
            .send_json(Method::POST, "/applicant_tracking/application", &body)
            .await?;
        RemoteRecord::from_json(BAMBOOHR_SLUG, response, "/applicationId")
    }

    async fn update_candidate(
        &self,
        api: &AuthenticatedClient,
        external_id: &str,
        candidate: &CandidateRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        // Applications are immutable; changes are recorded as a comment.
        let mut changes = vec![format!("Name: {}", candidate.full_name())];
        if let Some(email) = &candidate.email {
            changes.push(format!("Email: {email}"));
        }
        if let Some(phone) = &candidate.phone {
            changes.push(format!("Phone: {phone}"));
        }
        let body = json!({
            "type": "comment",
            "comment": format!("Candidate details updated. {}", changes.join("; ")),
        });
        let response: Value = api
            .send_json(
                Method::POST,
                &format!("/applicant_tracking/applications/{external_id}/comments"),
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
            Method::POST,
            &format!("/applicant_tracking/applications/{external_id}/status"),
            &json!({ "status": stage }),
        )
        .await
    }

    fn supports_handoff(&self) -> bool {
        true
    }

    async fn create_employee(
        &self,
        api: &AuthenticatedClient,
        candidate: &CandidateRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        let body = json!({
            "firstName": candidate.first_name,
            "lastName": candidate.last_name,
            "workEmail": candidate.email,
            "mobilePhone": candidate.phone,
            "jobTitle": candidate.job_title,
            "hireDate": candidate.start_date.map(|d| d.to_string()),
        });
        let response = api
            .send(api.request(Method::POST, "/employees").json(&body))
            .await?;

        let id = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(employee_id_from_location)
            .ok_or_else(|| {
                ProviderError::malformed(BAMBOOHR_SLUG, "employee response has no Location header")
            })?;
        Ok(RemoteRecord::new(id, body))
    }

    async fn upload_employee_photo(
        &self,
        api: &AuthenticatedClient,
        employee_id: &str,
        photo: &CandidatePhoto,
    ) -> Result<(), ProviderError> {
        api.send_bytes(
            Method::POST,
            &format!("/employees/{employee_id}/photo"),
            &photo.content_type,
            photo.bytes.clone(),
        )
        .await
    }
}

fn employee_id_from_location(location: &str) -> Option<String> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}
