//! WhatsApp Business Cloud API adapter
//!
//! Only interviews are pushed: the candidate receives a templated message
//! when an interview is scheduled and when it is completed. The provider
//! account setting holds the sending phone number id.

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

pub const WHATSAPP_SLUG: &str = "whatsapp";

const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v19.0";
const SCHEDULED_TEMPLATE: &str = "interview_scheduled";
const COMPLETED_TEMPLATE: &str = "interview_completed";
const TEMPLATE_LANGUAGE: &str = "en_US";

const STAGES: StageMapping = StageMapping::new(&[("applied", "new")], "new");

pub struct WhatsAppProvider {
    api_base: String,
    phone_number_id: Option<String>,
}

impl WhatsAppProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            api_base: settings
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            phone_number_id: settings.account.clone(),
        }
    }

    async fn send_template(
        &self,
        api: &AuthenticatedClient,
        candidate: &CandidateRecord,
        template: &str,
        parameters: &[String],
    ) -> Result<RemoteRecord, ProviderError> {
        let Some(sender) = &self.phone_number_id else {
            return Err(ProviderError::invalid_request(
                WHATSAPP_SLUG,
                "sending phone number id is not configured",
            ));
        };
        let to = candidate
            .phone
            .as_deref()
            .map(normalize_phone)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                ProviderError::invalid_request(WHATSAPP_SLUG, "candidate has no phone number")
            })?;

        let parameters: Vec<Value> = parameters
            .iter()
            .map(|text| json!({ "type": "text", "text": text }))
            .collect();
        let body = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "template",
            "template": {
                "name": template,
                "language": { "code": TEMPLATE_LANGUAGE },
                "components": [{ "type": "body", "parameters": parameters }]
            }
        });
        let response: Value = api
            .send_json(Method::POST, &format!("/{sender}/messages"), &body)
            .await?;
        RemoteRecord::from_json(WHATSAPP_SLUG, response, "/messages/0/id")
    }
}

/// Digits only, as the Cloud API expects.
fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

#[async_trait]
impl AtsProvider for WhatsAppProvider {
    fn slug(&self) -> &'static str {
        WHATSAPP_SLUG
    }

    fn display_name(&self) -> &'static str {
        "WhatsApp"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::new(SyncMode::None, SyncMode::None, SyncMode::Push, true)
    }

    fn auth_style(&self) -> AuthStyle {
        AuthStyle::ApiKeyBearer
    }

    fn api_base(&self) -> &str {
        &self.api_base
    }

    fn stage_mapping(&self) -> &StageMapping {
        &STAGES
    }

    fn webhook_signature_header(&self) -> Option<&'static str> {
        Some("X-Hub-Signature-256")
    }

    async fn create_interview(
        &self,
        api: &AuthenticatedClient,
        _candidate_external_id: &str,
        candidate: &CandidateRecord,
        interview: &InterviewRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        let when = interview.scheduled_at.format("%Y-%m-%d %H:%M UTC").to_string();
        let location = interview.location.clone().unwrap_or_else(|| "online".to_string());
        self.send_template(
            api,
            candidate,
            SCHEDULED_TEMPLATE,
            &[candidate.first_name.clone(), interview.title.clone(), when, location],
        )
        .await
    }

    async fn complete_interview(
        &self,
        api: &AuthenticatedClient,
        _interview_external_id: &str,
        _candidate_external_id: &str,
        candidate: &CandidateRecord,
        interview: &InterviewRecord,
    ) -> Result<RemoteRecord, ProviderError> {
        self.send_template(
            api,
            candidate,
            COMPLETED_TEMPLATE,
            &[candidate.first_name.clone(), interview.title.clone()],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::client::AuthMaterial;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn interview() -> InterviewRecord {
        InterviewRecord {
            id: "int-1".into(),
            candidate_id: "cand-1".into(),
            title: "Technical interview".into(),
            scheduled_at: Utc.with_ymd_and_hms(2026, 5, 4, 14, 30, 0).unwrap(),
            duration_minutes: 60,
            location: None,
            interviewer_emails: vec![],
            notes: None,
            feedback: None,
        }
    }

    fn candidate(phone: Option<&str>) -> CandidateRecord {
        CandidateRecord {
            id: "cand-1".into(),
            first_name: "Katherine".into(),
            last_name: "Johnson".into(),
            phone: phone.map(str::to_string),
            ..Default::default()
        }
    }

    fn api(server: &MockServer) -> AuthenticatedClient {
        AuthenticatedClient::new(
            WHATSAPP_SLUG,
            reqwest::Client::new(),
            server.uri(),
            AuthMaterial::ApiKey("wa-token".into()),
            AuthStyle::ApiKeyBearer,
        )
    }

    #[tokio::test]
    async fn scheduled_interview_sends_template_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/10555/messages"))
            .and(header("authorization", "Bearer wa-token"))
            .and(body_partial_json(json!({
                "to": "15551234567",
                "template": {"name": "interview_scheduled"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messaging_product": "whatsapp",
                "messages": [{"id": "wamid.ABC"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = WhatsAppProvider::new(&ProviderSettings {
            account: Some("10555".into()),
            ..Default::default()
        });
        let sent = provider
            .create_interview(&api(&server), "", &candidate(Some("+1 (555) 123-4567")), &interview())
            .await
            .unwrap();
        assert_eq!(sent.id, "wamid.ABC");
    }

    #[tokio::test]
    async fn candidate_without_phone_is_rejected_before_sending() {
        let server = MockServer::start().await;
        let provider = WhatsAppProvider::new(&ProviderSettings {
            account: Some("10555".into()),
            ..Default::default()
        });
        let err = provider
            .create_interview(&api(&server), "", &candidate(None), &interview())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest { .. }));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[test]
    fn candidate_sync_is_disabled() {
        let provider = WhatsAppProvider::new(&ProviderSettings::default());
        assert!(!provider.capabilities().candidate_sync.is_enabled());
        assert_eq!(provider.stage_mapping().default_stage(), "new");
    }
}
