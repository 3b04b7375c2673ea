//! Records exchanged between the sync engine and provider adapters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::ProviderError;

/// Internal candidate as supplied by the rest of the system
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CandidateRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Internal pipeline stage, e.g. `screening`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<chrono::NaiveDate>,
}

impl CandidateRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Internal interview as supplied by the rest of the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InterviewRecord {
    pub id: String,
    pub candidate_id: String,
    pub title: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interviewer_emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Interviewer feedback, present once the interview is completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl InterviewRecord {
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_at + chrono::Duration::minutes(i64::from(self.duration_minutes))
    }
}

/// Candidate photo for the hire handoff
#[derive(Clone, PartialEq, Eq)]
pub struct CandidatePhoto {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for CandidatePhoto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidatePhoto")
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Identifier and raw body of a record on the provider side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: String,
    pub raw: serde_json::Value,
}

impl RemoteRecord {
    pub fn new(id: impl Into<String>, raw: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            raw,
        }
    }

    /// Extract the id at JSON pointer `pointer`, accepting strings and numbers.
    pub fn from_json(
        provider: &str,
        raw: serde_json::Value,
        pointer: &str,
    ) -> Result<Self, ProviderError> {
        let id = match raw.pointer(pointer) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                return Err(ProviderError::malformed(
                    provider,
                    format!("response has no id at {pointer}"),
                ));
            }
        };
        Ok(Self { id, raw })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_id_accepts_numbers_and_strings() {
        let record = RemoteRecord::from_json("greenhouse", json!({"id": 4521}), "/id").unwrap();
        assert_eq!(record.id, "4521");

        let record =
            RemoteRecord::from_json("lever", json!({"data": {"id": "opp-1"}}), "/data/id").unwrap();
        assert_eq!(record.id, "opp-1");
    }

    #[test]
    fn missing_remote_id_is_malformed() {
        let err = RemoteRecord::from_json("hubspot", json!({"results": []}), "/id").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }

    #[test]
    fn interview_end_time_adds_duration() {
        let start = "2026-03-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let interview = InterviewRecord {
            id: "int-1".into(),
            candidate_id: "cand-1".into(),
            title: "Onsite".into(),
            scheduled_at: start,
            duration_minutes: 45,
            location: None,
            interviewer_emails: vec![],
            notes: None,
            feedback: None,
        };
        assert_eq!(interview.ends_at().to_rfc3339(), "2026-03-01T10:45:00+00:00");
    }
}
