//! Domain events that trigger outbound sync.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const CANDIDATE_ENTITY: &str = "candidate";
pub const INTERVIEW_ENTITY: &str = "interview";
/// Mapping entity type for the one-time hire handoff
pub const EMPLOYEE_ENTITY: &str = "employee";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CandidateEvent {
    Created,
    Updated,
    StageChanged,
}

impl CandidateEvent {
    /// Value stored in `sync_logs.event_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateEvent::Created => "candidate_created",
            CandidateEvent::Updated => "candidate_updated",
            CandidateEvent::StageChanged => "candidate_stage_changed",
        }
    }
}

impl fmt::Display for CandidateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InterviewEvent {
    Scheduled,
    Completed,
}

impl InterviewEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewEvent::Scheduled => "interview_scheduled",
            InterviewEvent::Completed => "interview_completed",
        }
    }
}

impl fmt::Display for InterviewEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional payload accompanying a candidate event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEventData {
    /// Internal stage the candidate moved to; falls back to the candidate's
    /// current stage when absent
    #[serde(default, alias = "new_stage", skip_serializing_if = "Option::is_none")]
    pub new_stage: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_deserialize_from_snake_case() {
        let event: CandidateEvent = serde_json::from_str("\"stage_changed\"").unwrap();
        assert_eq!(event, CandidateEvent::StageChanged);
        assert_eq!(event.as_str(), "candidate_stage_changed");

        let event: InterviewEvent = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(event.to_string(), "interview_completed");
    }

    #[test]
    fn event_data_accepts_both_spellings() {
        let camel: CandidateEventData = serde_json::from_str(r#"{"newStage":"hired"}"#).unwrap();
        let snake: CandidateEventData = serde_json::from_str(r#"{"new_stage":"hired"}"#).unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.new_stage.as_deref(), Some("hired"));
    }
}
