//! Outbound sync engine
//!
//! - [`SyncHandler`] handles candidate and interview events per provider
//! - [`CandidateSource`] supplies internal records
//! - [`integration_status`] summarizes one integration for operators

pub mod events;
pub mod handler;
pub mod source;
pub mod status;

pub use events::{CandidateEvent, CandidateEventData, InterviewEvent};
pub use handler::{DispatchResult, SyncError, SyncHandler, SyncOutcome};
pub use source::{CandidateSource, SnapshotSource, SourceError};
pub use status::{IntegrationStatus, Stats24h, integration_status};
