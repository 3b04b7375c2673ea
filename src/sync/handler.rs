//! # Sync Handler
//!
//! Turns candidate and interview events into provider calls. Every attempt
//! is recorded in the sync log, and the mapping store decides between
//! create, update and skip so that re-delivered events never duplicate a
//! remote record.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, gauge};
use sea_orm::{DatabaseConnection, DbErr};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::events::{
    CANDIDATE_ENTITY, CandidateEvent, CandidateEventData, EMPLOYEE_ENTITY, INTERVIEW_ENTITY,
    InterviewEvent,
};
use super::source::{CandidateSource, SourceError};
use crate::credentials::{CredentialError, CredentialStore};
use crate::key_lock::KeyedLock;
use crate::models::sync_log::SyncDirection;
use crate::providers::{
    AtsProvider, AuthenticatedClient, CandidateRecord, CredentialProvider, ProviderClient,
    ProviderError, ProviderRegistry, RegistryError, RemoteRecord, RetryObserver, is_hired,
};
use crate::repositories::{MappingKey, MappingRepository, NewSyncLog, SyncLogError, SyncLogRepository};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{entity_type} {id} not found")]
    EntityNotFound { entity_type: &'static str, id: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error(transparent)]
    Log(#[from] SyncLogError),
    #[error(transparent)]
    Storage(#[from] DbErr),
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl SyncError {
    /// Retries the provider client spent before giving up.
    pub fn retry_count(&self) -> i32 {
        match self {
            SyncError::Provider(err) => err.attempts().saturating_sub(1) as i32,
            _ => 0,
        }
    }
}

/// Result of handling one event for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Synced {
        #[serde(rename = "externalId")]
        external_id: String,
    },
    /// Nothing to do; the remote record already reflects the event
    Skipped {
        #[serde(rename = "externalId")]
        external_id: String,
        reason: String,
    },
    /// The tenant has no usable credentials for the provider
    NotConnected,
    /// The provider does not sync this entity
    Unsupported,
}

/// Per-provider result of a fan-out dispatch
#[derive(Debug)]
pub struct DispatchResult {
    pub provider: String,
    pub result: Result<SyncOutcome, SyncError>,
}

struct Done {
    external_id: String,
    skipped: Option<&'static str>,
    response: JsonValue,
}

impl Done {
    fn synced(external_id: String, response: JsonValue) -> Self {
        Self {
            external_id,
            skipped: None,
            response,
        }
    }

    fn skipped(external_id: String, reason: &'static str) -> Self {
        Self {
            external_id,
            skipped: Some(reason),
            response: JsonValue::Null,
        }
    }
}

/// Mirrors client retries into the sync log row of the current attempt.
struct LogObserver {
    logs: SyncLogRepository,
    log_id: Uuid,
}

#[async_trait]
impl RetryObserver for LogObserver {
    async fn retrying(&self, attempt: u32, error: &ProviderError, _delay: Duration) {
        if let Err(err) = self
            .logs
            .mark_retrying(self.log_id, &error.to_string(), attempt as i32)
            .await
        {
            warn!(log_id = %self.log_id, error = %err, "failed to record retry");
        }
    }

    async fn resumed(&self, _attempt: u32) {
        if let Err(err) = self.logs.mark_in_progress(self.log_id).await {
            warn!(log_id = %self.log_id, error = %err, "failed to record resumed attempt");
        }
    }
}

/// Everything one logged attempt needs to talk to the provider
struct Attempt {
    tenant_id: Uuid,
    adapter: Arc<dyn AtsProvider>,
    client: ProviderClient,
    observer: LogObserver,
}

impl Attempt {
    async fn call<T, F, Fut>(&self, op: F) -> Result<T, ProviderError>
    where
        F: FnMut(AuthenticatedClient) -> Fut + Send,
        Fut: Future<Output = Result<T, ProviderError>> + Send,
        T: Send,
    {
        let observer: &dyn RetryObserver = &self.observer;
        self.client
            .execute_observed(self.tenant_id, Some(observer), op)
            .await
    }
}

pub struct SyncHandler {
    registry: Arc<ProviderRegistry>,
    credentials: Arc<CredentialStore>,
    mappings: MappingRepository,
    logs: SyncLogRepository,
    source: Arc<dyn CandidateSource>,
    locks: KeyedLock<MappingKey>,
}

impl SyncHandler {
    pub fn new(
        db: Arc<DatabaseConnection>,
        registry: Arc<ProviderRegistry>,
        credentials: Arc<CredentialStore>,
        source: Arc<dyn CandidateSource>,
    ) -> Self {
        Self {
            registry,
            credentials,
            mappings: MappingRepository::new(db.clone()),
            logs: SyncLogRepository::new(db),
            source,
            locks: KeyedLock::new(),
        }
    }

    /// Keys currently locked or awaited; exposed for diagnostics and tests.
    pub fn active_locks(&self) -> usize {
        self.locks.active_keys()
    }

    /// Handle one candidate event for one provider.
    #[instrument(
        skip(self, data),
        fields(tenant_id = %tenant_id, provider = %provider, candidate_id = %candidate_id, event = %event)
    )]
    pub async fn sync_candidate(
        &self,
        tenant_id: Uuid,
        provider: &str,
        candidate_id: &str,
        event: CandidateEvent,
        data: Option<CandidateEventData>,
    ) -> Result<SyncOutcome, SyncError> {
        let adapter = self.registry.get(provider)?;
        if !adapter.capabilities().candidate_sync.pushes() {
            debug!("provider does not push candidates");
            return Ok(SyncOutcome::Unsupported);
        }
        if !self.credentials.is_connected(tenant_id, provider).await? {
            debug!("provider is not connected; skipping");
            return Ok(SyncOutcome::NotConnected);
        }

        let key = MappingKey::new(tenant_id, provider, CANDIDATE_ENTITY, candidate_id);
        let _guard = self.locks.lock(key.clone()).await;
        let _in_flight = in_flight_guard();

        let data = data.unwrap_or_default();
        let log = self
            .logs
            .create_log(NewSyncLog {
                tenant_id,
                provider: provider.to_string(),
                event_type: event.as_str().to_string(),
                direction: SyncDirection::Outbound,
                entity_type: CANDIDATE_ENTITY.to_string(),
                entity_id: candidate_id.to_string(),
                request_payload: Some(json!({ "event": event, "data": data })),
            })
            .await?;
        self.logs.mark_in_progress(log.id).await?;

        let result = match self.begin(tenant_id, adapter, log.id) {
            Ok(attempt) => self.run_candidate(&attempt, &key, event, &data).await,
            Err(err) => Err(err),
        };
        self.finish(tenant_id, provider, CANDIDATE_ENTITY, log.id, result)
            .await
    }

    /// Handle one interview event for one provider.
    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, provider = %provider, interview_id = %interview_id, event = %event)
    )]
    pub async fn sync_interview(
        &self,
        tenant_id: Uuid,
        provider: &str,
        interview_id: &str,
        event: InterviewEvent,
    ) -> Result<SyncOutcome, SyncError> {
        let adapter = self.registry.get(provider)?;
        if !adapter.capabilities().interview_sync.pushes() {
            debug!("provider does not push interviews");
            return Ok(SyncOutcome::Unsupported);
        }
        if !self.credentials.is_connected(tenant_id, provider).await? {
            debug!("provider is not connected; skipping");
            return Ok(SyncOutcome::NotConnected);
        }

        let key = MappingKey::new(tenant_id, provider, INTERVIEW_ENTITY, interview_id);
        let _guard = self.locks.lock(key.clone()).await;
        let _in_flight = in_flight_guard();

        let log = self
            .logs
            .create_log(NewSyncLog {
                tenant_id,
                provider: provider.to_string(),
                event_type: event.as_str().to_string(),
                direction: SyncDirection::Outbound,
                entity_type: INTERVIEW_ENTITY.to_string(),
                entity_id: interview_id.to_string(),
                request_payload: Some(json!({ "event": event })),
            })
            .await?;
        self.logs.mark_in_progress(log.id).await?;

        let result = match self.begin(tenant_id, adapter, log.id) {
            Ok(attempt) => self.run_interview(&attempt, &key, event).await,
            Err(err) => Err(err),
        };
        self.finish(tenant_id, provider, INTERVIEW_ENTITY, log.id, result)
            .await
    }

    /// Run a candidate event against every connected provider that pushes
    /// candidates. One provider failing does not stop the others.
    pub async fn dispatch_candidate(
        &self,
        tenant_id: Uuid,
        candidate_id: &str,
        event: CandidateEvent,
        data: Option<CandidateEventData>,
    ) -> Result<Vec<DispatchResult>, SyncError> {
        let mut results = Vec::new();
        for provider in self.credentials.connected_providers(tenant_id).await? {
            let Ok(adapter) = self.registry.get(&provider) else {
                continue;
            };
            if !adapter.capabilities().candidate_sync.pushes() {
                continue;
            }
            let result = self
                .sync_candidate(tenant_id, &provider, candidate_id, event, data.clone())
                .await;
            results.push(DispatchResult { provider, result });
        }
        Ok(results)
    }

    pub async fn dispatch_interview(
        &self,
        tenant_id: Uuid,
        interview_id: &str,
        event: InterviewEvent,
    ) -> Result<Vec<DispatchResult>, SyncError> {
        let mut results = Vec::new();
        for provider in self.credentials.connected_providers(tenant_id).await? {
            let Ok(adapter) = self.registry.get(&provider) else {
                continue;
            };
            if !adapter.capabilities().interview_sync.pushes() {
                continue;
            }
            let result = self
                .sync_interview(tenant_id, &provider, interview_id, event)
                .await;
            results.push(DispatchResult { provider, result });
        }
        Ok(results)
    }

    /// Open jobs on the provider side. Nothing is logged or mapped.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, provider = %provider))]
    pub async fn list_jobs(
        &self,
        tenant_id: Uuid,
        provider: &str,
    ) -> Result<Vec<RemoteRecord>, SyncError> {
        let adapter = self.registry.get(provider)?;
        let credentials: Arc<dyn CredentialProvider> = self.credentials.clone();
        let client = self.registry.client_for(adapter.as_ref(), credentials)?;
        let adapter = adapter.as_ref();
        let jobs = client
            .execute(tenant_id, move |api| async move { adapter.list_jobs(&api).await })
            .await?;
        debug!(count = jobs.len(), "listed provider jobs");
        Ok(jobs)
    }

    fn begin(
        &self,
        tenant_id: Uuid,
        adapter: Arc<dyn AtsProvider>,
        log_id: Uuid,
    ) -> Result<Attempt, SyncError> {
        let credentials: Arc<dyn CredentialProvider> = self.credentials.clone();
        let client = self.registry.client_for(adapter.as_ref(), credentials)?;
        Ok(Attempt {
            tenant_id,
            adapter,
            client,
            observer: LogObserver {
                logs: self.logs.clone(),
                log_id,
            },
        })
    }

    async fn finish(
        &self,
        tenant_id: Uuid,
        provider: &str,
        entity_type: &'static str,
        log_id: Uuid,
        result: Result<Done, SyncError>,
    ) -> Result<SyncOutcome, SyncError> {
        match result {
            Ok(done) => {
                self.logs
                    .mark_success(
                        log_id,
                        Some(done.response),
                        Some(&done.external_id),
                        done.skipped.is_some(),
                    )
                    .await?;
                if let Err(err) = self.credentials.mark_synced(tenant_id, provider).await {
                    warn!(error = %err, "failed to record last sync time");
                }
                match done.skipped {
                    Some(reason) => {
                        record_event(provider, entity_type, "skipped");
                        debug!(external_id = %done.external_id, reason, "sync skipped");
                        Ok(SyncOutcome::Skipped {
                            external_id: done.external_id,
                            reason: reason.to_string(),
                        })
                    }
                    None => {
                        record_event(provider, entity_type, "success");
                        info!(external_id = %done.external_id, "sync succeeded");
                        Ok(SyncOutcome::Synced {
                            external_id: done.external_id,
                        })
                    }
                }
            }
            Err(err) => {
                let message = err.to_string();
                if let Err(log_err) = self
                    .logs
                    .mark_failed(log_id, &message, err.retry_count())
                    .await
                {
                    warn!(log_id = %log_id, error = %log_err, "failed to record sync failure");
                }
                record_event(provider, entity_type, "failed");
                warn!(error = %message, "sync failed");
                Err(err)
            }
        }
    }

    async fn load_candidate(
        &self,
        tenant_id: Uuid,
        candidate_id: &str,
    ) -> Result<CandidateRecord, SyncError> {
        self.source
            .candidate(tenant_id, candidate_id)
            .await?
            .ok_or_else(|| SyncError::EntityNotFound {
                entity_type: CANDIDATE_ENTITY,
                id: candidate_id.to_string(),
            })
    }

    async fn run_candidate(
        &self,
        attempt: &Attempt,
        key: &MappingKey,
        event: CandidateEvent,
        data: &CandidateEventData,
    ) -> Result<Done, SyncError> {
        let candidate = self.load_candidate(attempt.tenant_id, &key.entity_id).await?;
        let existing = self.mappings.external_id(key).await?;
        let adapter = attempt.adapter.as_ref();

        match (event, existing) {
            (CandidateEvent::Created, Some(external_id)) => {
                Ok(Done::skipped(external_id, "candidate already synced"))
            }
            (CandidateEvent::Created | CandidateEvent::Updated, None) => {
                let record = self.link_or_create(attempt, key, &candidate).await?;
                Ok(Done::synced(record.id, record.raw))
            }
            (CandidateEvent::Updated, Some(external_id)) => {
                let id = external_id.as_str();
                let candidate = &candidate;
                let record = attempt
                    .call(move |api| async move { adapter.update_candidate(&api, id, candidate).await })
                    .await?;
                Ok(Done::synced(external_id, record.raw))
            }
            (CandidateEvent::StageChanged, existing) => {
                let external_id = match existing {
                    Some(id) => id,
                    None => self.link_or_create(attempt, key, &candidate).await?.id,
                };
                let internal_stage = data
                    .new_stage
                    .clone()
                    .or_else(|| candidate.stage.clone())
                    .unwrap_or_default();
                let stage = adapter.stage_mapping().translate(&internal_stage);
                debug!(internal_stage = %internal_stage, stage, "pushing stage");

                let id = external_id.as_str();
                attempt
                    .call(move |api| async move { adapter.update_stage(&api, id, stage).await })
                    .await?;

                let mut response = json!({ "stage": stage });
                if is_hired(&internal_stage) && adapter.supports_handoff() {
                    let employee_id = self.hand_off(attempt, &candidate).await?;
                    response["employeeId"] = JsonValue::String(employee_id);
                }
                Ok(Done::synced(external_id, response))
            }
        }
    }

    /// Search the provider by email before creating, and record the mapping
    /// to whichever remote record ends up representing the candidate.
    async fn link_or_create(
        &self,
        attempt: &Attempt,
        key: &MappingKey,
        candidate: &CandidateRecord,
    ) -> Result<RemoteRecord, SyncError> {
        let adapter = attempt.adapter.as_ref();
        let found = match candidate.email.as_deref().filter(|e| !e.is_empty()) {
            Some(email) => {
                attempt
                    .call(move |api| async move {
                        adapter.find_candidate_by_email(&api, email).await
                    })
                    .await?
            }
            None => None,
        };

        let record = match found {
            Some(found) => {
                info!(external_id = %found.id, "linking existing remote candidate by email");
                let id = found.id.as_str();
                let updated = attempt
                    .call(move |api| async move { adapter.update_candidate(&api, id, candidate).await })
                    .await?;
                RemoteRecord::new(found.id.clone(), updated.raw)
            }
            None => {
                attempt
                    .call(move |api| async move { adapter.create_candidate(&api, candidate).await })
                    .await?
            }
        };

        self.mappings.upsert(key, &record.id).await?;
        Ok(record)
    }

    /// One-time employee creation for a hired candidate. The photo upload is
    /// best effort and never fails the handoff.
    async fn hand_off(
        &self,
        attempt: &Attempt,
        candidate: &CandidateRecord,
    ) -> Result<String, SyncError> {
        let adapter = attempt.adapter.as_ref();
        let key = MappingKey::new(attempt.tenant_id, adapter.slug(), EMPLOYEE_ENTITY, &candidate.id);
        if let Some(existing) = self.mappings.external_id(&key).await? {
            debug!(employee_id = %existing, "candidate already handed off");
            return Ok(existing);
        }

        let employee = attempt
            .call(move |api| async move { adapter.create_employee(&api, candidate).await })
            .await?;
        self.mappings.upsert(&key, &employee.id).await?;
        info!(employee_id = %employee.id, "candidate handed off as employee");

        self.upload_photo(attempt, candidate, &employee.id).await;
        Ok(employee.id)
    }

    async fn upload_photo(&self, attempt: &Attempt, candidate: &CandidateRecord, employee_id: &str) {
        let photo = match self
            .source
            .candidate_photo(attempt.tenant_id, &candidate.id)
            .await
        {
            Ok(Some(photo)) => photo,
            Ok(None) => {
                debug!("candidate has no photo to upload");
                return;
            }
            Err(err) => {
                warn!(error = %err, "could not load candidate photo; continuing without it");
                return;
            }
        };

        let adapter = attempt.adapter.as_ref();
        let photo = &photo;
        if let Err(err) = attempt
            .call(move |api| async move {
                adapter.upload_employee_photo(&api, employee_id, photo).await
            })
            .await
        {
            warn!(employee_id, error = %err, "employee photo upload failed; handoff kept");
        }
    }

    async fn run_interview(
        &self,
        attempt: &Attempt,
        key: &MappingKey,
        event: InterviewEvent,
    ) -> Result<Done, SyncError> {
        let interview = self
            .source
            .interview(attempt.tenant_id, &key.entity_id)
            .await?
            .ok_or_else(|| SyncError::EntityNotFound {
                entity_type: INTERVIEW_ENTITY,
                id: key.entity_id.clone(),
            })?;
        let candidate = self
            .load_candidate(attempt.tenant_id, &interview.candidate_id)
            .await?;

        let existing = self.mappings.external_id(key).await?;
        if let (InterviewEvent::Scheduled, Some(external_id)) = (event, &existing) {
            return Ok(Done::skipped(external_id.clone(), "interview already synced"));
        }

        let candidate_ref = self.candidate_reference(attempt, &candidate).await?;
        let adapter = attempt.adapter.as_ref();
        let (candidate_ref, candidate, interview) = (candidate_ref.as_str(), &candidate, &interview);

        let (external_id, mut response) = match existing {
            Some(id) => (id, JsonValue::Null),
            None => {
                let record = attempt
                    .call(move |api| async move {
                        adapter
                            .create_interview(&api, candidate_ref, candidate, interview)
                            .await
                    })
                    .await?;
                self.mappings.upsert(key, &record.id).await?;
                (record.id, record.raw)
            }
        };

        if event == InterviewEvent::Completed {
            let id = external_id.as_str();
            let record = attempt
                .call(move |api| async move {
                    adapter
                        .complete_interview(&api, id, candidate_ref, candidate, interview)
                        .await
                })
                .await?;
            response = record.raw;
        }

        Ok(Done::synced(external_id, response))
    }

    /// Remote id the interview should reference. Providers that do not hold
    /// candidates get the internal id; otherwise the candidate is synced
    /// first when it has no mapping yet.
    async fn candidate_reference(
        &self,
        attempt: &Attempt,
        candidate: &CandidateRecord,
    ) -> Result<String, SyncError> {
        let adapter = attempt.adapter.as_ref();
        if !adapter.capabilities().candidate_sync.pushes() {
            return Ok(candidate.id.clone());
        }

        let key = MappingKey::new(attempt.tenant_id, adapter.slug(), CANDIDATE_ENTITY, &candidate.id);
        let _guard = self.locks.lock(key.clone()).await;
        if let Some(external_id) = self.mappings.external_id(&key).await? {
            return Ok(external_id);
        }
        debug!("candidate not mapped yet; syncing it before the interview");
        Ok(self.link_or_create(attempt, &key, candidate).await?.id)
    }
}

fn record_event(provider: &str, entity_type: &'static str, status: &'static str) {
    counter!(
        "ats_sync_events_total",
        "provider" => provider.to_string(),
        "entity" => entity_type,
        "status" => status
    )
    .increment(1);
}

fn in_flight_guard() -> scopeguard::ScopeGuard<(), impl FnOnce(())> {
    gauge!("ats_sync_events_in_flight").increment(1.0);
    scopeguard::guard((), |_| gauge!("ats_sync_events_in_flight").decrement(1.0))
}
