//! Access to internal records owned by the rest of the system.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use lru::LruCache;
use thiserror::Error;
use uuid::Uuid;

use crate::providers::{CandidatePhoto, CandidateRecord, InterviewRecord};

#[derive(Debug, Error)]
#[error("record source unavailable: {0}")]
pub struct SourceError(pub String);

/// Read side of the system of record. Sync handlers only ever read through it.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn candidate(
        &self,
        tenant_id: Uuid,
        candidate_id: &str,
    ) -> Result<Option<CandidateRecord>, SourceError>;

    async fn interview(
        &self,
        tenant_id: Uuid,
        interview_id: &str,
    ) -> Result<Option<InterviewRecord>, SourceError>;

    async fn candidate_photo(
        &self,
        _tenant_id: Uuid,
        _candidate_id: &str,
    ) -> Result<Option<CandidatePhoto>, SourceError> {
        Ok(None)
    }
}

type TenantKey = (Uuid, String);

const DEFAULT_RECORD_CAPACITY: usize = 10_000;
/// Photos are up to 5 MiB each.
const DEFAULT_PHOTO_CAPACITY: usize = 32;

/// In-memory source fed with snapshots pushed alongside sync requests.
/// Each map is a bounded LRU; the least recently used snapshot is dropped
/// first once a map is full.
pub struct SnapshotSource {
    candidates: Mutex<LruCache<TenantKey, CandidateRecord>>,
    interviews: Mutex<LruCache<TenantKey, InterviewRecord>>,
    photos: Mutex<LruCache<TenantKey, CandidatePhoto>>,
}

impl Default for SnapshotSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotSource {
    pub fn new() -> Self {
        Self::with_capacity(
            NonZeroUsize::new(DEFAULT_RECORD_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            NonZeroUsize::new(DEFAULT_PHOTO_CAPACITY).unwrap_or(NonZeroUsize::MIN),
        )
    }

    pub fn with_capacity(records: NonZeroUsize, photos: NonZeroUsize) -> Self {
        Self {
            candidates: Mutex::new(LruCache::new(records)),
            interviews: Mutex::new(LruCache::new(records)),
            photos: Mutex::new(LruCache::new(photos)),
        }
    }

    pub fn put_candidate(&self, tenant_id: Uuid, candidate: CandidateRecord) {
        self.candidates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put((tenant_id, candidate.id.clone()), candidate);
    }

    pub fn put_interview(&self, tenant_id: Uuid, interview: InterviewRecord) {
        self.interviews
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put((tenant_id, interview.id.clone()), interview);
    }

    pub fn put_photo(&self, tenant_id: Uuid, candidate_id: &str, photo: CandidatePhoto) {
        self.photos
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put((tenant_id, candidate_id.to_string()), photo);
    }

    #[cfg(test)]
    fn counts(&self) -> (usize, usize, usize) {
        (
            self.candidates.lock().unwrap_or_else(PoisonError::into_inner).len(),
            self.interviews.lock().unwrap_or_else(PoisonError::into_inner).len(),
            self.photos.lock().unwrap_or_else(PoisonError::into_inner).len(),
        )
    }
}

#[async_trait]
impl CandidateSource for SnapshotSource {
    async fn candidate(
        &self,
        tenant_id: Uuid,
        candidate_id: &str,
    ) -> Result<Option<CandidateRecord>, SourceError> {
        Ok(self
            .candidates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(tenant_id, candidate_id.to_string()))
            .cloned())
    }

    async fn interview(
        &self,
        tenant_id: Uuid,
        interview_id: &str,
    ) -> Result<Option<InterviewRecord>, SourceError> {
        Ok(self
            .interviews
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(tenant_id, interview_id.to_string()))
            .cloned())
    }

    async fn candidate_photo(
        &self,
        tenant_id: Uuid,
        candidate_id: &str,
    ) -> Result<Option<CandidatePhoto>, SourceError> {
        Ok(self
            .photos
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(tenant_id, candidate_id.to_string()))
            .cloned())
    }
}
