//! # Sync Log Repository
//!
//! Append-only audit trail of sync attempts. Status changes are compare-and-set
//! against the current status so that concurrent writers cannot move a row
//! backwards, and a row with `completed_at` set is never touched again.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::sync_log::{ActiveModel, Column, Entity, Model, SyncDirection, SyncStatus};

#[derive(Debug, Error)]
pub enum SyncLogError {
    #[error("sync log {0} not found")]
    NotFound(Uuid),
    #[error("sync log {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: String,
        to: SyncStatus,
    },
    #[error("sync log {0} is already completed")]
    AlreadyCompleted(Uuid),
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// Fields supplied when an attempt starts
#[derive(Debug, Clone)]
pub struct NewSyncLog {
    pub tenant_id: Uuid,
    pub provider: String,
    pub event_type: String,
    pub direction: SyncDirection,
    pub entity_type: String,
    pub entity_id: String,
    pub request_payload: Option<JsonValue>,
}

/// Rolling 24h counts for one integration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub retrying: u64,
    /// Percentage of successful attempts, rounded; 0 when there were none
    pub success_rate: u32,
}

impl SyncSummary {
    fn from_counts(counts: &HashMap<String, u64>) -> Self {
        let get = |status: SyncStatus| counts.get(status.as_str()).copied().unwrap_or(0);
        let total = counts.values().sum();
        let success = get(SyncStatus::Success);
        Self {
            total,
            success,
            failed: get(SyncStatus::Failed),
            pending: get(SyncStatus::Pending),
            in_progress: get(SyncStatus::InProgress),
            retrying: get(SyncStatus::Retrying),
            success_rate: success_rate(success, total),
        }
    }
}

pub fn success_rate(success: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    ((success as f64 / total as f64) * 100.0).round() as u32
}

/// One distinct failure message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummaryEntry {
    pub error_message: String,
    pub count: u64,
    pub last_occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SyncLogRepository {
    db: Arc<DatabaseConnection>,
}

impl SyncLogRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Record a new attempt in `pending`.
    pub async fn create_log(&self, new: NewSyncLog) -> Result<Model, SyncLogError> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let id = Uuid::new_v4();
        let row = ActiveModel {
            id: Set(id),
            tenant_id: Set(new.tenant_id),
            provider: Set(new.provider),
            event_type: Set(new.event_type),
            direction: Set(new.direction.as_str().to_string()),
            entity_type: Set(new.entity_type),
            entity_id: Set(new.entity_id),
            external_id: Set(None),
            status: Set(SyncStatus::Pending.as_str().to_string()),
            error_message: Set(None),
            retry_count: Set(0),
            skipped: Set(false),
            request_payload: Set(new.request_payload),
            response_payload: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            completed_at: Set(None),
        };

        Entity::insert(row).exec_without_returning(&*self.db).await?;
        self.get(id).await?.ok_or(SyncLogError::NotFound(id))
    }

    pub async fn mark_in_progress(&self, id: Uuid) -> Result<Model, SyncLogError> {
        self.transition(id, SyncStatus::InProgress, ActiveModel::default())
            .await
    }

    /// Note a failed attempt that the client is about to retry.
    pub async fn mark_retrying(
        &self,
        id: Uuid,
        error: &str,
        retry_count: i32,
    ) -> Result<Model, SyncLogError> {
        self.transition(
            id,
            SyncStatus::Retrying,
            ActiveModel {
                error_message: Set(Some(error.to_string())),
                retry_count: Set(retry_count),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn mark_success(
        &self,
        id: Uuid,
        response: Option<JsonValue>,
        external_id: Option<&str>,
        skipped: bool,
    ) -> Result<Model, SyncLogError> {
        self.transition(
            id,
            SyncStatus::Success,
            ActiveModel {
                response_payload: Set(response),
                external_id: Set(external_id.map(str::to_string)),
                skipped: Set(skipped),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        retry_count: i32,
    ) -> Result<Model, SyncLogError> {
        self.transition(
            id,
            SyncStatus::Failed,
            ActiveModel {
                error_message: Set(Some(error.to_string())),
                retry_count: Set(retry_count),
                ..Default::default()
            },
        )
        .await
    }

    async fn transition(
        &self,
        id: Uuid,
        next: SyncStatus,
        mut changes: ActiveModel,
    ) -> Result<Model, SyncLogError> {
        let current = self.get(id).await?.ok_or(SyncLogError::NotFound(id))?;
        if current.completed_at.is_some() {
            return Err(SyncLogError::AlreadyCompleted(id));
        }
        let allowed = current
            .sync_status()
            .is_some_and(|status| status.can_transition_to(next));
        if !allowed {
            return Err(SyncLogError::InvalidTransition {
                id,
                from: current.status,
                to: next,
            });
        }

        let now: DateTimeWithTimeZone = Utc::now().into();
        changes.status = Set(next.as_str().to_string());
        changes.updated_at = Set(now);
        if next.is_terminal() {
            changes.completed_at = Set(Some(now));
        }

        let result = Entity::update_many()
            .set(changes)
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(current.status.as_str()))
            .filter(Column::CompletedAt.is_null())
            .exec(&*self.db)
            .await?;

        // Someone else moved the row between our read and write.
        if result.rows_affected == 0 {
            let latest = self.get(id).await?.ok_or(SyncLogError::NotFound(id))?;
            if latest.completed_at.is_some() {
                return Err(SyncLogError::AlreadyCompleted(id));
            }
            return Err(SyncLogError::InvalidTransition {
                id,
                from: latest.status,
                to: next,
            });
        }

        self.get(id).await?.ok_or(SyncLogError::NotFound(id))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(id).one(&*self.db).await
    }

    /// Newest first.
    pub async fn list_recent(
        &self,
        tenant_id: Uuid,
        provider: &str,
        status: Option<SyncStatus>,
        limit: u64,
    ) -> Result<Vec<Model>, DbErr> {
        let mut query = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Provider.eq(provider));
        if let Some(status) = status {
            query = query.filter(Column::Status.eq(status.as_str()));
        }
        query
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .all(&*self.db)
            .await
    }

    /// Counts of outbound attempts by status over the 24 hours before `now`.
    /// Inbound webhook receipts are not sync attempts and are left out.
    pub async fn summary_24h(
        &self,
        tenant_id: Uuid,
        provider: &str,
        now: DateTime<Utc>,
    ) -> Result<SyncSummary, DbErr> {
        let since: DateTimeWithTimeZone = (now - Duration::hours(24)).into();
        let rows: Vec<(String, i64)> = Entity::find()
            .select_only()
            .column(Column::Status)
            .column_as(Expr::col(Column::Id).count(), "count")
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Provider.eq(provider))
            .filter(Column::Direction.eq(SyncDirection::Outbound.as_str()))
            .filter(Column::CreatedAt.gte(since))
            .group_by(Column::Status)
            .into_tuple()
            .all(&*self.db)
            .await?;

        let counts: HashMap<String, u64> = rows
            .into_iter()
            .map(|(status, count)| (status, count.max(0) as u64))
            .collect();
        Ok(SyncSummary::from_counts(&counts))
    }

    /// Failed attempts since `since` grouped by message, most frequent first.
    pub async fn error_summary(
        &self,
        tenant_id: Uuid,
        provider: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ErrorSummaryEntry>, DbErr> {
        let since: DateTimeWithTimeZone = since.into();
        let failed = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Provider.eq(provider))
            .filter(Column::Status.eq(SyncStatus::Failed.as_str()))
            .filter(Column::CreatedAt.gte(since))
            .all(&*self.db)
            .await?;

        let mut grouped: HashMap<String, ErrorSummaryEntry> = HashMap::new();
        for log in failed {
            let message = log
                .error_message
                .unwrap_or_else(|| "unknown error".to_string());
            let occurred = log.created_at.with_timezone(&Utc);
            grouped
                .entry(message.clone())
                .and_modify(|entry| {
                    entry.count += 1;
                    if occurred > entry.last_occurred_at {
                        entry.last_occurred_at = occurred;
                    }
                })
                .or_insert(ErrorSummaryEntry {
                    error_message: message,
                    count: 1,
                    last_occurred_at: occurred,
                });
        }

        let mut entries: Vec<_> = grouped.into_values().collect();
        entries.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(b.last_occurred_at.cmp(&a.last_occurred_at))
        });
        entries.truncate(limit);
        Ok(entries)
    }

    /// Most recent outbound failure message, if any.
    pub async fn last_error(&self, tenant_id: Uuid, provider: &str) -> Result<Option<String>, DbErr> {
        let latest = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Provider.eq(provider))
            .filter(Column::Direction.eq(SyncDirection::Outbound.as_str()))
            .filter(Column::Status.eq(SyncStatus::Failed.as_str()))
            .order_by_desc(Column::CreatedAt)
            .one(&*self.db)
            .await?;
        Ok(latest.and_then(|log| log.error_message))
    }

    /// Delete terminal rows created before `cutoff`. Pending, in-progress and
    /// retrying rows are kept regardless of age.
    pub async fn purge_terminal_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, DbErr> {
        let cutoff: DateTimeWithTimeZone = cutoff.into();
        let result = Entity::delete_many()
            .filter(Column::Status.is_in([
                SyncStatus::Success.as_str(),
                SyncStatus::Failed.as_str(),
            ]))
            .filter(Column::CreatedAt.lt(cutoff))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_rounds_and_handles_empty() {
        assert_eq!(success_rate(7, 10), 70);
        assert_eq!(success_rate(2, 3), 67);
        assert_eq!(success_rate(1, 3), 33);
        assert_eq!(success_rate(0, 0), 0);
        assert_eq!(success_rate(5, 5), 100);
    }

    #[test]
    fn summary_totals_every_status() {
        let counts = HashMap::from([
            ("success".to_string(), 7u64),
            ("failed".to_string(), 3),
            ("in_progress".to_string(), 2),
        ]);
        let summary = SyncSummary::from_counts(&counts);
        assert_eq!(summary.total, 12);
        assert_eq!(summary.success, 7);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.in_progress, 2);
        assert_eq!(summary.success_rate, 58);
    }
}
