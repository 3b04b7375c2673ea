//! Sync log lifecycle, operator summaries, retention and throttling.

#[path = "test_utils/mod.rs"]
mod test_utils;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use ats_sync::config::RetentionConfig;
use ats_sync::models::sync_log::{SyncDirection, SyncStatus};
use ats_sync::repositories::{NewSyncLog, SyncLogError, SyncLogRepository};
use ats_sync::retention::RetentionSweeper;
use ats_sync::throttle::ThrottleStore;
use chrono::{Duration, Utc};
use sea_orm::DatabaseConnection;
use serde_json::json;
use test_utils::setup_test_db_arc;
use uuid::Uuid;

fn new_log(tenant_id: Uuid, entity_id: &str) -> NewSyncLog {
    NewSyncLog {
        tenant_id,
        provider: "lever".to_string(),
        event_type: "candidate_created".to_string(),
        direction: SyncDirection::Outbound,
        entity_type: "candidate".to_string(),
        entity_id: entity_id.to_string(),
        request_payload: Some(json!({ "event": "created" })),
    }
}

async fn finished(repo: &SyncLogRepository, tenant_id: Uuid, ok: bool, error: &str) -> Uuid {
    let log = repo.create_log(new_log(tenant_id, "c")).await.unwrap();
    repo.mark_in_progress(log.id).await.unwrap();
    if ok {
        repo.mark_success(log.id, None, Some("ext"), false).await.unwrap();
    } else {
        repo.mark_failed(log.id, error, 2).await.unwrap();
    }
    log.id
}

async fn repo() -> (Arc<DatabaseConnection>, SyncLogRepository) {
    let db = setup_test_db_arc().await.unwrap();
    (db.clone(), SyncLogRepository::new(db))
}

#[tokio::test]
async fn lifecycle_moves_forward_only() {
    let (_db, repo) = repo().await;
    let tenant = Uuid::new_v4();

    let log = repo.create_log(new_log(tenant, "c-1")).await.unwrap();
    assert_eq!(log.status, SyncStatus::Pending.as_str());
    assert!(log.completed_at.is_none());

    repo.mark_in_progress(log.id).await.unwrap();
    let retrying = repo.mark_retrying(log.id, "HTTP 503", 1).await.unwrap();
    assert_eq!(retrying.status, SyncStatus::Retrying.as_str());
    assert_eq!(retrying.retry_count, 1);
    assert!(retrying.completed_at.is_none());

    repo.mark_in_progress(log.id).await.unwrap();
    let done = repo
        .mark_success(log.id, Some(json!({ "id": "ext-1" })), Some("ext-1"), false)
        .await
        .unwrap();
    assert_eq!(done.status, SyncStatus::Success.as_str());
    assert_eq!(done.external_id.as_deref(), Some("ext-1"));
    assert!(done.completed_at.is_some());

    let err = repo.mark_failed(log.id, "late failure", 0).await.unwrap_err();
    assert!(matches!(err, SyncLogError::AlreadyCompleted(_)));
}

#[tokio::test]
async fn pending_cannot_jump_to_success() {
    let (_db, repo) = repo().await;
    let log = repo.create_log(new_log(Uuid::new_v4(), "c-1")).await.unwrap();

    let err = repo.mark_success(log.id, None, None, false).await.unwrap_err();
    assert!(matches!(err, SyncLogError::InvalidTransition { .. }));

    let err = repo.mark_in_progress(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, SyncLogError::NotFound(_)));
}

#[tokio::test]
async fn summary_reports_rounded_success_rate() {
    let (_db, repo) = repo().await;
    let tenant = Uuid::new_v4();
    for _ in 0..7 {
        finished(&repo, tenant, true, "").await;
    }
    for _ in 0..3 {
        finished(&repo, tenant, false, "HTTP 500").await;
    }
    // Another tenant's logs are not counted.
    finished(&repo, Uuid::new_v4(), false, "HTTP 500").await;

    let summary = repo.summary_24h(tenant, "lever", Utc::now()).await.unwrap();
    assert_eq!(summary.total, 10);
    assert_eq!(summary.success, 7);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.success_rate, 70);

    let later = repo
        .summary_24h(tenant, "lever", Utc::now() + Duration::hours(25))
        .await
        .unwrap();
    assert_eq!(later.total, 0);
    assert_eq!(later.success_rate, 0);
}

#[tokio::test]
async fn inbound_receipts_are_left_out_of_the_summary() {
    let (_db, repo) = repo().await;
    let tenant = Uuid::new_v4();
    finished(&repo, tenant, true, "").await;
    finished(&repo, tenant, false, "HTTP 500").await;
    for _ in 0..3 {
        let receipt = repo
            .create_log(NewSyncLog {
                direction: SyncDirection::Inbound,
                event_type: "candidateStageChange".to_string(),
                ..new_log(tenant, "c-9")
            })
            .await
            .unwrap();
        repo.mark_in_progress(receipt.id).await.unwrap();
        repo.mark_success(receipt.id, None, None, false).await.unwrap();
    }

    let summary = repo.summary_24h(tenant, "lever", Utc::now()).await.unwrap();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.success, 1);
    assert_eq!(summary.success_rate, 50);
    assert_eq!(
        repo.last_error(tenant, "lever").await.unwrap().as_deref(),
        Some("HTTP 500")
    );
    assert_eq!(repo.list_recent(tenant, "lever", None, 10).await.unwrap().len(), 5);
}

#[tokio::test]
async fn error_summary_groups_by_message() {
    let (_db, repo) = repo().await;
    let tenant = Uuid::new_v4();
    for _ in 0..3 {
        finished(&repo, tenant, false, "HTTP 429: slow down").await;
    }
    finished(&repo, tenant, false, "candidate c not found").await;
    finished(&repo, tenant, true, "").await;

    let since = Utc::now() - Duration::hours(1);
    let entries = repo.error_summary(tenant, "lever", since, 10).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].error_message, "HTTP 429: slow down");
    assert_eq!(entries[0].count, 3);
    assert_eq!(entries[1].count, 1);

    let top = repo.error_summary(tenant, "lever", since, 1).await.unwrap();
    assert_eq!(top.len(), 1);

    assert!(repo.last_error(tenant, "lever").await.unwrap().is_some());
}

#[tokio::test]
async fn retention_sweep_keeps_unfinished_logs() {
    let (db, repo) = repo().await;
    let tenant = Uuid::new_v4();
    finished(&repo, tenant, true, "").await;
    finished(&repo, tenant, false, "HTTP 500").await;
    let pending = repo.create_log(new_log(tenant, "c-2")).await.unwrap();
    let retrying = repo.create_log(new_log(tenant, "c-3")).await.unwrap();
    repo.mark_in_progress(retrying.id).await.unwrap();
    repo.mark_retrying(retrying.id, "HTTP 503", 1).await.unwrap();

    let sweeper = RetentionSweeper::new(
        db,
        RetentionConfig {
            days_to_keep: 30,
            tick_seconds: 3600,
        },
    );

    // Nothing is old enough yet.
    let report = sweeper.sweep_once(Utc::now()).await.unwrap();
    assert_eq!(report.logs_deleted, 0);

    let report = sweeper
        .sweep_once(Utc::now() + Duration::days(31))
        .await
        .unwrap();
    assert_eq!(report.logs_deleted, 2);

    let remaining = repo.list_recent(tenant, "lever", None, 10).await.unwrap();
    let ids: Vec<Uuid> = remaining.iter().map(|log| log.id).collect();
    assert_eq!(remaining.len(), 2);
    assert!(ids.contains(&pending.id));
    assert!(ids.contains(&retrying.id));
}

#[tokio::test]
async fn list_recent_filters_by_status() {
    let (_db, repo) = repo().await;
    let tenant = Uuid::new_v4();
    finished(&repo, tenant, true, "").await;
    finished(&repo, tenant, false, "boom").await;
    finished(&repo, tenant, false, "boom").await;

    let failed = repo
        .list_recent(tenant, "lever", Some(SyncStatus::Failed), 10)
        .await
        .unwrap();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|log| log.retry_count == 2));

    let limited = repo.list_recent(tenant, "lever", None, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn throttle_window_counts_and_resets() {
    let db = setup_test_db_arc().await.unwrap();
    let throttle = ThrottleStore::new(db);
    let window = StdDuration::from_secs(60);
    let start = Utc::now();

    for expected in 1..=2 {
        let decision = throttle.hit_at("sync-trigger:t", 2, window, start).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.count, expected);
    }
    let blocked = throttle.hit_at("sync-trigger:t", 2, window, start).await.unwrap();
    assert!(!blocked.allowed);
    let retry_after = blocked.retry_after(start);
    assert!(retry_after > StdDuration::from_secs(59) && retry_after <= window);

    // Other keys have their own window.
    let other = throttle.hit_at("sync-trigger:u", 2, window, start).await.unwrap();
    assert!(other.allowed);

    let next_window = start + Duration::seconds(61);
    let fresh = throttle.hit_at("sync-trigger:t", 2, window, next_window).await.unwrap();
    assert!(fresh.allowed);
    assert_eq!(fresh.count, 1);

    let purged = throttle
        .purge_expired(start + Duration::seconds(200))
        .await
        .unwrap();
    assert_eq!(purged, 2);
}
