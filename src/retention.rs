//! # Retention Sweeper
//!
//! Background task that deletes terminal sync logs past the retention window
//! and drops closed throttle windows.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, DbErr};
use tokio::time::{Duration as TokioDuration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::config::RetentionConfig;
use crate::repositories::SyncLogRepository;
use crate::throttle::ThrottleStore;

/// Rows removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub logs_deleted: u64,
    pub throttle_windows_deleted: u64,
}

#[derive(Clone)]
pub struct RetentionSweeper {
    config: RetentionConfig,
    logs: SyncLogRepository,
    throttle: ThrottleStore,
}

impl RetentionSweeper {
    pub fn new(db: Arc<DatabaseConnection>, config: RetentionConfig) -> Self {
        Self {
            config,
            logs: SyncLogRepository::new(db.clone()),
            throttle: ThrottleStore::new(db),
        }
    }

    /// Run sweeps until the provided shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            days_to_keep = self.config.days_to_keep,
            tick_seconds = self.config.tick_seconds,
            "Starting retention sweeper"
        );
        let tick_interval = TokioDuration::from_secs(self.config.tick_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Retention sweeper shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let started = std::time::Instant::now();
                    if let Err(err) = self.sweep_once(Utc::now()).await {
                        error!(error = %err, "Retention sweep failed");
                    }
                    histogram!("ats_sync_retention_sweep_duration_ms")
                        .record(started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Retention sweeper stopped");
    }

    /// Delete `success`/`failed` logs older than the retention window as of
    /// `now`. Pending, in-progress and retrying rows are kept at any age.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, DbErr> {
        let cutoff = now - Duration::days(i64::from(self.config.days_to_keep));
        let logs_deleted = self.logs.purge_terminal_older_than(cutoff).await?;
        let throttle_windows_deleted = self.throttle.purge_expired(now).await?;

        counter!("ats_sync_retention_deleted_total").increment(logs_deleted);
        if logs_deleted > 0 || throttle_windows_deleted > 0 {
            info!(
                logs_deleted,
                throttle_windows_deleted,
                cutoff = %cutoff,
                "Retention sweep removed expired rows"
            );
        }

        Ok(SweepReport {
            logs_deleted,
            throttle_windows_deleted,
        })
    }
}
