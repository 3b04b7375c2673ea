//! Keyed fixed-window counters persisted in `throttle_counters`.
//!
//! Counts live in the database rather than process memory so limits hold across
//! restarts and across instances sharing a database.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};
use tracing::debug;

use crate::models::throttle_counter::{ActiveModel, Column, Entity};

/// Result of recording one hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleDecision {
    pub allowed: bool,
    pub count: u32,
    pub limit: u32,
    pub resets_at: DateTime<Utc>,
}

impl ThrottleDecision {
    /// Time until the current window closes, measured from `now`.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        (self.resets_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone)]
pub struct ThrottleStore {
    db: Arc<DatabaseConnection>,
}

impl ThrottleStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Count one hit against `key` and report whether it fits within `limit`.
    pub async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<ThrottleDecision, DbErr> {
        self.hit_at(key, limit, window, Utc::now()).await
    }

    pub async fn hit_at(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<ThrottleDecision, DbErr> {
        let now_tz: DateTimeWithTimeZone = now.into();
        let existing = Entity::find_by_id(key.to_string()).one(&*self.db).await?;

        let live = existing.filter(|row| row.window_expires_at > now_tz);
        let row = match live {
            Some(row) => {
                Entity::update_many()
                    .col_expr(Column::Count, Expr::col(Column::Count).add(1))
                    .col_expr(Column::UpdatedAt, Expr::value(now_tz))
                    .filter(Column::Key.eq(key))
                    .filter(Column::WindowExpiresAt.eq(row.window_expires_at))
                    .exec(&*self.db)
                    .await?;
                Entity::find_by_id(key.to_string())
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| DbErr::RecordNotFound(format!("throttle key {key}")))?
            }
            None => {
                let expires = now
                    + chrono::Duration::from_std(window)
                        .map_err(|e| DbErr::Custom(format!("invalid throttle window: {e}")))?;
                let fresh = ActiveModel {
                    key: Set(key.to_string()),
                    count: Set(1),
                    window_expires_at: Set(expires.into()),
                    updated_at: Set(now_tz),
                };
                Entity::insert(fresh)
                    .on_conflict(
                        OnConflict::column(Column::Key)
                            .update_columns([
                                Column::Count,
                                Column::WindowExpiresAt,
                                Column::UpdatedAt,
                            ])
                            .to_owned(),
                    )
                    .exec_without_returning(&*self.db)
                    .await?;
                debug!(key, "opened throttle window");
                Entity::find_by_id(key.to_string())
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| DbErr::RecordNotFound(format!("throttle key {key}")))?
            }
        };

        let count = row.count.max(0) as u32;
        Ok(ThrottleDecision {
            allowed: count <= limit,
            count,
            limit,
            resets_at: row.window_expires_at.with_timezone(&Utc),
        })
    }

    /// Remove windows that closed before `now`.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, DbErr> {
        let now: DateTimeWithTimeZone = now.into();
        let result = Entity::delete_many()
            .filter(Column::WindowExpiresAt.lte(now))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    async fn store() -> ThrottleStore {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        ThrottleStore::new(Arc::new(db))
    }

    #[tokio::test]
    async fn blocks_after_limit_within_window() {
        let store = store().await;
        let now = Utc::now();
        let window = Duration::from_secs(60);

        for expected in 1..=3 {
            let decision = store.hit_at("t1", 3, window, now).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.count, expected);
        }
        let blocked = store.hit_at("t1", 3, window, now).await.unwrap();
        assert!(!blocked.allowed);
        assert!(blocked.retry_after(now) <= window);
    }

    #[tokio::test]
    async fn expired_window_resets() {
        let store = store().await;
        let start = Utc::now();
        let window = Duration::from_secs(60);

        store.hit_at("t1", 1, window, start).await.unwrap();
        assert!(!store.hit_at("t1", 1, window, start).await.unwrap().allowed);

        let later = start + chrono::Duration::seconds(61);
        let decision = store.hit_at("t1", 1, window, later).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.count, 1);
    }

    #[tokio::test]
    async fn keys_are_independent_and_purge_drops_closed_windows() {
        let store = store().await;
        let now = Utc::now();
        let window = Duration::from_secs(60);

        store.hit_at("a", 1, window, now).await.unwrap();
        assert!(store.hit_at("b", 1, window, now).await.unwrap().allowed);

        let purged = store
            .purge_expired(now + chrono::Duration::seconds(120))
            .await
            .unwrap();
        assert_eq!(purged, 2);
    }
}
