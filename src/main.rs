//! # ATS Sync Entry Point

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use ats_sync::{
    config::{AppConfig, ConfigLoader},
    db,
    migration::{Migrator, MigratorTrait},
    repositories::SyncLogRepository,
    server::run_server,
    telemetry,
};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ats-sync")]
#[command(author, version, about = "Candidate and interview sync with external ATS/HR systems")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the retention sweeper (default)
    Serve,

    /// Apply pending database migrations and exit
    Migrate,

    /// Delete finished sync logs older than the given age and exit
    PurgeLogs {
        /// Age in days; defaults to ATS_SYNC_RETENTION_DAYS_TO_KEEP
        #[arg(long)]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing telemetry")?;
    tracing::info!(profile = %config.profile, "configuration loaded");
    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(config = %redacted, "effective configuration");
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Migrate => migrate(&config).await,
        Commands::PurgeLogs { days } => purge_logs(&config, days).await,
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    run_server(config, db).await
}

async fn migrate(config: &AppConfig) -> Result<()> {
    let db = db::init_pool(config)
        .await
        .context("initializing database connection pool")?;
    Migrator::up(&db, None).await.context("applying migrations")?;
    tracing::info!("migrations applied");
    Ok(())
}

async fn purge_logs(config: &AppConfig, days: Option<u32>) -> Result<()> {
    let days = days.unwrap_or(config.retention.days_to_keep);
    if days == 0 {
        bail!("--days must be at least 1");
    }
    let db = db::init_pool(config)
        .await
        .context("initializing database connection pool")?;

    let cutoff = Utc::now() - Duration::days(i64::from(days));
    let deleted = SyncLogRepository::new(Arc::new(db))
        .purge_terminal_older_than(cutoff)
        .await
        .context("purging sync logs")?;
    tracing::info!(deleted, days, "sync logs purged");
    Ok(())
}
