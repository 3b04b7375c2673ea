//! # Server
//!
//! Router assembly, shared state and the serve loop.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::credentials::CredentialStore;
use crate::handlers;
use crate::providers::ProviderRegistry;
use crate::repositories::SyncLogRepository;
use crate::retention::RetentionSweeper;
use crate::sync::{SnapshotSource, SyncHandler};
use crate::telemetry;
use crate::throttle::ThrottleStore;

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub registry: Arc<ProviderRegistry>,
    pub credentials: Arc<CredentialStore>,
    pub sync: Arc<SyncHandler>,
    /// Records pushed with sync requests; the sync handler reads from here
    pub snapshots: Arc<SnapshotSource>,
    pub logs: SyncLogRepository,
    pub throttle: ThrottleStore,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        registry: Arc<ProviderRegistry>,
    ) -> Result<Self> {
        let credentials = Arc::new(
            CredentialStore::new(db.clone(), config.clone(), registry.clone())
                .context("failed to initialize credential store")?,
        );
        let snapshots = Arc::new(SnapshotSource::new());
        let sync = Arc::new(SyncHandler::new(
            db.clone(),
            registry.clone(),
            credentials.clone(),
            snapshots.clone(),
        ));

        Ok(Self {
            logs: SyncLogRepository::new(db.clone()),
            throttle: ThrottleStore::new(db.clone()),
            config,
            db,
            registry,
            credentials,
            sync,
            snapshots,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let operator_routes = Router::new()
        .route("/providers", get(handlers::providers::list_providers))
        .route(
            "/integrations/{provider}",
            delete(handlers::integrations::disconnect),
        )
        .route(
            "/integrations/{provider}/status",
            get(handlers::integrations::get_status),
        )
        .route(
            "/integrations/{provider}/logs",
            get(handlers::integrations::list_logs),
        )
        .route(
            "/integrations/{provider}/errors",
            get(handlers::integrations::list_errors),
        )
        .route(
            "/integrations/{provider}/jobs",
            get(handlers::integrations::list_jobs),
        )
        .route(
            "/integrations/{provider}/oauth/exchange",
            post(handlers::integrations::exchange_code),
        )
        .route(
            "/integrations/{provider}/api-key",
            put(handlers::integrations::save_api_key),
        )
        .route("/sync/candidates/{id}", post(handlers::sync::sync_candidate))
        .route("/sync/interviews/{id}", post(handlers::sync::sync_interview))
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    let public_routes = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/webhooks/{provider}/{tenant_id}",
            post(handlers::webhooks::receive_webhook),
        );

    Router::new()
        .merge(operator_routes)
        .merge(public_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(telemetry::trace_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Serve until ctrl-c, running the retention sweeper alongside.
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> Result<()> {
    let addr = config.bind_addr().context("invalid server address")?;
    let config = Arc::new(config);
    let db = Arc::new(db);
    let registry =
        Arc::new(ProviderRegistry::from_config(&config).context("failed to build providers")?);
    let state = AppState::new(config.clone(), db.clone(), registry)?;

    let shutdown = CancellationToken::new();
    let sweeper = RetentionSweeper::new(db, config.retention.clone());
    let sweeper_handle = {
        let token = shutdown.clone();
        tokio::spawn(async move { sweeper.run(token).await })
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, profile = %config.profile, "ats-sync listening");

    let app = create_app(state);
    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown requested");
            signal_token.cancel();
        })
        .await
        .context("server error")?;

    shutdown.cancel();
    if let Err(err) = sweeper_handle.await {
        tracing::warn!(error = %err, "retention sweeper task ended abnormally");
    }
    Ok(())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::providers::list_providers,
        crate::handlers::integrations::get_status,
        crate::handlers::integrations::list_logs,
        crate::handlers::integrations::list_errors,
        crate::handlers::integrations::list_jobs,
        crate::handlers::integrations::exchange_code,
        crate::handlers::integrations::save_api_key,
        crate::handlers::integrations::disconnect,
        crate::handlers::sync::sync_candidate,
        crate::handlers::sync::sync_interview,
        crate::handlers::webhooks::receive_webhook,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::providers::ProviderCapabilities,
            crate::providers::SyncMode,
            crate::providers::CandidateRecord,
            crate::providers::InterviewRecord,
            crate::models::sync_log::SyncStatus,
            crate::sync::IntegrationStatus,
            crate::sync::Stats24h,
            crate::sync::SyncOutcome,
            crate::sync::CandidateEvent,
            crate::sync::InterviewEvent,
            crate::sync::CandidateEventData,
            crate::repositories::ErrorSummaryEntry,
            crate::handlers::providers::ProviderInfo,
            crate::handlers::providers::ProvidersResponse,
            crate::handlers::integrations::SyncLogEntry,
            crate::handlers::integrations::SyncLogsResponse,
            crate::handlers::integrations::ErrorSummaryResponse,
            crate::handlers::integrations::RemoteJob,
            crate::handlers::integrations::JobsResponse,
            crate::handlers::integrations::OAuthExchangeRequest,
            crate::handlers::integrations::ApiKeyRequest,
            crate::handlers::integrations::ConnectedResponse,
            crate::handlers::sync::CandidateSyncRequest,
            crate::handlers::sync::PhotoPayload,
            crate::handlers::sync::InterviewSyncRequest,
            crate::handlers::sync::SyncResponse,
            crate::handlers::sync::ProviderSyncResult,
            crate::handlers::webhooks::WebhookAcceptResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "root", description = "Service metadata"),
        (name = "providers", description = "Provider capability descriptors"),
        (name = "integrations", description = "Per-tenant integration management"),
        (name = "sync", description = "Manual sync triggers"),
        (name = "webhooks", description = "Inbound provider webhooks"),
    ),
    info(
        title = "ATS Sync API",
        description = "Syncs candidates and interviews with external recruiting and HR systems",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
