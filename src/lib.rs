//! Retention-based physical purge of soft-deleted documents.
//!
//! Documents are soft-deleted elsewhere by setting `deleted_at`. Once the
//! retention window has passed, the purge job removes them and their chunks
//! in fixed-size atomic batches. Runs are triggered over HTTP, by the
//! in-process scheduler or from the CLI.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio_util::task::TaskTracker;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

pub mod config;
pub mod db;
pub mod models;
pub mod observability;
pub mod purge;
pub mod routes;

use crate::{db::DbPool, purge::PurgeRunner};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::DocPurgeConfig>,
    pub db: Option<Arc<DbPool>>,
    /// Present whenever a document store is available.
    pub purge: Option<Arc<PurgeRunner>>,
    /// Tracks background purge runs so shutdown can wait for them.
    pub task_tracker: TaskTracker,
}

impl AppState {
    /// Connect to the configured database (running migrations if asked to)
    /// and build the purge runner on top of it.
    pub async fn new(config: config::DocPurgeConfig) -> Result<Self, db::DbError> {
        let db = if config.database.is_none() {
            tracing::warn!("No database configured, purge endpoints will return 501");
            None
        } else {
            Some(Arc::new(DbPool::from_config(&config.database).await?))
        };

        Ok(Self::with_db(config, db))
    }

    /// Build state around an existing pool.
    pub fn with_db(config: config::DocPurgeConfig, db: Option<Arc<DbPool>>) -> Self {
        let purge = db
            .as_ref()
            .map(|db| Arc::new(PurgeRunner::new(db.documents())));

        Self {
            config: Arc::new(config),
            db,
            purge,
            task_tracker: TaskTracker::new(),
        }
    }
}

/// Build the HTTP router.
pub fn build_app(config: &config::DocPurgeConfig, state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/health/live", get(routes::health::liveness))
        .route("/health/ready", get(routes::health::readiness))
        .route("/purge", post(routes::purge::trigger_purge))
        .route("/purge/status", get(routes::purge::purge_status));

    if config.observability.metrics.enabled {
        app = app.route(
            config.observability.metrics.prometheus_path(),
            get(routes::health::metrics),
        );
    }

    let mut app = app.with_state(state);

    if let Some(cors_layer) = config.server.cors.clone().into_layer() {
        app = app.layer(cors_layer);
    }

    app.layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes))
}
