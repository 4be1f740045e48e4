//! Health check endpoints for Kubernetes probes and monitoring.

use axum::{Json, extract::State, response::IntoResponse};
use http::StatusCode;
use serde::Serialize;

use crate::AppState;
#[cfg(feature = "prometheus")]
use crate::observability::metrics::get_prometheus_handle;

/// Detailed health status response.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// Overall status: "healthy", "degraded", or "unhealthy"
    pub status: String,
    /// Service version
    pub version: String,
    /// Individual subsystem statuses
    pub subsystems: SubsystemStatus,
}

/// Status of individual subsystems.
#[derive(Debug, Serialize)]
pub struct SubsystemStatus {
    /// Database connection status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<ComponentStatus>,
    /// Purge runner state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purge: Option<PurgeComponentStatus>,
}

/// Status of a single component.
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    /// Whether the component is healthy
    pub healthy: bool,
    /// Optional message with details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Latency of the health check in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Purge runner state as seen by the health check.
#[derive(Debug, Serialize)]
pub struct PurgeComponentStatus {
    /// Whether a run currently holds the purge guard
    pub running: bool,
    /// Batch errors recorded by the last finished run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_failed_batches: Option<usize>,
}

/// Full health check with subsystem status.
///
/// Reports the database connection and the purge runner.
#[tracing::instrument(name = "health.check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let mut overall_healthy = true;
    let mut subsystems = SubsystemStatus {
        database: None,
        purge: None,
    };

    // Check database
    if let Some(db) = &state.db {
        let start = std::time::Instant::now();
        let db_healthy = db.health_check().await.is_ok();
        let latency_ms = start.elapsed().as_millis() as u64;

        if !db_healthy {
            overall_healthy = false;
        }

        subsystems.database = Some(ComponentStatus {
            healthy: db_healthy,
            message: if db_healthy {
                None
            } else {
                Some("Database connection failed".to_string())
            },
            latency_ms: Some(latency_ms),
        });
    }

    // A partial last run degrades the service but keeps it in rotation
    let mut degraded = false;
    if let Some(runner) = &state.purge {
        let last_report = runner.last_report();
        degraded = last_report.as_ref().is_some_and(|r| r.result.has_errors());
        subsystems.purge = Some(PurgeComponentStatus {
            running: runner.is_running(),
            last_run_failed_batches: last_report.map(|r| r.result.errors.len()),
        });
    }

    let status = if !overall_healthy {
        "unhealthy"
    } else if degraded {
        "degraded"
    } else {
        "healthy"
    };

    let health = HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subsystems,
    };

    let status_code = if overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

/// Kubernetes liveness probe.
///
/// Always 200 while the process can serve requests.
#[tracing::instrument(name = "health.liveness")]
pub async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}

/// Kubernetes readiness probe.
///
/// Ready when the document store answers. Without a store only the health
/// endpoints are served, so the service is always ready.
#[tracing::instrument(name = "health.readiness", skip(state))]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match &state.db {
        Some(db) if db.health_check().await.is_err() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    }
}

/// Prometheus metrics endpoint.
///
/// Returns metrics in Prometheus text format.
#[tracing::instrument(name = "health.metrics")]
pub async fn metrics() -> impl IntoResponse {
    #[cfg(feature = "prometheus")]
    {
        return match get_prometheus_handle() {
            Some(handle) => {
                let metrics: String = handle.render();
                (
                    StatusCode::OK,
                    [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                    metrics,
                )
            }
            None => (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            ),
        };
    }
    #[cfg(not(feature = "prometheus"))]
    (
        StatusCode::NOT_FOUND,
        [("content-type", "text/plain")],
        "Prometheus metrics not enabled".to_string(),
    )
}
