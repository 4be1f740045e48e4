//! Prometheus metrics for purge runs.
//!
//! All recording functions compile to no-ops without the `prometheus` feature.

#[cfg(feature = "prometheus")]
use std::sync::OnceLock;

#[cfg(feature = "prometheus")]
use metrics::{counter, gauge, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

/// Global Prometheus handle for the metrics endpoint.
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Purge runs range from milliseconds (nothing eligible) to hours.
#[cfg(feature = "prometheus")]
const RUN_DURATION_BUCKETS: &[f64] = &[
    0.01, 0.1, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0, 10800.0,
];

/// Initialize the metrics system with the given configuration.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("purge_run_duration_seconds".to_string()),
            RUN_DURATION_BUCKETS,
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?
        .install_recorder()
        .map_err(MetricsError::Install)?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Setup("Metrics already initialized".to_string()))?;

    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if config.enabled {
        tracing::debug!("Metrics enabled in config but the 'prometheus' feature is not compiled");
    }
    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
#[cfg(feature = "prometheus")]
pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Which half of a batch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    Fetch,
    Delete,
}

impl BatchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStage::Fetch => "fetch",
            BatchStage::Delete => "delete",
        }
    }
}

/// Record the size of the eligible set computed at run start.
pub fn record_purge_eligible(count: u64) {
    #[cfg(feature = "prometheus")]
    {
        gauge!("purge_eligible_records").set(count as f64);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = count;
    }
}

/// Record records physically removed by one batch.
pub fn record_purge_deleted(count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("purge_records_deleted_total").increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = count;
    }
}

/// Record a batch attempt that will be retried.
pub fn record_purge_retry(stage: BatchStage) {
    #[cfg(feature = "prometheus")]
    {
        counter!("purge_batch_retries_total", "stage" => stage.as_str()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = stage;
    }
}

/// Record a batch that failed permanently.
pub fn record_purge_batch_error(stage: BatchStage) {
    #[cfg(feature = "prometheus")]
    {
        counter!("purge_batch_errors_total", "stage" => stage.as_str()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = stage;
    }
}

/// Record the end of a run.
///
/// `outcome` is one of `completed`, `partial`, `failed` or `skipped`.
pub fn record_purge_run(outcome: &str, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("purge_runs_total", "outcome" => outcome.to_string()).increment(1);
        histogram!("purge_run_duration_seconds").record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (outcome, duration_secs);
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
