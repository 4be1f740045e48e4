//! Scheduled purge worker.
//!
//! Runs the purge from inside the server on a fixed interval, as an
//! alternative to an external scheduler calling `POST /purge`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{PurgeError, PurgeRunner};
use crate::{config::PurgeConfig, observability::metrics};

/// Starts the purge worker loop.
///
/// Runs until `shutdown` is cancelled. A run already in progress is finished
/// before the loop returns. A tick that finds another run in progress is
/// skipped.
pub async fn start_purge_worker(
    runner: Arc<PurgeRunner>,
    config: PurgeConfig,
    shutdown: CancellationToken,
) {
    if !config.schedule.enabled {
        tracing::info!("Scheduled purge disabled by configuration");
        return;
    }

    let dry_run_msg = if config.dry_run { " (DRY RUN)" } else { "" };

    tracing::info!(
        interval_hours = config.schedule.interval_hours,
        retention_days = config.retention_days,
        batch_size = config.batch_size,
        max_retries = config.max_retries,
        dry_run = config.dry_run,
        "Starting purge worker{}",
        dry_run_msg
    );

    let interval = config.schedule.interval();

    while !shutdown.is_cancelled() {
        match runner.run_now(config.clone()).await {
            Ok(report) => {
                if report.result.deleted_count > 0 || report.result.has_errors() {
                    tracing::info!(
                        run_id = %report.run_id,
                        deleted = report.result.deleted_count,
                        failed_batches = report.result.errors.len(),
                        "Scheduled purge complete{}",
                        dry_run_msg
                    );
                } else {
                    tracing::debug!(run_id = %report.run_id, "Scheduled purge complete, nothing to delete");
                }
            }
            Err(PurgeError::AlreadyRunning) => {
                metrics::record_purge_run("skipped", 0.0);
                tracing::info!("Skipping scheduled purge, a run is already in progress");
            }
            Err(e) => {
                tracing::error!(error = %e, "Scheduled purge failed");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.cancelled() => {}
        }
    }

    tracing::info!("Purge worker stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use tokio_util::task::TaskTracker;

    use super::*;
    use crate::{
        config::{PurgeRetryConfig, PurgeScheduleConfig},
        purge::test::MemoryDocumentRepo,
    };

    #[tokio::test]
    async fn test_disabled_worker_returns() {
        let runner = Arc::new(PurgeRunner::new(Arc::new(MemoryDocumentRepo::new())));
        // Returns immediately instead of looping
        tokio::time::timeout(
            Duration::from_secs(1),
            start_purge_worker(
                runner.clone(),
                PurgeConfig::default(),
                CancellationToken::new(),
            ),
        )
        .await
        .expect("disabled worker should return");
        assert!(runner.last_report().is_none());
    }

    #[tokio::test]
    async fn test_enabled_worker_runs_immediately() {
        let repo = Arc::new(MemoryDocumentRepo::new());
        repo.seed_deleted(3, Utc::now() - chrono::Duration::days(30));
        let runner = Arc::new(PurgeRunner::new(repo.clone()));
        let config = PurgeConfig {
            schedule: PurgeScheduleConfig {
                enabled: true,
                interval_hours: 24,
            },
            ..Default::default()
        };

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(start_purge_worker(runner.clone(), config, shutdown.clone()));

        for _ in 0..100 {
            if runner.last_report().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let report = runner.last_report().expect("first tick should run");
        assert_eq!(report.result.deleted_count, 3);
        assert_eq!(repo.document_count(), 0);

        // Cancelling wakes the worker out of its 24h sleep
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should stop on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_scheduled_run() {
        let repo = Arc::new(MemoryDocumentRepo::new());
        repo.seed_deleted(4, Utc::now() - chrono::Duration::days(30));
        // First fetch fails, so the run sits in a short retry backoff
        repo.fail_fetch_calls([1]);
        let runner = Arc::new(PurgeRunner::new(repo.clone()));
        let config = PurgeConfig {
            retry: PurgeRetryConfig {
                initial_delay_ms: 200,
                max_delay_ms: 200,
                backoff_multiplier: 1.0,
                jitter: 0.0,
            },
            schedule: PurgeScheduleConfig {
                enabled: true,
                interval_hours: 24,
            },
            ..Default::default()
        };

        let tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();
        tracker.spawn(start_purge_worker(runner.clone(), config, shutdown.clone()));

        for _ in 0..100 {
            if runner.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(runner.is_running());

        shutdown.cancel();
        tracker.close();
        tokio::time::timeout(Duration::from_secs(5), tracker.wait())
            .await
            .expect("tracker should drain");

        // The in-flight run finished instead of being dropped
        let report = runner.last_report().expect("scheduled run should complete");
        assert_eq!(report.result.deleted_count, 4);
        assert!(!report.result.has_errors());
        assert_eq!(repo.document_count(), 0);
    }
}
