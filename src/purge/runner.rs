//! Shared entry point for purge runs.
//!
//! The runner owns the run-level guard, so the HTTP trigger, the scheduler
//! and the CLI can never overlap on the same store, and keeps the report of
//! the last finished run for the status endpoint.

use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::{PurgeCoordinator, PurgeError, PurgeResult, PurgeRun};
use crate::{config::PurgeConfig, db::DocumentRepo, observability::metrics};

/// Acknowledgment for a run that has started in the background.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeTicket {
    pub run_id: Uuid,
    pub cutoff: DateTime<Utc>,
    pub eligible: u64,
}

/// Record of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cutoff: DateTime<Utc>,
    pub eligible: u64,
    pub result: PurgeResult,
}

impl PurgeReport {
    /// Metric label for the run outcome.
    pub fn outcome(&self) -> &'static str {
        if self.result.has_errors() {
            "partial"
        } else {
            "completed"
        }
    }
}

pub struct PurgeRunner {
    repo: Arc<dyn DocumentRepo>,
    guard: Arc<Mutex<()>>,
    current: RwLock<Option<PurgeTicket>>,
    last_report: RwLock<Option<PurgeReport>>,
}

impl PurgeRunner {
    pub fn new(repo: Arc<dyn DocumentRepo>) -> Self {
        Self {
            repo,
            guard: Arc::new(Mutex::new(())),
            current: RwLock::new(None),
            last_report: RwLock::new(None),
        }
    }

    /// Start a run and hand its batch loop to `tracker`.
    ///
    /// Returns once the eligible set is counted, so a startup failure reaches
    /// the caller while batch failures only show up in the report.
    pub async fn trigger(
        self: &Arc<Self>,
        config: PurgeConfig,
        tracker: &TaskTracker,
    ) -> Result<PurgeTicket, PurgeError> {
        let (guard, run, started_at, timer) = self.start(config).await?;
        let ticket = PurgeTicket {
            run_id: run.run_id(),
            cutoff: run.cutoff(),
            eligible: run.eligible(),
        };

        let runner = Arc::clone(self);
        tracker.spawn(async move {
            runner.finish(guard, run, started_at, timer).await;
        });

        Ok(ticket)
    }

    /// Run to completion on the current task.
    pub async fn run_now(&self, config: PurgeConfig) -> Result<PurgeReport, PurgeError> {
        let (guard, run, started_at, timer) = self.start(config).await?;
        Ok(self.finish(guard, run, started_at, timer).await)
    }

    /// Whether a run currently holds the guard.
    pub fn is_running(&self) -> bool {
        self.guard.try_lock().is_err()
    }

    /// The run in progress, if any.
    pub fn current_run(&self) -> Option<PurgeTicket> {
        self.current.read().clone()
    }

    pub fn last_report(&self) -> Option<PurgeReport> {
        self.last_report.read().clone()
    }

    async fn start(
        &self,
        config: PurgeConfig,
    ) -> Result<(OwnedMutexGuard<()>, PurgeRun, DateTime<Utc>, Instant), PurgeError> {
        config.validate().map_err(PurgeError::InvalidConfig)?;

        let guard = Arc::clone(&self.guard)
            .try_lock_owned()
            .map_err(|_| PurgeError::AlreadyRunning)?;

        let timer = Instant::now();
        let started_at = Utc::now();
        let run = match PurgeCoordinator::new(Arc::clone(&self.repo), config)
            .begin(started_at)
            .await
        {
            Ok(run) => run,
            Err(e) => {
                tracing::error!(error = %e, "Purge run failed to start");
                metrics::record_purge_run("failed", timer.elapsed().as_secs_f64());
                return Err(e);
            }
        };

        *self.current.write() = Some(PurgeTicket {
            run_id: run.run_id(),
            cutoff: run.cutoff(),
            eligible: run.eligible(),
        });

        Ok((guard, run, started_at, timer))
    }

    async fn finish(
        &self,
        guard: OwnedMutexGuard<()>,
        run: PurgeRun,
        started_at: DateTime<Utc>,
        timer: Instant,
    ) -> PurgeReport {
        // Cleared on unwind as well as on return
        let current = ClearOnDrop(&self.current);
        let run_id = run.run_id();
        let cutoff = run.cutoff();
        let eligible = run.eligible();

        let result = run.execute().await;

        let report = PurgeReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            cutoff,
            eligible,
            result,
        };

        metrics::record_purge_run(report.outcome(), timer.elapsed().as_secs_f64());
        *self.last_report.write() = Some(report.clone());
        drop(current);
        drop(guard);

        report
    }
}

struct ClearOnDrop<'a>(&'a RwLock<Option<PurgeTicket>>);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        *self.0.write() = None;
    }
}
