//! Batch loop that physically removes expired soft-deleted documents.
//!
//! A run is split in two phases. [`PurgeCoordinator::begin`] fixes the cutoff
//! and counts the eligible set; failing there means nothing was touched.
//! [`PurgeRun::execute`] then walks the eligible set in fixed-size windows and
//! never fails: per-batch errors are collected in the returned
//! [`PurgeResult`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use super::PurgeError;
use crate::{
    config::PurgeConfig,
    db::{DbError, DocumentRepo},
    models::DocumentId,
    observability::metrics::{self, BatchStage},
};

/// Outcome of one purge run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeResult {
    /// Records removed (or, in a dry run, records that would have been).
    pub deleted_count: u64,
    /// Batches that failed after all attempts.
    pub errors: Vec<BatchError>,
    /// Logical windows visited.
    pub batches_attempted: u64,
    pub dry_run: bool,
}

impl PurgeResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A batch that failed permanently, keyed by its logical offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    pub offset: u64,
    pub error: String,
}

/// Compute the retention cutoff: `now` minus `retention_days` whole days.
///
/// Saturates at the earliest representable instant, in which case nothing is
/// eligible.
pub fn cutoff_for(now: DateTime<Utc>, retention_days: u32) -> DateTime<Utc> {
    now.checked_sub_signed(Duration::days(i64::from(retention_days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Drives purge runs against a document store.
pub struct PurgeCoordinator {
    repo: Arc<dyn DocumentRepo>,
    config: PurgeConfig,
}

impl PurgeCoordinator {
    pub fn new(repo: Arc<dyn DocumentRepo>, config: PurgeConfig) -> Self {
        Self { repo, config }
    }

    /// Fix the cutoff and count the eligible set.
    pub async fn begin(&self, now: DateTime<Utc>) -> Result<PurgeRun, PurgeError> {
        self.config.validate().map_err(PurgeError::InvalidConfig)?;

        let run_id = Uuid::new_v4();
        let cutoff = cutoff_for(now, self.config.retention_days);

        let total = self
            .repo
            .count_purgeable(cutoff)
            .await
            .map_err(PurgeError::Startup)?;

        metrics::record_purge_eligible(total);
        tracing::info!(
            run_id = %run_id,
            cutoff = %cutoff,
            eligible = total,
            batch_size = self.config.batch_size,
            max_retries = self.config.max_retries,
            dry_run = self.config.dry_run,
            "Purge run started"
        );

        Ok(PurgeRun {
            repo: Arc::clone(&self.repo),
            config: self.config.clone(),
            run_id,
            cutoff,
            total,
        })
    }

    /// Start and execute a run in one call.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<PurgeResult, PurgeError> {
        Ok(self.begin(now).await?.execute().await)
    }
}

/// A started run: the cutoff and eligible total are fixed.
pub struct PurgeRun {
    repo: Arc<dyn DocumentRepo>,
    config: PurgeConfig,
    run_id: Uuid,
    cutoff: DateTime<Utc>,
    total: u64,
}

enum BatchOutcome {
    /// The batch went through. `fetched` records left the eligible set
    /// (none in a dry run), `deleted` is what gets reported.
    Done { fetched: u64, deleted: u64 },
    /// No records at this window: the eligible set is exhausted.
    Exhausted,
    Failed { error: String },
}

impl PurgeRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    /// Number of eligible records counted at start.
    pub fn eligible(&self) -> u64 {
        self.total
    }

    /// Walk the eligible set in windows of `batch_size`.
    ///
    /// Logical offsets advance `0, batch_size, 2 * batch_size, ...` until
    /// `total` is reached, whatever the batch outcomes. Records removed by
    /// earlier batches are gone from the store, so each window is requested
    /// at its logical offset minus the records already removed.
    pub async fn execute(self) -> PurgeResult {
        let span = tracing::info_span!("purge_run", run_id = %self.run_id);
        self.execute_inner().instrument(span).await
    }

    async fn execute_inner(self) -> PurgeResult {
        let mut result = PurgeResult {
            dry_run: self.config.dry_run,
            ..Default::default()
        };

        if self.total == 0 {
            tracing::debug!("No eligible records");
            return result;
        }

        let batch_size = u64::from(self.config.batch_size);
        let mut offset: u64 = 0;
        let mut removed: u64 = 0;

        while offset < self.total {
            result.batches_attempted += 1;
            let store_offset = offset.saturating_sub(removed);

            match self.process_batch(offset, store_offset).await {
                BatchOutcome::Done { fetched, deleted } => {
                    removed += fetched;
                    result.deleted_count += deleted;
                }
                BatchOutcome::Exhausted => {
                    tracing::debug!(offset, "Eligible set exhausted before reaching total");
                    break;
                }
                BatchOutcome::Failed { error } => {
                    result.errors.push(BatchError { offset, error });
                }
            }

            offset += batch_size;
        }

        tracing::info!(
            deleted = result.deleted_count,
            failed_batches = result.errors.len(),
            batches = result.batches_attempted,
            eligible = self.total,
            dry_run = result.dry_run,
            "Purge run complete{}",
            if result.dry_run { " (DRY RUN)" } else { "" }
        );

        result
    }

    /// Fetch and delete one window, retrying up to `max_retries` times.
    async fn process_batch(&self, offset: u64, store_offset: u64) -> BatchOutcome {
        let max_attempts = self.config.max_attempts();

        for attempt in 0..max_attempts {
            let last_attempt = attempt + 1 >= max_attempts;

            let (stage, error) = match self.attempt_batch(store_offset).await {
                Ok(Some((fetched, deleted))) => {
                    if attempt > 0 {
                        tracing::debug!(offset, attempt = attempt + 1, "Batch succeeded after retry");
                    }
                    return BatchOutcome::Done { fetched, deleted };
                }
                Ok(None) => return BatchOutcome::Exhausted,
                Err(failure) => failure,
            };

            if last_attempt {
                metrics::record_purge_batch_error(stage);
                tracing::error!(
                    offset,
                    stage = stage.as_str(),
                    attempts = attempt + 1,
                    error = %error,
                    "Purge batch failed"
                );
                return BatchOutcome::Failed {
                    error: error.to_string(),
                };
            }

            let delay = self.config.retry.delay_for_attempt(attempt);
            metrics::record_purge_retry(stage);
            tracing::warn!(
                offset,
                stage = stage.as_str(),
                attempt = attempt + 1,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Purge batch failed, will retry after delay"
            );
            tokio::time::sleep(delay).await;
        }

        // max_attempts is at least 1, so the loop always returns
        BatchOutcome::Failed {
            error: "no attempts made".to_string(),
        }
    }

    /// One attempt at a window. `Ok(None)` means the window was empty.
    async fn attempt_batch(
        &self,
        store_offset: u64,
    ) -> Result<Option<(u64, u64)>, (BatchStage, DbError)> {
        let candidates = self
            .repo
            .list_purgeable(self.cutoff, store_offset, self.config.batch_size)
            .await
            .map_err(|e| (BatchStage::Fetch, e))?;

        if candidates.is_empty() {
            return Ok(None);
        }

        let ids: Vec<DocumentId> = candidates.iter().map(|c| c.id).collect();
        let fetched = ids.len() as u64;

        if self.config.dry_run {
            tracing::info!(
                count = fetched,
                first_id = ids.first().copied(),
                last_id = ids.last().copied(),
                "DRY RUN: Would purge batch"
            );
            return Ok(Some((0, fetched)));
        }

        let deleted = self
            .repo
            .purge_batch(&ids)
            .await
            .map_err(|e| (BatchStage::Delete, e))?;

        metrics::record_purge_deleted(deleted);
        tracing::debug!(store_offset, fetched, deleted, "Purged batch");

        Ok(Some((fetched, deleted)))
    }
}
