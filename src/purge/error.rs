use crate::db::DbError;

/// Run-level purge failures.
///
/// Per-batch failures never surface here; they are collected in
/// [`PurgeResult::errors`](super::PurgeResult).
#[derive(Debug, thiserror::Error)]
pub enum PurgeError {
    /// The eligible set could not be counted, so no batch was attempted.
    #[error("Purge could not start: {0}")]
    Startup(#[source] DbError),

    /// Another run holds the purge guard.
    #[error("A purge run is already in progress")]
    AlreadyRunning,

    #[error("Invalid purge configuration: {0}")]
    InvalidConfig(String),
}
