//! Physical purge of expired soft-deleted documents.
//!
//! - [`PurgeCoordinator`]: cutoff, count and the batch loop
//! - [`PurgeRunner`]: run-level guard, background execution, last report
//! - [`start_purge_worker`]: in-process schedule

mod coordinator;
mod error;
mod runner;
mod worker;

#[cfg(test)]
pub(crate) mod test;

pub use coordinator::*;
pub use error::PurgeError;
pub use runner::*;
pub use worker::start_purge_worker;
