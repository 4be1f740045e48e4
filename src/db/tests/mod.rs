//! Shared document store tests
//!
//! Test logic is written once against `&dyn DocumentRepo` and instantiated for
//! each backend:
//!
//! - **SQLite**: in-memory, runs with every `cargo test`
//! - **PostgreSQL**: testcontainers, run with `cargo test -- --ignored`

pub mod harness;
