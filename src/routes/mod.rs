pub mod error;
pub mod health;
pub mod purge;
