//! Tessera Runner
//!
//! This crate drives pipeline runs. A [`Runner`] creates run records,
//! executes the compiled graph layer by layer in background tasks, persists
//! every task run as it finishes, and lets callers await completion and read
//! the ordered results.
//!
//! Per-task failures are data: they are stored on the task run and flow to
//! downstream tasks. Only infrastructure faults (persistence, task joins)
//! move a run to `errored`.
//!
//! [`LeaseKeeper`] keeps this process's claim on jobs alive so several
//! instances can share one database. A run is only created, executed or
//! resumed while this instance holds its job's lease.

mod bridges;
mod config;
mod error;
mod execute;
mod lease;
mod runner;

pub use bridges::StoreBridges;
pub use config::RunnerConfig;
pub use error::RunnerError;
pub use lease::LeaseKeeper;
pub use runner::{FinalResult, Runner};
