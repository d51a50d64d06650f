//! Tessera Store
//!
//! This crate provides the storage trait and implementations for compiled
//! pipelines, pipeline runs and their task runs, jobs and their errors and
//! leases, and the bridge registry. Data is persisted to SQLite.
//!
//! The [`Store`] trait defines operations for:
//! - Creating, listing and deleting jobs (with their compiled pipeline)
//! - Creating runs, recording task runs, and querying run history
//! - Deduplicated job error reporting
//! - Lease-based job ownership across process instances

mod sqlite;
mod types;

pub use sqlite::SqliteStore;
pub use types::{
  Bridge, Job, JobSpecError, PipelineRun, PipelineSpecRecord, RunStatus, TaskRun, TaskSpecRecord,
};

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tessera_pipeline::PipelineSpec;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Applying the schema failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Storage trait for pipelines, runs and jobs.
#[async_trait]
pub trait Store: Send + Sync {
  /// Persist a compiled pipeline and the job that owns it, atomically.
  async fn create_job(
    &self,
    name: Option<&str>,
    source: &str,
    spec: &PipelineSpec,
  ) -> Result<Job, Error>;

  async fn get_job(&self, job_id: i64) -> Result<Job, Error>;

  /// The job that owns a pipeline spec.
  async fn get_job_for_spec(&self, spec_id: i64) -> Result<Job, Error>;

  async fn list_jobs(&self) -> Result<Vec<Job>, Error>;

  /// Delete a job and its pipeline. Runs, task runs, errors and leases
  /// go with it.
  async fn delete_job(&self, job_id: i64) -> Result<(), Error>;

  async fn get_pipeline_spec(&self, spec_id: i64) -> Result<PipelineSpecRecord, Error>;

  /// Per-task rows of a compiled pipeline, in declaration order.
  async fn list_task_specs(&self, spec_id: i64) -> Result<Vec<TaskSpecRecord>, Error>;

  /// Create a run in the `pending` state.
  async fn create_run(&self, spec_id: i64, overrides: Option<&Value>)
  -> Result<PipelineRun, Error>;

  async fn get_run(&self, run_id: i64) -> Result<PipelineRun, Error>;

  async fn update_run_status(
    &self,
    run_id: i64,
    status: RunStatus,
    error: Option<&str>,
    finished_at: Option<DateTime<Utc>>,
  ) -> Result<(), Error>;

  /// Runs of a pipeline, newest first.
  async fn list_runs(&self, spec_id: i64) -> Result<Vec<PipelineRun>, Error>;

  /// Runs left `pending` or `running`, oldest first.
  async fn list_incomplete_runs(&self) -> Result<Vec<PipelineRun>, Error>;

  /// Insert an in-flight task run.
  async fn create_task_run(&self, task_run: &TaskRun) -> Result<(), Error>;

  /// Record a task run's outcome.
  async fn finish_task_run(
    &self,
    task_run_id: &str,
    output: Option<&Value>,
    error: Option<&str>,
    finished_at: DateTime<Utc>,
  ) -> Result<(), Error>;

  async fn list_task_runs(&self, run_id: i64) -> Result<Vec<TaskRun>, Error>;

  /// Drop task runs that never finished. Returns how many were removed.
  async fn delete_unfinished_task_runs(&self, run_id: i64) -> Result<u64, Error>;

  /// Record a job-level error, bumping `occurrences` when the same
  /// description was already recorded.
  async fn record_job_error(&self, job_id: i64, description: &str) -> Result<(), Error>;

  async fn list_job_errors(&self, job_id: i64) -> Result<Vec<JobSpecError>, Error>;

  /// Take every job whose lease is absent, expired, or already ours.
  /// Returns the ids now held by `holder_id`.
  async fn claim_unclaimed_jobs(&self, holder_id: &str, ttl: Duration) -> Result<Vec<i64>, Error>;

  /// Take or extend the lease on one job. Returns `false` when another
  /// holder has a live lease on it.
  async fn claim_job(&self, job_id: i64, holder_id: &str, ttl: Duration) -> Result<bool, Error>;

  /// Extend every lease held by `holder_id`.
  async fn renew_leases(&self, holder_id: &str, ttl: Duration) -> Result<u64, Error>;

  async fn release_leases(&self, holder_id: &str) -> Result<u64, Error>;

  async fn upsert_bridge(&self, name: &str, url: &str) -> Result<Bridge, Error>;

  async fn get_bridge(&self, name: &str) -> Result<Option<Bridge>, Error>;

  async fn list_bridges(&self) -> Result<Vec<Bridge>, Error>;
}
