//! Runner error types.

/// Errors that can occur while creating, executing or awaiting runs.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
  #[error(transparent)]
  Store(#[from] tessera_store::Error),

  /// Overrides were not an object or named a task the pipeline lacks.
  #[error("invalid overrides: {message}")]
  InvalidOverride { message: String },

  /// The caller's deadline passed before the run finished.
  #[error("deadline exceeded waiting for run {run_id}")]
  DeadlineExceeded { run_id: i64 },

  /// The caller stopped waiting. The run itself continues.
  #[error("cancelled waiting for run {run_id}")]
  Cancelled { run_id: i64 },

  /// The run ended in the `errored` state.
  #[error("run {run_id} errored: {message}")]
  RunErrored { run_id: i64, message: String },

  /// The run is incomplete but no task in this process is driving it.
  #[error("run {run_id} is not executing in this process")]
  NotRunning { run_id: i64 },

  #[error("run {run_id} has not finished")]
  NotFinished { run_id: i64 },

  /// Another instance holds a live lease on the job.
  #[error("job {job_id} is leased by another instance")]
  LeaseHeld { job_id: i64 },

  /// The runner is shutting down and stopped driving the run.
  #[error("runner is shutting down")]
  ShuttingDown,

  /// A spawned node task panicked or was aborted.
  #[error("task join error: {message}")]
  Join { message: String },
}
