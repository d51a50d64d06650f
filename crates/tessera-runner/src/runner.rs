//! Pipeline runner.
//!
//! The [`Runner`] is the entry point for executing pipelines. It creates run
//! records, drives each run in a background task bound to the runner (not to
//! the caller), and answers completion and result queries.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tessera_host_http::{HttpClient, HttpPolicy};
use tessera_pipeline::{PipelineSpec, RESULT_DOT_ID};
use tessera_store::{PipelineRun, RunStatus, Store, TaskRun};
use tessera_task::BridgeLookup;
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, instrument, warn};

use crate::bridges::StoreBridges;
use crate::config::RunnerConfig;
use crate::error::RunnerError;
use crate::execute::{Outcomes, execute_run};

/// Ordered outcome of a run, one entry per result position.
pub type FinalResult = Vec<Result<Value, String>>;

/// What a run's waiters are told when this process stops driving it.
#[derive(Debug, Clone)]
pub(crate) enum RunSignal {
  Running,
  /// The final status is in the store.
  Finished,
  /// Stopped by shutdown. The run stays incomplete.
  ShuttingDown,
  /// Another instance took the job's lease. The run stays incomplete.
  LeaseLost { job_id: i64 },
  /// Execution ended but the final status could not be written.
  StatusNotSaved { message: String },
}

/// State shared between the runner handle and its background runs.
pub(crate) struct Inner {
  pub(crate) store: Arc<dyn Store>,
  pub(crate) config: RunnerConfig,
  pub(crate) http: HttpClient,
  pub(crate) bridges: Arc<dyn BridgeLookup>,
  pub(crate) permits: Arc<Semaphore>,
  /// Completion signal per run driven by this process.
  pub(crate) runs: Mutex<HashMap<i64, watch::Sender<RunSignal>>>,
  pub(crate) shutdown: CancellationToken,
  tracker: TaskTracker,
}

impl Inner {
  /// Take or extend this instance's lease on a job.
  pub(crate) async fn hold_lease(&self, job_id: i64) -> Result<(), RunnerError> {
    let held = self
      .store
      .claim_job(job_id, &self.config.holder_id, self.config.lease_ttl)
      .await?;
    if held {
      Ok(())
    } else {
      Err(RunnerError::LeaseHeld { job_id })
    }
  }

  /// Persist the final status, then signal waiters.
  async fn finish_run(&self, run_id: i64, result: Result<(), RunnerError>) {
    let signal = match result {
      Ok(()) => {
        match self
          .store
          .update_run_status(run_id, RunStatus::Complete, None, Some(Utc::now()))
          .await
        {
          Ok(()) => {
            info!(run_id = run_id, "run_completed");
            RunSignal::Finished
          }
          Err(e) => {
            error!(run_id = run_id, error = %e, "run_status_update_failed");
            RunSignal::StatusNotSaved {
              message: e.to_string(),
            }
          }
        }
      }
      Err(RunnerError::ShuttingDown) => {
        warn!(run_id = run_id, "run_interrupted");
        RunSignal::ShuttingDown
      }
      Err(RunnerError::LeaseHeld { job_id }) => {
        warn!(run_id = run_id, job_id = job_id, "run_lease_lost");
        RunSignal::LeaseLost { job_id }
      }
      Err(e) => {
        let message = e.to_string();
        error!(run_id = run_id, error = %message, "run_errored");
        match self
          .store
          .update_run_status(run_id, RunStatus::Errored, Some(&message), Some(Utc::now()))
          .await
        {
          Ok(()) => RunSignal::Finished,
          Err(e) => {
            error!(run_id = run_id, error = %e, "run_status_update_failed");
            RunSignal::StatusNotSaved {
              message: format!("{} ({})", e, message),
            }
          }
        }
      }
    };

    if let Some(sender) = self.runs.lock().await.remove(&run_id) {
      sender.send_replace(signal);
    }
  }
}

/// Handle to the pipeline runner. Cheap to clone.
#[derive(Clone)]
pub struct Runner {
  inner: Arc<Inner>,
}

impl Runner {
  /// Create a runner over the given store.
  pub fn new(store: Arc<dyn Store>, config: RunnerConfig) -> Self {
    let http = HttpClient::new(HttpPolicy {
      allow_unrestricted: config.allow_unrestricted_network_access,
      default_timeout: config.default_http_timeout,
    });
    let bridges: Arc<dyn BridgeLookup> = Arc::new(StoreBridges::new(store.clone()));
    let permits = Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1)));

    Self {
      inner: Arc::new(Inner {
        store,
        config,
        http,
        bridges,
        permits,
        runs: Mutex::new(HashMap::new()),
        shutdown: CancellationToken::new(),
        tracker: TaskTracker::new(),
      }),
    }
  }

  pub fn store(&self) -> &Arc<dyn Store> {
    &self.inner.store
  }

  pub fn config(&self) -> &RunnerConfig {
    &self.inner.config
  }

  /// Create a run of a stored pipeline and start executing it.
  ///
  /// `overrides` maps dot ids to values. An overridden task succeeds with
  /// the given value without executing.
  #[instrument(name = "runner_create_run", skip(self, overrides))]
  pub async fn create_run(
    &self,
    pipeline_spec_id: i64,
    overrides: Option<Value>,
  ) -> Result<i64, RunnerError> {
    if self.inner.shutdown.is_cancelled() {
      return Err(RunnerError::ShuttingDown);
    }

    let spec = self
      .inner
      .store
      .get_pipeline_spec(pipeline_spec_id)
      .await?
      .spec
      .0;
    let override_map = parse_overrides(&spec, overrides.as_ref())?;

    let job = self.inner.store.get_job_for_spec(pipeline_spec_id).await?;
    self.inner.hold_lease(job.id).await?;

    let run = self
      .inner
      .store
      .create_run(pipeline_spec_id, overrides.as_ref())
      .await?;

    info!(
      run_id = run.id,
      pipeline_spec_id = pipeline_spec_id,
      overrides = override_map.len(),
      "run_created"
    );

    self
      .spawn_run(run.id, job.id, Arc::new(spec), override_map, Outcomes::new())
      .await;
    Ok(run.id)
  }

  /// Create a run of the pipeline owned by `job_id`.
  pub async fn create_run_for_job(
    &self,
    job_id: i64,
    overrides: Option<Value>,
  ) -> Result<i64, RunnerError> {
    let job = self.inner.store.get_job(job_id).await?;
    self.create_run(job.pipeline_spec_id, overrides).await
  }

  /// Wait for a run to finish.
  ///
  /// Returns immediately with [`RunnerError::DeadlineExceeded`] when the
  /// deadline has already passed. Cancelling `cancel` or reaching the
  /// deadline stops the wait, never the run. Without a deadline the
  /// configured await timeout applies.
  pub async fn await_run(
    &self,
    run_id: i64,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
  ) -> Result<(), RunnerError> {
    let deadline = deadline.unwrap_or_else(|| Instant::now() + self.inner.config.await_timeout);
    if Instant::now() >= deadline {
      return Err(RunnerError::DeadlineExceeded { run_id });
    }

    // Subscribe before reading the status so a completion in between is not missed.
    let receiver = self
      .inner
      .runs
      .lock()
      .await
      .get(&run_id)
      .map(|sender| sender.subscribe());

    let run = self.inner.store.get_run(run_id).await?;
    if let Some(outcome) = finished_outcome(&run) {
      return outcome;
    }

    let Some(mut receiver) = receiver else {
      return Err(RunnerError::NotRunning { run_id });
    };

    let stopped = async {
      loop {
        let signal = receiver.borrow_and_update().clone();
        if !matches!(signal, RunSignal::Running) {
          return signal;
        }
        if receiver.changed().await.is_err() {
          return RunSignal::Running;
        }
      }
    };

    let signal = tokio::select! {
      signal = stopped => signal,
      _ = cancel.cancelled() => return Err(RunnerError::Cancelled { run_id }),
      _ = tokio::time::sleep_until(deadline) => return Err(RunnerError::DeadlineExceeded { run_id }),
    };

    match signal {
      RunSignal::Finished => {
        let run = self.inner.store.get_run(run_id).await?;
        finished_outcome(&run).unwrap_or(Err(RunnerError::NotFinished { run_id }))
      }
      RunSignal::ShuttingDown => Err(RunnerError::ShuttingDown),
      RunSignal::LeaseLost { job_id } => Err(RunnerError::LeaseHeld { job_id }),
      RunSignal::StatusNotSaved { message } => Err(RunnerError::RunErrored {
        run_id,
        message: format!("run status not saved: {}", message),
      }),
      // the driving task went away without a signal
      RunSignal::Running => Err(RunnerError::NotRunning { run_id }),
    }
  }

  /// Ordered results of a completed run.
  ///
  /// Recomputed from the task runs feeding the result node on every call.
  pub async fn results_for_run(&self, run_id: i64) -> Result<FinalResult, RunnerError> {
    let run = self.inner.store.get_run(run_id).await?;
    match run.status {
      RunStatus::Complete => {}
      RunStatus::Errored => {
        return Err(RunnerError::RunErrored {
          run_id,
          message: run.error.unwrap_or_default(),
        });
      }
      RunStatus::Pending | RunStatus::Running => {
        return Err(RunnerError::NotFinished { run_id });
      }
    }

    let spec = self
      .inner
      .store
      .get_pipeline_spec(run.pipeline_spec_id)
      .await?
      .spec
      .0;
    let task_runs: HashMap<String, TaskRun> = self
      .inner
      .store
      .list_task_runs(run_id)
      .await?
      .into_iter()
      .map(|task_run| (task_run.dot_id.clone(), task_run))
      .collect();

    Ok(
      spec
        .result_positions
        .iter()
        .map(|dot_id| {
          task_runs
            .get(dot_id)
            .and_then(TaskRun::outcome)
            .unwrap_or_else(|| Err(format!("task '{}' has no outcome", dot_id)))
        })
        .collect(),
    )
  }

  /// Run a job's pipeline and return its results.
  ///
  /// Failures other than the caller's own cancellation are recorded as job
  /// errors, including runs interrupted by shutdown.
  #[instrument(name = "runner_observe", skip(self, overrides, cancel))]
  pub async fn observe(
    &self,
    job_id: i64,
    overrides: Option<Value>,
    cancel: &CancellationToken,
  ) -> Result<FinalResult, RunnerError> {
    let result = async {
      let run_id = self.create_run_for_job(job_id, overrides).await?;
      self.await_run(run_id, cancel, None).await?;
      self.results_for_run(run_id).await
    }
    .await;

    if let Err(e) = &result {
      if let Some(description) = job_error_description(e) {
        if let Err(store_err) = self
          .inner
          .store
          .record_job_error(job_id, &description)
          .await
        {
          warn!(job_id = job_id, error = %store_err, "job_error_not_recorded");
        }
      }
    }

    result
  }

  /// Re-drive runs a previous process left `pending` or `running`.
  ///
  /// Only runs whose job this instance can lease are touched; a job leased
  /// by a live instance is still being driven there. Finished task runs are
  /// reused; unfinished ones are discarded and their tasks executed again.
  /// Returns the resumed run ids.
  pub async fn resume_incomplete_runs(&self) -> Result<Vec<i64>, RunnerError> {
    let mut resumed = Vec::new();

    for run in self.inner.store.list_incomplete_runs().await? {
      if self.inner.runs.lock().await.contains_key(&run.id) {
        continue;
      }

      let job = self.inner.store.get_job_for_spec(run.pipeline_spec_id).await?;
      match self.inner.hold_lease(job.id).await {
        Ok(()) => {}
        Err(RunnerError::LeaseHeld { job_id }) => {
          info!(run_id = run.id, job_id = job_id, "run_resume_skipped");
          continue;
        }
        Err(e) => return Err(e),
      }

      let spec = self
        .inner
        .store
        .get_pipeline_spec(run.pipeline_spec_id)
        .await?
        .spec
        .0;
      let overrides = parse_overrides(&spec, run.overrides.as_ref().map(|o| &o.0))?;

      self.inner.store.delete_unfinished_task_runs(run.id).await?;
      let outcomes: Outcomes = self
        .inner
        .store
        .list_task_runs(run.id)
        .await?
        .into_iter()
        .filter_map(|task_run| {
          let outcome = task_run.outcome()?;
          Some((task_run.dot_id, outcome))
        })
        .collect();

      info!(run_id = run.id, reused = outcomes.len(), "run_resumed");
      self
        .spawn_run(run.id, job.id, Arc::new(spec), overrides, outcomes)
        .await;
      resumed.push(run.id);
    }

    Ok(resumed)
  }

  /// Stop driving runs and wait for their background tasks to exit.
  ///
  /// Interrupted runs stay `running` in the store and are picked up by
  /// [`Runner::resume_incomplete_runs`] on the next start.
  pub async fn shutdown(&self) {
    self.inner.shutdown.cancel();
    self.inner.tracker.close();
    self.inner.tracker.wait().await;
  }

  async fn spawn_run(
    &self,
    run_id: i64,
    job_id: i64,
    spec: Arc<PipelineSpec>,
    overrides: HashMap<String, Value>,
    outcomes: Outcomes,
  ) {
    let (sender, _) = watch::channel(RunSignal::Running);
    self.inner.runs.lock().await.insert(run_id, sender);

    let inner = self.inner.clone();
    self.inner.tracker.spawn(async move {
      let result = execute_run(inner.clone(), run_id, job_id, spec, overrides, outcomes).await;
      inner.finish_run(run_id, result).await;
    });
  }
}

fn finished_outcome(run: &PipelineRun) -> Option<Result<(), RunnerError>> {
  match run.status {
    RunStatus::Complete => Some(Ok(())),
    RunStatus::Errored => Some(Err(RunnerError::RunErrored {
      run_id: run.id,
      message: run.error.clone().unwrap_or_default(),
    })),
    RunStatus::Pending | RunStatus::Running => None,
  }
}

/// Job errors are deduplicated by description, so run ids stay out of it.
///
/// A caller that stopped waiting is not a job failure.
fn job_error_description(error: &RunnerError) -> Option<String> {
  match error {
    RunnerError::Cancelled { .. } => None,
    RunnerError::ShuttingDown => Some("run interrupted: runner is shutting down".to_string()),
    RunnerError::Store(tessera_store::Error::NotFound(_)) => None,
    RunnerError::DeadlineExceeded { .. } => Some("deadline exceeded waiting for run".to_string()),
    RunnerError::RunErrored { message, .. } => Some(format!("run errored: {}", message)),
    other => Some(other.to_string()),
  }
}

fn parse_overrides(
  spec: &PipelineSpec,
  overrides: Option<&Value>,
) -> Result<HashMap<String, Value>, RunnerError> {
  let map = match overrides {
    None | Some(Value::Null) => return Ok(HashMap::new()),
    Some(Value::Object(map)) => map,
    Some(_) => {
      return Err(RunnerError::InvalidOverride {
        message: "overrides must be an object keyed by task id".to_string(),
      });
    }
  };

  map
    .iter()
    .map(|(dot_id, value)| {
      if dot_id == RESULT_DOT_ID {
        return Err(RunnerError::InvalidOverride {
          message: format!("{} cannot be overridden", RESULT_DOT_ID),
        });
      }
      if spec.get_task(dot_id).is_none() {
        return Err(RunnerError::InvalidOverride {
          message: format!("unknown task '{}'", dot_id),
        });
      }
      Ok((dot_id.clone(), value.clone()))
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tessera_pipeline::compile_toml;

  fn spec() -> PipelineSpec {
    compile_toml(
      r#"
[[tasks]]
id = "a"
type = "http"
url = "https://example.com"
"#,
    )
    .unwrap()
  }

  #[test]
  fn test_parse_overrides() {
    let spec = spec();
    assert!(parse_overrides(&spec, None).unwrap().is_empty());

    let map = parse_overrides(&spec, Some(&json!({"a": "{}"}))).unwrap();
    assert_eq!(map.get("a"), Some(&json!("{}")));

    assert!(matches!(
      parse_overrides(&spec, Some(&json!({"b": 1}))),
      Err(RunnerError::InvalidOverride { .. })
    ));
    assert!(matches!(
      parse_overrides(&spec, Some(&json!({"__result__": 1}))),
      Err(RunnerError::InvalidOverride { .. })
    ));
    assert!(matches!(
      parse_overrides(&spec, Some(&json!([1]))),
      Err(RunnerError::InvalidOverride { .. })
    ));
  }

  #[test]
  fn test_job_error_description_is_stable() {
    let a = job_error_description(&RunnerError::DeadlineExceeded { run_id: 1 });
    let b = job_error_description(&RunnerError::DeadlineExceeded { run_id: 2 });
    assert_eq!(a, b);
    assert_eq!(
      job_error_description(&RunnerError::Cancelled { run_id: 1 }),
      None
    );
    assert_eq!(
      job_error_description(&RunnerError::ShuttingDown).as_deref(),
      Some("run interrupted: runner is shutting down")
    );
    assert_eq!(
      job_error_description(&RunnerError::LeaseHeld { job_id: 3 }).as_deref(),
      Some("job 3 is leased by another instance")
    );
  }
}
