//! The per-run execution loop.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tessera_pipeline::{NodeKind, PipelineSpec, TaskSpec};
use tessera_store::{RunStatus, TaskRun};
use tessera_task::{TaskContext, TaskError, TaskInput, project_results, run_task};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::error::RunnerError;
use crate::runner::Inner;

/// Finished outcomes keyed by dot id.
pub(crate) type Outcomes = HashMap<String, TaskInput>;

/// Handle for a spawned node task.
type NodeHandle = JoinHandle<Result<(String, TaskInput), RunnerError>>;

/// Execute a run to completion.
///
/// Nodes already present in `outcomes` (finished before a restart) are not
/// executed again. Each layer is dispatched concurrently and fully awaited
/// before the next one starts, so a node's task run is persisted before any
/// of its dependents is dispatched.
///
/// The job's lease is renewed before every layer. Losing it stops the run
/// with [`RunnerError::LeaseHeld`], leaving it to the new holder.
#[instrument(
  name = "pipeline_run",
  skip(inner, spec, overrides, outcomes),
  fields(run_id = run_id, job_id = job_id)
)]
pub(crate) async fn execute_run(
  inner: Arc<Inner>,
  run_id: i64,
  job_id: i64,
  spec: Arc<PipelineSpec>,
  overrides: HashMap<String, Value>,
  mut outcomes: Outcomes,
) -> Result<(), RunnerError> {
  inner
    .store
    .update_run_status(run_id, RunStatus::Running, None, None)
    .await?;

  info!(
    run_id = run_id,
    tasks = spec.tasks.len(),
    reused = outcomes.len(),
    "run_started"
  );

  for layer in spec.topological_layers() {
    if inner.shutdown.is_cancelled() {
      return Err(RunnerError::ShuttingDown);
    }
    inner.hold_lease(job_id).await?;

    let mut handles: Vec<NodeHandle> = Vec::with_capacity(layer.len());
    for dot_id in layer {
      if outcomes.contains_key(&dot_id) {
        continue;
      }
      let Some(task) = spec.get_task(&dot_id).cloned() else {
        continue;
      };

      let inputs: Vec<TaskInput> = task
        .inputs
        .iter()
        .map(|input| {
          outcomes
            .get(input)
            .cloned()
            .unwrap_or_else(|| Err(format!("input '{}' has no outcome", input)))
        })
        .collect();
      let override_value = overrides.get(&dot_id).cloned();

      handles.push(tokio::spawn(execute_node(
        inner.clone(),
        run_id,
        task,
        inputs,
        override_value,
      )));
    }

    // Wait for the whole layer, then surface the first infrastructure fault.
    let mut fault = None;
    for result in futures::future::join_all(handles).await {
      match result {
        Ok(Ok((dot_id, outcome))) => {
          outcomes.insert(dot_id, outcome);
        }
        Ok(Err(e)) => {
          fault.get_or_insert(e);
        }
        Err(e) => {
          fault.get_or_insert(RunnerError::Join {
            message: e.to_string(),
          });
        }
      }
    }
    if let Some(e) = fault {
      return Err(e);
    }
  }

  Ok(())
}

/// Execute one node: insert its task run, compute, record the outcome.
///
/// Returns `Err` only for infrastructure faults. A task interrupted by
/// shutdown leaves its task run unfinished so a later resume re-executes it.
#[instrument(
  name = "pipeline_task",
  skip(inner, task, inputs, override_value),
  fields(run_id = run_id, dot_id = %task.dot_id, task_type = task.task_type())
)]
async fn execute_node(
  inner: Arc<Inner>,
  run_id: i64,
  task: TaskSpec,
  inputs: Vec<TaskInput>,
  override_value: Option<Value>,
) -> Result<(String, TaskInput), RunnerError> {
  let cancel = inner.shutdown.child_token();

  let _permit = tokio::select! {
    permit = inner.permits.clone().acquire_owned() => {
      permit.map_err(|_| RunnerError::ShuttingDown)?
    }
    _ = cancel.cancelled() => return Err(RunnerError::ShuttingDown),
  };

  let task_run = TaskRun::start(run_id, &task.dot_id);
  inner.store.create_task_run(&task_run).await?;

  info!(
    run_id = run_id,
    task_run_id = %task_run.id,
    dot_id = %task.dot_id,
    task_type = task.task_type(),
    "task_started"
  );

  let params = match &task.kind {
    NodeKind::Task(params) => params,
    NodeKind::Result => {
      let projection = project_results(&inputs);
      let error = projection.error.as_ref().map(Value::to_string);
      inner
        .store
        .finish_task_run(
          &task_run.id,
          Some(&projection.output),
          error.as_deref(),
          Utc::now(),
        )
        .await?;

      info!(
        run_id = run_id,
        task_run_id = %task_run.id,
        output = %projection.output,
        "task_completed"
      );
      return Ok((task.dot_id, Ok(projection.output)));
    }
  };

  let outcome = match override_value {
    Some(value) => Ok(value),
    None => {
      let ctx = TaskContext {
        run_id,
        cancel,
        http: inner.http.clone(),
        bridges: inner.bridges.clone(),
      };
      run_task(&ctx, params, &inputs).await
    }
  };

  match outcome {
    Ok(value) => {
      inner
        .store
        .finish_task_run(&task_run.id, Some(&value), None, Utc::now())
        .await?;
      info!(
        run_id = run_id,
        task_run_id = %task_run.id,
        output = %value,
        "task_completed"
      );
      Ok((task.dot_id, Ok(value)))
    }
    Err(TaskError::Cancelled) => {
      warn!(run_id = run_id, task_run_id = %task_run.id, "task_interrupted");
      Err(RunnerError::ShuttingDown)
    }
    Err(e) => {
      let message = e.to_string();
      inner
        .store
        .finish_task_run(&task_run.id, None, Some(&message), Utc::now())
        .await?;
      warn!(
        run_id = run_id,
        task_run_id = %task_run.id,
        error = %message,
        "task_failed"
      );
      Ok((task.dot_id, Err(message)))
    }
  }
}
