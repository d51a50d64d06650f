use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_pipeline::compile_toml;
use tessera_store::{Bridge, Job, JobSpecError, PipelineRun, TaskRun, TaskSpecRecord};
use tracing::info;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::Id;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
  /// Pipeline description in TOML.
  pub toml: String,
}

#[derive(Debug, Serialize)]
pub struct JobView {
  #[serde(flatten)]
  pub job: Job,
  pub tasks: Vec<TaskSpecRecord>,
}

#[derive(Debug, Serialize)]
pub struct RunCreated {
  pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct RunView {
  #[serde(flatten)]
  pub run: PipelineRun,
  pub task_runs: Vec<TaskRun>,
}

#[derive(Debug, Serialize)]
pub struct ResultView {
  pub value: Option<Value>,
  pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResultsView {
  pub results: Vec<ResultView>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBridgeRequest {
  pub name: String,
  pub url: String,
}

pub async fn create_job(
  State(state): State<AppState>,
  body: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<Json<JobView>, ApiError> {
  let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

  let spec = compile_toml(&request.toml)?;
  let store = state.runner.store();
  let job = store
    .create_job(spec.name.as_deref(), &request.toml, &spec)
    .await?;
  let tasks = store.list_task_specs(job.pipeline_spec_id).await?;

  info!(job_id = job.id, tasks = spec.tasks.len(), "job_created");
  Ok(Json(JobView { job, tasks }))
}

pub async fn list_jobs(State(state): State<AppState>) -> Result<Json<Vec<Job>>, ApiError> {
  Ok(Json(state.runner.store().list_jobs().await?))
}

pub async fn get_job(
  State(state): State<AppState>,
  Id(job_id): Id,
) -> Result<Json<JobView>, ApiError> {
  let store = state.runner.store();
  let job = store.get_job(job_id).await?;
  let tasks = store.list_task_specs(job.pipeline_spec_id).await?;
  Ok(Json(JobView { job, tasks }))
}

pub async fn delete_job(
  State(state): State<AppState>,
  Id(job_id): Id,
) -> Result<StatusCode, ApiError> {
  state.runner.store().delete_job(job_id).await?;
  info!(job_id = job_id, "job_deleted");
  Ok(StatusCode::NO_CONTENT)
}

/// Start a run. The body, when present, is a JSON object of overrides.
pub async fn create_run(
  State(state): State<AppState>,
  Id(job_id): Id,
  body: Bytes,
) -> Result<Json<RunCreated>, ApiError> {
  let overrides = if body.iter().all(u8::is_ascii_whitespace) {
    None
  } else {
    let value: Value = serde_json::from_slice(&body)
      .map_err(|e| ApiError::BadRequest(format!("invalid overrides: {}", e)))?;
    Some(value)
  };

  let id = state.runner.create_run_for_job(job_id, overrides).await?;
  Ok(Json(RunCreated { id }))
}

pub async fn get_run(
  State(state): State<AppState>,
  Id(run_id): Id,
) -> Result<Json<RunView>, ApiError> {
  let store = state.runner.store();
  let run = store.get_run(run_id).await?;
  let task_runs = store.list_task_runs(run_id).await?;
  Ok(Json(RunView { run, task_runs }))
}

pub async fn get_run_results(
  State(state): State<AppState>,
  Id(run_id): Id,
) -> Result<Json<ResultsView>, ApiError> {
  let results = state
    .runner
    .results_for_run(run_id)
    .await?
    .into_iter()
    .map(|result| match result {
      Ok(value) => ResultView {
        value: Some(value),
        error: None,
      },
      Err(message) => ResultView {
        value: None,
        error: Some(message),
      },
    })
    .collect();
  Ok(Json(ResultsView { results }))
}

pub async fn list_job_errors(
  State(state): State<AppState>,
  Id(job_id): Id,
) -> Result<Json<Vec<JobSpecError>>, ApiError> {
  let store = state.runner.store();
  // 404 for an unknown job rather than an empty list
  store.get_job(job_id).await?;
  Ok(Json(store.list_job_errors(job_id).await?))
}

pub async fn create_bridge(
  State(state): State<AppState>,
  body: Result<Json<CreateBridgeRequest>, JsonRejection>,
) -> Result<Json<Bridge>, ApiError> {
  let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
  if request.name.trim().is_empty() {
    return Err(ApiError::BadRequest("bridge name must not be empty".to_string()));
  }
  if !(request.url.starts_with("http://") || request.url.starts_with("https://")) {
    return Err(ApiError::BadRequest(format!(
      "bridge url must be http or https: {}",
      request.url
    )));
  }

  let bridge = state
    .runner
    .store()
    .upsert_bridge(&request.name, &request.url)
    .await?;
  info!(name = %bridge.name, "bridge_saved");
  Ok(Json(bridge))
}

pub async fn list_bridges(State(state): State<AppState>) -> Result<Json<Vec<Bridge>>, ApiError> {
  Ok(Json(state.runner.store().list_bridges().await?))
}
