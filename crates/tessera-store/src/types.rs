use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use sqlx::types::Json;
use tessera_pipeline::PipelineSpec;

/// Status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RunStatus {
  Pending,
  Running,
  Complete,
  Errored,
}

impl RunStatus {
  pub fn is_finished(&self) -> bool {
    matches!(self, RunStatus::Complete | RunStatus::Errored)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Job {
  pub id: i64,
  pub name: Option<String>,
  pub pipeline_spec_id: i64,
  pub created_at: DateTime<Utc>,
}

/// A compiled pipeline as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PipelineSpecRecord {
  pub id: i64,
  pub spec: Json<PipelineSpec>,
  /// The description the pipeline was compiled from.
  pub source: String,
  pub created_at: DateTime<Utc>,
}

/// One node of a stored pipeline, queryable by `dot_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaskSpecRecord {
  pub pipeline_spec_id: i64,
  pub dot_id: String,
  pub task_type: String,
  pub params: Option<Json<Value>>,
  pub successors: Json<Vec<String>>,
  pub position: i64,
}

/// A pipeline run as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PipelineRun {
  pub id: i64,
  pub pipeline_spec_id: i64,
  pub overrides: Option<Json<Value>>,
  pub status: RunStatus,
  /// Infrastructure failure, only set when `status` is `errored`.
  pub error: Option<String>,
  pub created_at: DateTime<Utc>,
  pub finished_at: Option<DateTime<Utc>>,
}

/// One node's execution within a run.
///
/// In flight until `finished_at` is set. A finished record holds either an
/// output (possibly JSON `null`) or an error, except the `__result__` record
/// which stores both arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaskRun {
  pub id: String,
  pub pipeline_run_id: i64,
  pub dot_id: String,
  pub output: Option<Json<Value>>,
  pub error: Option<String>,
  pub created_at: DateTime<Utc>,
  pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRun {
  /// A new in-flight task run.
  pub fn start(pipeline_run_id: i64, dot_id: impl Into<String>) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      pipeline_run_id,
      dot_id: dot_id.into(),
      output: None,
      error: None,
      created_at: Utc::now(),
      finished_at: None,
    }
  }

  pub fn is_finished(&self) -> bool {
    self.finished_at.is_some()
  }

  /// The finished outcome, or `None` while in flight.
  pub fn outcome(&self) -> Option<Result<Value, String>> {
    self.finished_at?;
    Some(match &self.error {
      Some(message) => Err(message.clone()),
      None => Ok(self.output.as_ref().map(|o| o.0.clone()).unwrap_or(Value::Null)),
    })
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct JobSpecError {
  pub id: i64,
  pub job_id: i64,
  pub description: String,
  pub occurrences: i64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// A registered external adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Bridge {
  pub name: String,
  pub url: String,
  pub created_at: DateTime<Utc>,
}
