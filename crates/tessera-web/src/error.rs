use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tessera_pipeline::CompileError;
use tessera_runner::RunnerError;
use tracing::error;

/// Error returned by API handlers.
///
/// Rendered as `{"errors":[{"detail":"<message>"}]}` with the matching status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  #[error("{0}")]
  BadRequest(String),

  #[error("{0}")]
  NotFound(String),

  #[error("{0}")]
  Unprocessable(String),

  #[error("{0}")]
  Conflict(String),

  #[error("{0}")]
  Unavailable(String),

  #[error("{0}")]
  Internal(String),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(status = status.as_u16(), error = %self, "api_error");
    }
    let body = json!({ "errors": [{ "detail": self.to_string() }] });
    (status, Json(body)).into_response()
  }
}

impl From<CompileError> for ApiError {
  fn from(e: CompileError) -> Self {
    ApiError::BadRequest(e.to_string())
  }
}

impl From<tessera_store::Error> for ApiError {
  fn from(e: tessera_store::Error) -> Self {
    match e {
      tessera_store::Error::NotFound(_) => ApiError::NotFound(e.to_string()),
      other => ApiError::Internal(other.to_string()),
    }
  }
}

impl From<RunnerError> for ApiError {
  fn from(e: RunnerError) -> Self {
    match e {
      RunnerError::Store(e) => e.into(),
      RunnerError::InvalidOverride { .. } => ApiError::BadRequest(e.to_string()),
      RunnerError::NotFinished { .. }
      | RunnerError::RunErrored { .. }
      | RunnerError::LeaseHeld { .. } => ApiError::Conflict(e.to_string()),
      RunnerError::ShuttingDown => ApiError::Unavailable(e.to_string()),
      other => ApiError::Internal(other.to_string()),
    }
  }
}
