use thiserror::Error;

/// Errors produced while reading a pipeline description.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
  /// The document is not valid TOML/JSON.
  #[error("invalid description: {message}")]
  Syntax { message: String },

  /// A key that neither the job nor the task type understands.
  #[error("unrecognised key: {key}")]
  UnrecognisedKey { key: String },

  /// A required key is absent.
  #[error("task '{task_id}' is missing required key: {key}")]
  MissingKey { task_id: String, key: String },

  /// The `type` tag does not name a known task type.
  #[error("task '{task_id}' has unknown task type: {tag}")]
  UnknownTaskType { task_id: String, tag: String },

  /// Parameters are present but malformed.
  #[error("invalid parameters for task '{task_id}': {message}")]
  InvalidParams { task_id: String, message: String },

  /// Structural problem with the document shape.
  #[error("invalid description: {message}")]
  Shape { message: String },
}
