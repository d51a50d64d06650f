use tessera_config::ConfigError;
use thiserror::Error;

/// Errors that can occur while compiling a pipeline description.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
  /// The description itself could not be read.
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("pipeline has no tasks")]
  Empty,

  #[error("duplicate task id: {dot_id}")]
  DuplicateTaskId { dot_id: String },

  /// `__result__` is added by the compiler and cannot be declared.
  #[error("task id is reserved: {dot_id}")]
  ReservedTaskId { dot_id: String },

  #[error("task '{task_id}' references unknown input '{input}'")]
  UnknownInput { task_id: String, input: String },

  /// The edge `from -> to` closes a cycle.
  #[error("cycle detected: edge {from} -> {to} closes a cycle")]
  CycleDetected { from: String, to: String },

  /// The task's input arity does not fit its type.
  #[error("invalid task '{task_id}': {message}")]
  InvalidTask { task_id: String, message: String },
}
