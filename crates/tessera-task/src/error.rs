use tessera_host_http::HttpError;
use thiserror::Error;

/// Errors that can occur while executing a single task.
///
/// These never fail a run. The runner stores the rendered message on the
/// task's record and hands it to downstream tasks as data.
#[derive(Debug, Error)]
pub enum TaskError {
  /// One or more direct inputs failed. Carries the upstream message verbatim.
  #[error("{0}")]
  Upstream(String),

  /// A value of the wrong JSON type reached a typed consumer.
  #[error("type {type_name} cannot be converted to {target}")]
  Coercion {
    type_name: &'static str,
    target: &'static str,
  },

  /// A string could not be parsed as a decimal.
  #[error("could not parse '{value}' as decimal.Decimal")]
  InvalidDecimal { value: String },

  /// `path` is the JSON array of segments, `document` the searched body.
  #[error("could not resolve path {path} in {document}")]
  PathNotFound { path: String, document: String },

  #[error("could not parse input as JSON: {message}")]
  InvalidJson { message: String },

  #[error("{0}")]
  Http(#[from] HttpError),

  #[error("bridge not found: {name}")]
  BridgeNotFound { name: String },

  /// The bridge registry could not be consulted.
  #[error("bridge lookup failed: {message}")]
  BridgeLookup { message: String },

  #[error("multiply: decimal overflow")]
  Overflow,

  #[error("median: too many errors ({errors} > {allowed}): {composite}")]
  TooManyErrors {
    errors: usize,
    allowed: usize,
    composite: String,
  },

  #[error("median: no successful inputs")]
  NoValues,

  #[error("task cancelled")]
  Cancelled,
}
