use serde_json::Value;

use crate::execute::TaskInput;

/// What the `__result__` record stores for a list of result positions.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultProjection {
  /// JSON array with one value per position, `null` where it failed.
  pub output: Value,
  /// JSON array with one message per position, `""` where it succeeded.
  /// `None` when every position succeeded.
  pub error: Option<Value>,
}

/// Project the ordered result positions into the dual encoding persisted on
/// the result record.
pub fn project_results(positions: &[TaskInput]) -> ResultProjection {
  let output = positions
    .iter()
    .map(|p| p.as_ref().ok().cloned().unwrap_or(Value::Null))
    .collect();

  let error = positions.iter().any(|p| p.is_err()).then(|| {
    positions
      .iter()
      .map(|p| Value::String(p.as_ref().err().cloned().unwrap_or_default()))
      .collect()
  });

  ResultProjection {
    output: Value::Array(output),
    error: error.map(Value::Array),
  }
}
