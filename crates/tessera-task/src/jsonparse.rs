use serde_json::Value;
use tessera_config::JsonParseParams;

use crate::execute::TaskInput;
use crate::error::TaskError;
use crate::value::{parse_document, resolve_path};

/// Resolve `params.path` in the single input.
///
/// An explicit `null` at the path is a successful `null`. A missing path is
/// an error unless `lax` is set, in which case it also yields `null`.
pub(crate) fn run(params: &JsonParseParams, inputs: &[TaskInput]) -> Result<Value, TaskError> {
  let input = match inputs.first() {
    Some(Ok(value)) => value,
    Some(Err(message)) => return Err(TaskError::Upstream(message.clone())),
    None => return Err(TaskError::Upstream("jsonparse: missing input".to_string())),
  };

  let document = parse_document(input)?;
  let segments = params.path.segments();

  match resolve_path(&document, segments) {
    Some(value) => Ok(value.clone()),
    None if params.lax => Ok(Value::Null),
    None => Err(TaskError::PathNotFound {
      path: serde_json::to_string(segments).unwrap_or_default(),
      document: match input {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
      },
    }),
  }
}
