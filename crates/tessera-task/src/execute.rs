use serde_json::Value;
use tessera_config::TaskParams;

use crate::context::TaskContext;
use crate::error::TaskError;

/// Outcome of one direct input: its value or its failure message.
pub type TaskInput = Result<Value, String>;

/// Combine the failure messages of `inputs`.
///
/// A single failure is returned verbatim so the originating message survives
/// any number of hops. Several are joined with `"; "` in input order.
pub fn composite_error(inputs: &[TaskInput]) -> Option<String> {
  let messages: Vec<&str> = inputs
    .iter()
    .filter_map(|input| input.as_ref().err().map(String::as_str))
    .collect();

  match messages.as_slice() {
    [] => None,
    [single] => Some(single.to_string()),
    many => Some(many.join("; ")),
  }
}

/// Execute one task against the outcomes of its inputs.
///
/// Tasks other than `median` do not run when an input failed and fail with
/// the composite upstream message instead. Cancelling `ctx.cancel` aborts the
/// task with [`TaskError::Cancelled`].
pub async fn run_task(
  ctx: &TaskContext,
  params: &TaskParams,
  inputs: &[TaskInput],
) -> Result<Value, TaskError> {
  if !matches!(params, TaskParams::Median(_)) {
    if let Some(message) = composite_error(inputs) {
      return Err(TaskError::Upstream(message));
    }
  }

  let work = async {
    match params {
      TaskParams::Http(p) => crate::http::run(ctx, p).await,
      TaskParams::Bridge(p) => crate::bridge::run(ctx, p).await,
      TaskParams::JsonParse(p) => crate::jsonparse::run(p, inputs),
      TaskParams::Multiply(p) => crate::multiply::run(p, inputs),
      TaskParams::Median(p) => crate::median::run(p, inputs),
    }
  };

  tokio::select! {
    result = work => result,
    _ = ctx.cancel.cancelled() => Err(TaskError::Cancelled),
  }
}
