use serde_json::Value;
use tessera_config::MultiplyParams;

use crate::execute::TaskInput;
use crate::error::TaskError;
use crate::value::{decimal_to_value, to_decimal};

pub(crate) fn run(params: &MultiplyParams, inputs: &[TaskInput]) -> Result<Value, TaskError> {
  let input = match inputs.first() {
    Some(Ok(value)) => value,
    Some(Err(message)) => return Err(TaskError::Upstream(message.clone())),
    None => return Err(TaskError::Upstream("multiply: missing input".to_string())),
  };

  let product = to_decimal(input)?
    .checked_mul(params.times)
    .ok_or(TaskError::Overflow)?;
  Ok(decimal_to_value(product))
}
