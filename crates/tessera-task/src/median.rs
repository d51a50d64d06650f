use rust_decimal::Decimal;
use serde_json::Value;
use tessera_config::MedianParams;

use crate::execute::{TaskInput, composite_error};
use crate::error::TaskError;
use crate::value::{decimal_to_value, to_decimal};

/// Median of the successful inputs.
///
/// Up to `allowed_faults` inputs may fail (default: all but one). Inputs that
/// succeeded but cannot be read as decimals count as faults too.
pub(crate) fn run(params: &MedianParams, inputs: &[TaskInput]) -> Result<Value, TaskError> {
  let allowed = params
    .allowed_faults
    .map(|n| n as usize)
    .unwrap_or(inputs.len().saturating_sub(1));

  let mut values = Vec::with_capacity(inputs.len());
  let mut faults: Vec<TaskInput> = Vec::new();
  for input in inputs {
    match input {
      Ok(value) => match to_decimal(value) {
        Ok(decimal) => values.push(decimal),
        Err(e) => faults.push(Err(e.to_string())),
      },
      Err(message) => faults.push(Err(message.clone())),
    }
  }

  if faults.len() > allowed {
    return Err(TaskError::TooManyErrors {
      errors: faults.len(),
      allowed,
      composite: composite_error(&faults).unwrap_or_default(),
    });
  }

  median(values).map(decimal_to_value).ok_or(TaskError::NoValues)
}

fn median(mut values: Vec<Decimal>) -> Option<Decimal> {
  if values.is_empty() {
    return None;
  }
  values.sort();
  let mid = values.len() / 2;
  if values.len() % 2 == 1 {
    Some(values[mid])
  } else {
    Some((values[mid - 1] + values[mid]) / Decimal::TWO)
  }
}
