//! Conversions applied to values crossing task boundaries.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::TaskError;

const DECIMAL_TARGET: &str = "decimal.Decimal";

/// Name of a value's concrete JSON type as used in coercion errors.
pub fn type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "<nil>",
    Value::Bool(_) => "bool",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

/// Convert a value to a decimal.
///
/// Numbers go through their textual form so no binary float rounding leaks
/// in. Strings are accepted when they hold a decimal literal.
pub fn to_decimal(value: &Value) -> Result<Decimal, TaskError> {
  let text = match value {
    Value::Number(n) => n.to_string(),
    Value::String(s) => s.trim().to_string(),
    other => {
      return Err(TaskError::Coercion {
        type_name: type_name(other),
        target: DECIMAL_TARGET,
      });
    }
  };

  Decimal::from_str(&text)
    .or_else(|_| Decimal::from_scientific(&text))
    .map_err(|_| TaskError::InvalidDecimal { value: text })
}

/// Render a decimal as a normalized string value (`6257.00` becomes `"6257"`).
pub fn decimal_to_value(value: Decimal) -> Value {
  Value::String(value.normalize().to_string())
}

/// Interpret an input as a JSON document.
///
/// Strings (typically raw HTTP bodies) are parsed; structured values are
/// used as they are.
pub fn parse_document(input: &Value) -> Result<Value, TaskError> {
  match input {
    Value::String(body) => serde_json::from_str(body).map_err(|e| TaskError::InvalidJson {
      message: e.to_string(),
    }),
    other => Ok(other.clone()),
  }
}

/// Walk `segments` into `document`.
///
/// Objects are indexed by key and arrays by integer index, where a negative
/// index counts from the end. Returns `None` when any segment is missing.
pub fn resolve_path<'a>(document: &'a Value, segments: &[String]) -> Option<&'a Value> {
  segments
    .iter()
    .try_fold(document, |current, segment| match current {
      Value::Object(map) => map.get(segment),
      Value::Array(items) => {
        let index: i64 = segment.parse().ok()?;
        let index = if index < 0 {
          items.len() as i64 + index
        } else {
          index
        };
        usize::try_from(index).ok().and_then(|i| items.get(i))
      }
      _ => None,
    })
}
