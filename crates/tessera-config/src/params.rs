//! Strongly-typed parameters, one struct per task type.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::enums::HttpMethod;

/// Fetch a URL and output the raw response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpParams {
  #[serde(default)]
  pub method: HttpMethod,
  pub url: String,
  /// JSON body sent with the request.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub request_data: Option<serde_json::Value>,
  /// Overrides the configured default HTTP timeout.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  /// Allows this node to reach non-public destinations.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub allow_unrestricted_network_access: Option<bool>,
}

/// Call a registered external adapter by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeParams {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub request_data: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
}

/// Resolve a path inside a JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonParseParams {
  pub path: JsonPath,
  /// A missing path yields `null` instead of an error.
  #[serde(default)]
  pub lax: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplyParams {
  #[serde(deserialize_with = "deserialize_decimal")]
  pub times: Decimal,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MedianParams {
  /// Number of failed inputs tolerated. Defaults to all but one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub allowed_faults: Option<u32>,
}

/// Lookup path for `jsonparse`.
///
/// Accepts either a list of segments (`["data", "result"]`) or a
/// comma-separated string (`"data,result"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct JsonPath(pub Vec<String>);

impl JsonPath {
  pub fn segments(&self) -> &[String] {
    &self.0
  }
}

impl<'de> Deserialize<'de> for JsonPath {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
      Segments(Vec<String>),
      Joined(String),
    }

    let segments = match Raw::deserialize(deserializer)? {
      Raw::Segments(segments) => segments,
      Raw::Joined(joined) if joined.trim().is_empty() => Vec::new(),
      Raw::Joined(joined) => joined.split(',').map(|s| s.trim().to_string()).collect(),
    };
    Ok(JsonPath(segments))
  }
}

/// Decimals may be written as strings or bare numbers. Numbers are parsed from
/// their textual form so `62.57` stays exactly `62.57`.
fn deserialize_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
  D: Deserializer<'de>,
{
  let value = serde_json::Value::deserialize(deserializer)?;
  let text = match &value {
    serde_json::Value::String(s) => s.trim().to_string(),
    serde_json::Value::Number(n) => n.to_string(),
    other => {
      return Err(serde::de::Error::custom(format!(
        "expected a decimal, got {}",
        other
      )));
    }
  };
  Decimal::from_str(&text)
    .or_else(|_| Decimal::from_scientific(&text))
    .map_err(|e| serde::de::Error::custom(format!("invalid decimal '{}': {}", text, e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_json_path_from_list_and_string() {
    let from_list: JsonPath = serde_json::from_value(json!(["data", "result"])).unwrap();
    let from_string: JsonPath = serde_json::from_value(json!("data, result")).unwrap();
    assert_eq!(from_list, from_string);
    assert_eq!(from_list.segments(), &["data".to_string(), "result".to_string()]);
  }

  #[test]
  fn test_multiply_times_accepts_number_and_string() {
    let a: MultiplyParams = serde_json::from_value(json!({ "times": 100 })).unwrap();
    let b: MultiplyParams = serde_json::from_value(json!({ "times": "100" })).unwrap();
    let c: MultiplyParams = serde_json::from_value(json!({ "times": 0.01 })).unwrap();
    assert_eq!(a.times, Decimal::from(100));
    assert_eq!(a, b);
    assert_eq!(c.times.to_string(), "0.01");
  }

  #[test]
  fn test_multiply_times_rejects_garbage() {
    let result: Result<MultiplyParams, _> = serde_json::from_value(json!({ "times": "lots" }));
    assert!(result.is_err());
  }

  #[test]
  fn test_http_method_defaults_to_get() {
    let params: HttpParams = serde_json::from_value(json!({ "url": "https://a.test" })).unwrap();
    assert_eq!(params.method, HttpMethod::Get);
    assert!(params.request_data.is_none());
  }
}
