//! Strict loading of pipeline descriptions.
//!
//! Descriptions are first read into an untyped JSON tree so that every key can
//! be checked against what its owner understands before typed deserialization
//! runs. Serde would otherwise silently drop unknown keys.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::enums::TaskKind;
use crate::error::ConfigError;
use crate::pipeline::PipelineDef;
use crate::task::{TaskDef, TaskParams};

/// Parse a TOML description.
pub fn from_toml_str(source: &str) -> Result<PipelineDef, ConfigError> {
  let value: toml::Value = toml::from_str(source).map_err(|e| ConfigError::Syntax {
    message: e.message().to_string(),
  })?;
  let value = serde_json::to_value(value).map_err(|e| ConfigError::Syntax {
    message: e.to_string(),
  })?;
  from_value(value)
}

/// Parse a JSON description.
pub fn from_json_str(source: &str) -> Result<PipelineDef, ConfigError> {
  let value: Value = serde_json::from_str(source).map_err(|e| ConfigError::Syntax {
    message: e.to_string(),
  })?;
  from_value(value)
}

/// Build a description from an untyped JSON tree, rejecting unknown keys.
pub fn from_value(value: Value) -> Result<PipelineDef, ConfigError> {
  let Value::Object(mut root) = value else {
    return Err(ConfigError::Shape {
      message: "description must be a table".to_string(),
    });
  };

  reject_unknown_keys(&root, |key| PipelineDef::KEYS.contains(&key))?;

  let name = match root.remove("name") {
    None => None,
    Some(Value::String(name)) => Some(name),
    Some(_) => {
      return Err(ConfigError::Shape {
        message: "name must be a string".to_string(),
      });
    }
  };

  let tasks = match root.remove("tasks") {
    None => Vec::new(),
    Some(Value::Array(tasks)) => tasks
      .into_iter()
      .enumerate()
      .map(|(index, task)| parse_task(index, task))
      .collect::<Result<Vec<_>, _>>()?,
    Some(_) => {
      return Err(ConfigError::Shape {
        message: "tasks must be an array of tables".to_string(),
      });
    }
  };

  Ok(PipelineDef { name, tasks })
}

fn parse_task(index: usize, value: Value) -> Result<TaskDef, ConfigError> {
  let Value::Object(mut fields) = value else {
    return Err(ConfigError::Shape {
      message: format!("tasks[{}] must be a table", index),
    });
  };

  let id = match fields.remove("id") {
    Some(Value::String(id)) if !id.trim().is_empty() => id,
    Some(_) => {
      return Err(ConfigError::Shape {
        message: format!("tasks[{}]: id must be a non-empty string", index),
      });
    }
    None => {
      return Err(ConfigError::MissingKey {
        task_id: format!("tasks[{}]", index),
        key: "id".to_string(),
      });
    }
  };

  let tag = match fields.remove("type") {
    Some(Value::String(tag)) => tag,
    Some(other) => {
      return Err(ConfigError::UnknownTaskType {
        task_id: id,
        tag: other.to_string(),
      });
    }
    None => {
      return Err(ConfigError::MissingKey {
        task_id: id,
        key: "type".to_string(),
      });
    }
  };

  let kind = TaskKind::from_tag(&tag).ok_or_else(|| ConfigError::UnknownTaskType {
    task_id: id.clone(),
    tag: tag.clone(),
  })?;

  reject_unknown_keys(&fields, |key| kind.accepts_key(key))?;

  let inputs = match fields.remove("inputs") {
    None => Vec::new(),
    Some(value) => {
      serde_json::from_value::<Vec<String>>(value).map_err(|_| ConfigError::InvalidParams {
        task_id: id.clone(),
        message: "inputs must be a list of task ids".to_string(),
      })?
    }
  };

  let params = match kind {
    TaskKind::Http => TaskParams::Http(typed_params(&id, kind, fields)?),
    TaskKind::Bridge => TaskParams::Bridge(typed_params(&id, kind, fields)?),
    TaskKind::JsonParse => TaskParams::JsonParse(typed_params(&id, kind, fields)?),
    TaskKind::Multiply => TaskParams::Multiply(typed_params(&id, kind, fields)?),
    TaskKind::Median => TaskParams::Median(typed_params(&id, kind, fields)?),
  };

  Ok(TaskDef { id, inputs, params })
}

fn reject_unknown_keys(
  fields: &Map<String, Value>,
  accepts: impl Fn(&str) -> bool,
) -> Result<(), ConfigError> {
  match fields.keys().find(|key| !accepts(key)) {
    Some(key) => Err(ConfigError::UnrecognisedKey { key: key.clone() }),
    None => Ok(()),
  }
}

fn typed_params<T: DeserializeOwned>(
  task_id: &str,
  kind: TaskKind,
  fields: Map<String, Value>,
) -> Result<T, ConfigError> {
  // Required keys are reported by name rather than through serde's wording.
  for key in required_keys(kind) {
    if !fields.contains_key(*key) {
      return Err(ConfigError::MissingKey {
        task_id: task_id.to_string(),
        key: key.to_string(),
      });
    }
  }

  serde_json::from_value(Value::Object(fields)).map_err(|e| ConfigError::InvalidParams {
    task_id: task_id.to_string(),
    message: e.to_string(),
  })
}

fn required_keys(kind: TaskKind) -> &'static [&'static str] {
  match kind {
    TaskKind::Http => &["url"],
    TaskKind::Bridge => &["name"],
    TaskKind::JsonParse => &["path"],
    TaskKind::Multiply => &["times"],
    TaskKind::Median => &[],
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::enums::HttpMethod;
  use rust_decimal::Decimal;

  const ETH_USD: &str = r#"
name = "eth-usd"

[[tasks]]
id = "ds1"
type = "http"
method = "GET"
url = "https://example.com/price"
timeout_ms = 5000

[[tasks]]
id = "ds1_parse"
type = "jsonparse"
inputs = ["ds1"]
path = ["data", "result"]

[[tasks]]
id = "ds1_multiply"
type = "multiply"
inputs = ["ds1_parse"]
times = "100"
"#;

  #[test]
  fn test_parse_toml_description() {
    let def = from_toml_str(ETH_USD).unwrap();

    assert_eq!(def.name.as_deref(), Some("eth-usd"));
    assert_eq!(def.tasks.len(), 3);

    match &def.tasks[0].params {
      TaskParams::Http(http) => {
        assert_eq!(http.method, HttpMethod::Get);
        assert_eq!(http.url, "https://example.com/price");
        assert_eq!(http.timeout_ms, Some(5000));
      }
      other => panic!("expected http params, got {:?}", other),
    }

    assert_eq!(def.tasks[1].inputs, vec!["ds1".to_string()]);
    match &def.tasks[2].params {
      TaskParams::Multiply(m) => assert_eq!(m.times, Decimal::from(100)),
      other => panic!("expected multiply params, got {:?}", other),
    }
  }

  #[test]
  fn test_parse_json_description() {
    let def = from_json_str(
      r#"{"tasks":[{"id":"a","type":"median","inputs":["x","y"],"allowed_faults":1}]}"#,
    )
    .unwrap();

    assert!(def.name.is_none());
    match &def.tasks[0].params {
      TaskParams::Median(m) => assert_eq!(m.allowed_faults, Some(1)),
      other => panic!("expected median params, got {:?}", other),
    }
  }

  #[test]
  fn test_unrecognised_job_key() {
    let source = format!("isBootstrapNode = false\n{}", ETH_USD);
    let err = from_toml_str(&source).unwrap_err();
    assert_eq!(err.to_string(), "unrecognised key: isBootstrapNode");
  }

  #[test]
  fn test_unrecognised_task_key() {
    let err = from_toml_str(
      r#"
[[tasks]]
id = "m"
type = "multiply"
times = 10
factor = 2
"#,
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "unrecognised key: factor");
  }

  #[test]
  fn test_key_valid_for_other_type_is_rejected() {
    // `times` belongs to multiply, not http
    let err = from_toml_str(
      r#"
[[tasks]]
id = "fetch"
type = "http"
url = "https://example.com"
times = 10
"#,
    )
    .unwrap_err();
    assert_eq!(err, ConfigError::UnrecognisedKey { key: "times".into() });
  }

  #[test]
  fn test_unknown_task_type() {
    let err = from_json_str(r#"{"tasks":[{"id":"a","type":"ethtx"}]}"#).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownTaskType { ref tag, .. } if tag == "ethtx"));
  }

  #[test]
  fn test_missing_required_param() {
    let err = from_json_str(r#"{"tasks":[{"id":"p","type":"jsonparse"}]}"#).unwrap_err();
    assert_eq!(
      err,
      ConfigError::MissingKey {
        task_id: "p".into(),
        key: "path".into()
      }
    );
  }

  #[test]
  fn test_invalid_decimal_param() {
    let err =
      from_json_str(r#"{"tasks":[{"id":"m","type":"multiply","times":"ten"}]}"#).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidParams { ref task_id, .. } if task_id == "m"));
  }

  #[test]
  fn test_syntax_error() {
    let err = from_toml_str("[[tasks]\nid = ").unwrap_err();
    assert!(matches!(err, ConfigError::Syntax { .. }));
  }

  #[test]
  fn test_task_def_serde_roundtrip_keeps_type_tag() {
    let def = from_toml_str(ETH_USD).unwrap();
    let json = serde_json::to_value(&def.tasks[1]).unwrap();
    assert_eq!(json["type"], "jsonparse");
    let back: TaskDef = serde_json::from_value(json).unwrap();
    assert_eq!(back, def.tasks[1]);
  }
}
