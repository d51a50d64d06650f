use serde::{Deserialize, Serialize};

use crate::task::TaskDef;

/// A pipeline description as written by an operator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineDef {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default)]
  pub tasks: Vec<TaskDef>,
}

impl PipelineDef {
  /// Keys accepted at the top level of a description.
  pub const KEYS: &'static [&'static str] = &["name", "tasks"];
}
