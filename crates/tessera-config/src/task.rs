use serde::{Deserialize, Serialize};

use crate::enums::TaskKind;
use crate::params::{BridgeParams, HttpParams, JsonParseParams, MedianParams, MultiplyParams};

/// One declared task of a pipeline description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDef {
  /// Unique identifier within the pipeline (the "dot id").
  pub id: String,
  /// Upstream task ids, in the order their outputs are consumed.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub inputs: Vec<String>,
  #[serde(flatten)]
  pub params: TaskParams,
}

impl TaskDef {
  pub fn kind(&self) -> TaskKind {
    self.params.kind()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskParams {
  Http(HttpParams),
  Bridge(BridgeParams),
  #[serde(rename = "jsonparse")]
  JsonParse(JsonParseParams),
  Multiply(MultiplyParams),
  Median(MedianParams),
}

impl TaskParams {
  pub fn kind(&self) -> TaskKind {
    match self {
      TaskParams::Http(_) => TaskKind::Http,
      TaskParams::Bridge(_) => TaskKind::Bridge,
      TaskParams::JsonParse(_) => TaskKind::JsonParse,
      TaskParams::Multiply(_) => TaskKind::Multiply,
      TaskParams::Median(_) => TaskKind::Median,
    }
  }
}
