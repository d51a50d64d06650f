use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
  #[default]
  Get,
  Post,
  Put,
  Patch,
  Delete,
  Head,
}

impl HttpMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      HttpMethod::Get => "GET",
      HttpMethod::Post => "POST",
      HttpMethod::Put => "PUT",
      HttpMethod::Patch => "PATCH",
      HttpMethod::Delete => "DELETE",
      HttpMethod::Head => "HEAD",
    }
  }
}

impl fmt::Display for HttpMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The closed set of task types a description may declare.
///
/// The terminal result aggregator is not part of this set: it is added by the
/// compiler and cannot be declared directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
  Http,
  Bridge,
  #[serde(rename = "jsonparse")]
  JsonParse,
  Multiply,
  Median,
}

impl TaskKind {
  /// Keys shared by every task type.
  pub const COMMON_KEYS: &'static [&'static str] = &["id", "type", "inputs"];

  pub fn from_tag(tag: &str) -> Option<Self> {
    match tag {
      "http" => Some(TaskKind::Http),
      "bridge" => Some(TaskKind::Bridge),
      "jsonparse" => Some(TaskKind::JsonParse),
      "multiply" => Some(TaskKind::Multiply),
      "median" => Some(TaskKind::Median),
      _ => None,
    }
  }

  pub fn tag(&self) -> &'static str {
    match self {
      TaskKind::Http => "http",
      TaskKind::Bridge => "bridge",
      TaskKind::JsonParse => "jsonparse",
      TaskKind::Multiply => "multiply",
      TaskKind::Median => "median",
    }
  }

  /// Parameter keys understood by this task type, on top of [`Self::COMMON_KEYS`].
  pub fn param_keys(&self) -> &'static [&'static str] {
    match self {
      TaskKind::Http => &[
        "method",
        "url",
        "request_data",
        "timeout_ms",
        "allow_unrestricted_network_access",
      ],
      TaskKind::Bridge => &["name", "request_data", "timeout_ms"],
      TaskKind::JsonParse => &["path", "lax"],
      TaskKind::Multiply => &["times"],
      TaskKind::Median => &["allowed_faults"],
    }
  }

  pub fn accepts_key(&self, key: &str) -> bool {
    Self::COMMON_KEYS.contains(&key) || self.param_keys().contains(&key)
  }
}

impl fmt::Display for TaskKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.tag())
  }
}
