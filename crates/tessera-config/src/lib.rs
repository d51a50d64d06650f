//! Tessera Config
//!
//! This crate contains the serializable pipeline description types for tessera.
//! These types represent a task graph before it is compiled into an immutable
//! `PipelineSpec` by `tessera-pipeline`.
//!
//! Descriptions can be loaded from:
//! - TOML documents (the admin API and the CLI)
//! - JSON documents
//!
//! Parsing is strict: every key at the job level and on every task is checked
//! against the keys its task type understands, and an unknown key fails with
//! `unrecognised key: <name>` instead of being ignored.

mod enums;
mod error;
mod params;
mod parse;
mod pipeline;
mod task;

pub use enums::{HttpMethod, TaskKind};
pub use error::ConfigError;
pub use params::{BridgeParams, HttpParams, JsonParseParams, JsonPath, MedianParams, MultiplyParams};
pub use parse::{from_json_str, from_toml_str, from_value};
pub use pipeline::PipelineDef;
pub use task::{TaskDef, TaskParams};
