//! Tessera Pipeline
//!
//! This crate provides the compiled pipeline representation for tessera.
//! A [`PipelineSpec`] is the validated, immutable form of a pipeline
//! description that is ready for execution.
//!
//! Key differences from `tessera-config`:
//! - Every `inputs` reference resolves and the graph is acyclic
//! - Successor lists are derived
//! - The terminal `__result__` node is appended, fed by every sink task
//! - Tasks can be grouped into topological layers for scheduling

mod compile;
mod error;
mod graph;
mod spec;

pub use compile::{compile, compile_toml};
pub use error::CompileError;
pub use graph::Graph;
pub use spec::{NodeKind, PipelineSpec, RESULT_DOT_ID, TaskSpec};
