use serde::{Deserialize, Serialize};
use tessera_config::TaskParams;

use crate::graph::Graph;

/// Dot id of the implicit terminal node that collects the pipeline's results.
pub const RESULT_DOT_ID: &str = "__result__";

/// What a compiled node executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum NodeKind {
  /// A declared task.
  Task(TaskParams),
  /// The terminal result aggregator.
  Result,
}

/// A node of a compiled pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
  pub dot_id: String,
  pub kind: NodeKind,
  /// Upstream dot ids, in declared order.
  pub inputs: Vec<String>,
  /// Downstream dot ids, derived at compile time.
  pub successors: Vec<String>,
  /// Position in declaration order. The result node is always last.
  pub index: usize,
}

impl TaskSpec {
  /// Type tag as it appears in descriptions and persisted rows.
  pub fn task_type(&self) -> &'static str {
    match &self.kind {
      NodeKind::Task(params) => params.kind().tag(),
      NodeKind::Result => "result",
    }
  }
}

/// A compiled pipeline ready for execution.
///
/// Immutable once built by [`crate::compile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
  pub name: Option<String>,
  /// Tasks in declaration order, followed by the result node.
  pub tasks: Vec<TaskSpec>,
  /// Dot ids feeding the result node, in result order.
  pub result_positions: Vec<String>,
}

impl PipelineSpec {
  /// Build the graph structure for traversal.
  pub fn graph(&self) -> Graph {
    Graph::new(&self.tasks)
  }

  /// Get a task by dot id.
  pub fn get_task(&self, dot_id: &str) -> Option<&TaskSpec> {
    self.tasks.iter().find(|t| t.dot_id == dot_id)
  }

  /// Successive sets of dot ids, each depending only on earlier sets.
  pub fn topological_layers(&self) -> Vec<Vec<String>> {
    self.graph().layers()
  }
}
