use std::collections::HashSet;

use tessera_config::{PipelineDef, TaskKind, TaskParams};

use crate::error::CompileError;
use crate::graph::Graph;
use crate::spec::{NodeKind, PipelineSpec, RESULT_DOT_ID, TaskSpec};

/// Compile a TOML description.
pub fn compile_toml(source: &str) -> Result<PipelineSpec, CompileError> {
  compile(tessera_config::from_toml_str(source)?)
}

/// Compile a description into an immutable [`PipelineSpec`].
///
/// This process:
/// 1. Checks ids are unique and not reserved
/// 2. Validates every `inputs` reference and per-type input arity
/// 3. Rejects cycles, naming the edge that closes one
/// 4. Derives successors and appends the `__result__` node fed by every sink
pub fn compile(def: PipelineDef) -> Result<PipelineSpec, CompileError> {
  if def.tasks.is_empty() {
    return Err(CompileError::Empty);
  }

  let mut dot_ids = HashSet::new();
  for task in &def.tasks {
    if task.id == RESULT_DOT_ID {
      return Err(CompileError::ReservedTaskId {
        dot_id: task.id.clone(),
      });
    }
    if !dot_ids.insert(task.id.as_str()) {
      return Err(CompileError::DuplicateTaskId {
        dot_id: task.id.clone(),
      });
    }
  }

  for task in &def.tasks {
    validate_inputs(&task.id, &task.params, &task.inputs, &dot_ids)?;
  }

  let order: Vec<String> = def.tasks.iter().map(|t| t.id.clone()).collect();
  let edges: Vec<(String, String)> = def
    .tasks
    .iter()
    .flat_map(|t| t.inputs.iter().map(|input| (input.clone(), t.id.clone())))
    .collect();
  let graph = Graph::from_edges(order, &edges);

  if let Some((from, to)) = graph.find_cycle() {
    return Err(CompileError::CycleDetected { from, to });
  }

  let result_positions = graph.sinks();

  let mut tasks: Vec<TaskSpec> = def
    .tasks
    .into_iter()
    .enumerate()
    .map(|(index, task)| {
      let mut successors = graph.downstream(&task.id).to_vec();
      if result_positions.contains(&task.id) {
        successors.push(RESULT_DOT_ID.to_string());
      }
      TaskSpec {
        dot_id: task.id,
        kind: NodeKind::Task(task.params),
        inputs: task.inputs,
        successors,
        index,
      }
    })
    .collect();

  tasks.push(TaskSpec {
    dot_id: RESULT_DOT_ID.to_string(),
    kind: NodeKind::Result,
    inputs: result_positions.clone(),
    successors: Vec::new(),
    index: tasks.len(),
  });

  Ok(PipelineSpec {
    name: def.name,
    tasks,
    result_positions,
  })
}

fn validate_inputs(
  task_id: &str,
  params: &TaskParams,
  inputs: &[String],
  dot_ids: &HashSet<&str>,
) -> Result<(), CompileError> {
  for input in inputs {
    if !dot_ids.contains(input.as_str()) {
      return Err(CompileError::UnknownInput {
        task_id: task_id.to_string(),
        input: input.clone(),
      });
    }
  }

  let arity_error = match params.kind() {
    TaskKind::JsonParse | TaskKind::Multiply if inputs.len() != 1 => Some(format!(
      "{} takes exactly one input, got {}",
      params.kind(),
      inputs.len()
    )),
    TaskKind::Median if inputs.is_empty() => Some("median needs at least one input".to_string()),
    _ => None,
  };

  match arity_error {
    Some(message) => Err(CompileError::InvalidTask {
      task_id: task_id.to_string(),
      message,
    }),
    None => Ok(()),
  }
}
