use std::collections::{HashMap, HashSet};

use crate::spec::TaskSpec;

/// Graph structure for traversal and analysis.
///
/// Node order is the declaration order of the pipeline, which every
/// traversal below preserves.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Nodes in declaration order.
  order: Vec<String>,
  /// Adjacency list: dot_id -> list of downstream dot_ids.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: dot_id -> list of upstream dot_ids.
  reverse_adjacency: HashMap<String, Vec<String>>,
}

impl Graph {
  /// Build a graph from tasks, taking edges from each task's `inputs`.
  pub fn new(tasks: &[TaskSpec]) -> Self {
    let edges: Vec<(String, String)> = tasks
      .iter()
      .flat_map(|t| t.inputs.iter().map(|input| (input.clone(), t.dot_id.clone())))
      .collect();
    let order: Vec<String> = tasks.iter().map(|t| t.dot_id.clone()).collect();
    Self::from_edges(order, &edges)
  }

  /// Build a graph from an ordered node list and `(from, to)` edges.
  pub fn from_edges(order: Vec<String>, edges: &[(String, String)]) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for dot_id in &order {
      adjacency.entry(dot_id.clone()).or_default();
      reverse_adjacency.entry(dot_id.clone()).or_default();
    }

    for (from, to) in edges {
      adjacency.entry(from.clone()).or_default().push(to.clone());
      reverse_adjacency
        .entry(to.clone())
        .or_default()
        .push(from.clone());
    }

    Self {
      order,
      adjacency,
      reverse_adjacency,
    }
  }

  /// Nodes with no outgoing edges, in declaration order.
  pub fn sinks(&self) -> Vec<String> {
    self
      .order
      .iter()
      .filter(|id| self.downstream(id).is_empty())
      .cloned()
      .collect()
  }

  /// Get downstream nodes for a given node.
  pub fn downstream(&self, dot_id: &str) -> &[String] {
    self
      .adjacency
      .get(dot_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream nodes for a given node.
  pub fn upstream(&self, dot_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(dot_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Find an edge that closes a cycle, using DFS.
  ///
  /// Roots and neighbours are visited in declaration order so the reported
  /// edge is stable for a given description.
  pub fn find_cycle(&self) -> Option<(String, String)> {
    // 0 = white (unvisited), 1 = gray (in progress), 2 = black (done)
    let mut color: HashMap<&str, u8> = self.order.iter().map(|id| (id.as_str(), 0u8)).collect();

    fn dfs<'a>(
      node: &'a str,
      graph: &'a Graph,
      color: &mut HashMap<&'a str, u8>,
    ) -> Option<(String, String)> {
      color.insert(node, 1);

      for neighbor in graph.downstream(node) {
        match color.get(neighbor.as_str()) {
          Some(1) => return Some((node.to_string(), neighbor.clone())),
          Some(0) => {
            if let Some(edge) = dfs(neighbor.as_str(), graph, color) {
              return Some(edge);
            }
          }
          _ => {}
        }
      }

      color.insert(node, 2);
      None
    }

    for dot_id in &self.order {
      if color.get(dot_id.as_str()) == Some(&0) {
        if let Some(edge) = dfs(dot_id.as_str(), self, &mut color) {
          return Some(edge);
        }
      }
    }

    None
  }

  /// Group nodes into dependency layers.
  ///
  /// Every node in layer `k` depends only on nodes in layers `< k`. Within a
  /// layer nodes keep declaration order. Nodes on a cycle are never placed.
  pub fn layers(&self) -> Vec<Vec<String>> {
    let mut placed: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<&str> = self.order.iter().map(String::as_str).collect();
    let mut layers = Vec::new();

    while !remaining.is_empty() {
      let (ready, blocked): (Vec<&str>, Vec<&str>) = remaining.into_iter().partition(|id| {
        self
          .upstream(id)
          .iter()
          .all(|up| placed.contains(up.as_str()))
      });

      if ready.is_empty() {
        break;
      }

      placed.extend(ready.iter().copied());
      layers.push(ready.into_iter().map(str::to_string).collect());
      remaining = blocked;
    }

    layers
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn graph(order: &[&str], edges: &[(&str, &str)]) -> Graph {
    Graph::from_edges(
      order.iter().map(|s| s.to_string()).collect(),
      &edges
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect::<Vec<_>>(),
    )
  }

  #[test]
  fn test_layers_diamond() {
    let g = graph(
      &["a", "b", "c", "d"],
      &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
    );
    assert_eq!(
      g.layers(),
      vec![vec!["a".to_string()], vec!["b".into(), "c".into()], vec!["d".into()]]
    );
    assert_eq!(g.upstream("d"), &["b".to_string(), "c".to_string()]);
    assert_eq!(g.sinks(), vec!["d".to_string()]);
  }

  #[test]
  fn test_layers_follow_longest_path() {
    // c depends on a directly and through b, so it must wait for b
    let g = graph(&["c", "b", "a"], &[("a", "b"), ("b", "c"), ("a", "c")]);
    assert_eq!(
      g.layers(),
      vec![vec!["a".to_string()], vec!["b".into()], vec!["c".into()]]
    );
  }

  #[test]
  fn test_find_cycle_names_closing_edge() {
    let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
    assert_eq!(g.find_cycle(), Some(("c".to_string(), "a".to_string())));
  }

  #[test]
  fn test_self_loop_is_cycle() {
    let g = graph(&["a"], &[("a", "a")]);
    assert_eq!(g.find_cycle(), Some(("a".to_string(), "a".to_string())));
    assert!(g.layers().is_empty());
  }

  #[test]
  fn test_acyclic_has_no_cycle() {
    let g = graph(&["a", "b"], &[("a", "b")]);
    assert_eq!(g.find_cycle(), None);
    assert_eq!(g.sinks(), vec!["b".to_string()]);
  }
}
