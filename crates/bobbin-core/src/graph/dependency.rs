//! Dependency edges for one submission batch.
//!
//! Design:
//! - Forward edges: node -> nodes it depends on (waits for)
//! - Reverse edges: node -> nodes that depend on it (waiting nodes)
//! - Invariant: edges and reverse_edges must be kept in sync

use std::collections::{BTreeMap, BTreeSet};

use super::NodeRef;

/// Forward and reverse edges, kept in ordered maps so iteration (and the
/// cycle reported) is deterministic.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// node -> prerequisites
    edges: BTreeMap<NodeRef, BTreeSet<NodeRef>>,

    /// prerequisite -> dependents
    reverse_edges: BTreeMap<NodeRef, BTreeSet<NodeRef>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// `node` waits for `depends_on`.
    pub fn add_dependency(&mut self, node: NodeRef, depends_on: NodeRef) {
        self.edges.entry(node).or_default().insert(depends_on);
        self.reverse_edges
            .entry(depends_on)
            .or_default()
            .insert(node);
    }

    pub fn has_dependencies(&self, node: NodeRef) -> bool {
        self.edges.get(&node).is_some_and(|deps| !deps.is_empty())
    }

    pub fn dependencies_of(&self, node: NodeRef) -> Vec<NodeRef> {
        self.edges
            .get(&node)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Nodes waiting for `node`.
    pub fn dependents_of(&self, node: NodeRef) -> Vec<NodeRef> {
        self.reverse_edges
            .get(&node)
            .map(|waiting| waiting.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns the first cycle found (closed path, first node repeated at
    /// the end), or `None` if the graph is a DAG.
    ///
    /// Three-color DFS, O(V + E). Iterative so deep chains cannot overflow
    /// the stack.
    pub fn detect_cycle(&self) -> Option<Vec<NodeRef>> {
        let mut color: BTreeMap<NodeRef, Color> = BTreeMap::new();
        let color_of = |color: &BTreeMap<NodeRef, Color>, n: &NodeRef| {
            color.get(n).copied().unwrap_or(Color::White)
        };

        for &start in self.edges.keys() {
            if color_of(&color, &start) != Color::White {
                continue;
            }

            // (node, prerequisites still to visit)
            let mut stack: Vec<(NodeRef, Vec<NodeRef>)> = Vec::new();
            color.insert(start, Color::Gray);
            stack.push((start, self.dependencies_of(start)));

            while let Some((node, pending)) = stack.last_mut() {
                let node = *node;
                match pending.pop() {
                    Some(next) => match color_of(&color, &next) {
                        Color::White => {
                            color.insert(next, Color::Gray);
                            let deps = self.dependencies_of(next);
                            stack.push((next, deps));
                        }
                        Color::Gray => {
                            let pos = stack.iter().position(|(n, _)| *n == next)?;
                            let mut cycle: Vec<NodeRef> =
                                stack[pos..].iter().map(|(n, _)| *n).collect();
                            cycle.push(next);
                            return Some(cycle);
                        }
                        Color::Black => {}
                    },
                    None => {
                        color.insert(node, Color::Black);
                        stack.pop();
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(i: usize) -> NodeRef {
        NodeRef(i)
    }

    #[test]
    fn new_graph_is_empty() {
        let graph = DependencyGraph::new();
        assert!(!graph.has_dependencies(n(1)));
    }

    #[test]
    fn add_dependency_creates_both_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(n(2), n(1)); // 2 waits for 1

        assert!(graph.has_dependencies(n(2)));
        assert!(!graph.has_dependencies(n(1)));
        assert_eq!(graph.dependencies_of(n(2)), vec![n(1)]);
        assert_eq!(graph.dependents_of(n(1)), vec![n(2)]);
    }

    #[test]
    fn detect_simple_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(n(1), n(2));
        graph.add_dependency(n(2), n(1));

        let cycle = graph.detect_cycle().unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 3);
    }

    #[test]
    fn detect_self_dependency() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(n(1), n(1));
        assert_eq!(graph.detect_cycle(), Some(vec![n(1), n(1)]));
    }

    #[test]
    fn detect_longer_cycle() {
        let mut graph = DependencyGraph::new();
        // 1 <- 2 <- 3 <- 4 <- 2
        graph.add_dependency(n(2), n(1));
        graph.add_dependency(n(3), n(2));
        graph.add_dependency(n(4), n(3));
        graph.add_dependency(n(2), n(4));

        let cycle = graph.detect_cycle().unwrap();
        assert!(!cycle.contains(&n(1)));
        assert_eq!(cycle.len(), 4);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(n(2), n(1));
        graph.add_dependency(n(3), n(2));
        graph.add_dependency(n(3), n(1));
        assert!(graph.detect_cycle().is_none());
    }

    #[test]
    fn complex_dag_with_cross_edges() {
        //     1
        //    / \
        //   2   3
        //   |\ /|
        //   | X |
        //   |/ \|
        //   4   5
        let mut graph = DependencyGraph::new();
        graph.add_dependency(n(2), n(1));
        graph.add_dependency(n(3), n(1));
        graph.add_dependency(n(4), n(2));
        graph.add_dependency(n(5), n(2));
        graph.add_dependency(n(4), n(3));
        graph.add_dependency(n(5), n(3));
        assert!(graph.detect_cycle().is_none());
    }

    #[test]
    fn long_chain_does_not_overflow() {
        let mut graph = DependencyGraph::new();
        for i in 1..50_000 {
            graph.add_dependency(n(i), n(i - 1));
        }
        assert!(graph.detect_cycle().is_none());
    }
}
