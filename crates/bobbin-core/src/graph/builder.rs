//! Graph construction: chains, fan-ins and general DAGs.

use crate::domain::errors::ValidationError;
use crate::domain::task::TaskSpec;

use super::dependency::DependencyGraph;
use super::{GraphError, NodeRef};

/// One node of a validated graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub spec: TaskSpec,
    pub depends_on: Vec<NodeRef>,
}

/// Validated, acyclic batch of specs. Node order is submission order.
#[derive(Debug, Clone)]
pub struct WorkGraph {
    nodes: Vec<GraphNode>,
}

impl WorkGraph {
    /// Graph with one node and no edges.
    pub fn single(spec: TaskSpec) -> Self {
        Self {
            nodes: vec![GraphNode {
                spec,
                depends_on: Vec::new(),
            }],
        }
    }

    /// Linear chain: each spec depends on its immediate predecessor.
    pub fn chain(specs: impl IntoIterator<Item = TaskSpec>) -> Result<Self, ValidationError> {
        let nodes: Vec<GraphNode> = specs
            .into_iter()
            .enumerate()
            .map(|(i, spec)| GraphNode {
                spec,
                depends_on: if i == 0 { Vec::new() } else { vec![NodeRef(i - 1)] },
            })
            .collect();
        if nodes.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        Ok(Self { nodes })
    }

    /// Parallel specs joined by one spec that depends on all of them.
    pub fn fan_in(
        parallel: impl IntoIterator<Item = TaskSpec>,
        join: TaskSpec,
    ) -> Result<Self, ValidationError> {
        let mut nodes: Vec<GraphNode> = parallel
            .into_iter()
            .map(|spec| GraphNode {
                spec,
                depends_on: Vec::new(),
            })
            .collect();
        if nodes.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        let depends_on = (0..nodes.len()).map(NodeRef).collect();
        nodes.push(GraphNode {
            spec: join,
            depends_on,
        });
        Ok(Self { nodes })
    }

    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn specs(&self) -> impl Iterator<Item = &TaskSpec> {
        self.nodes.iter().map(|n| &n.spec)
    }

    pub fn into_nodes(self) -> Vec<GraphNode> {
        self.nodes
    }
}

/// Incremental DAG builder.
///
/// ```
/// use bobbin_core::domain::TaskSpec;
/// use bobbin_core::graph::GraphBuilder;
///
/// let mut b = GraphBuilder::new();
/// let fetch = b.add(TaskSpec::new("fetch"));
/// let resize = b.add(TaskSpec::new("resize"));
/// let upload = b.add(TaskSpec::new("upload"));
/// b.after(resize, fetch).unwrap();
/// b.after(upload, resize).unwrap();
/// let graph = b.build().unwrap();
/// assert_eq!(graph.len(), 3);
/// ```
#[derive(Debug, Default)]
pub struct GraphBuilder {
    specs: Vec<TaskSpec>,
    deps: DependencyGraph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, spec: TaskSpec) -> NodeRef {
        self.specs.push(spec);
        NodeRef(self.specs.len() - 1)
    }

    /// `node` runs only after `prerequisite` succeeded.
    pub fn after(&mut self, node: NodeRef, prerequisite: NodeRef) -> Result<&mut Self, GraphError> {
        self.check(node)?;
        self.check(prerequisite)?;
        if node == prerequisite {
            return Err(GraphError::SelfDependency(node));
        }
        self.deps.add_dependency(node, prerequisite);
        Ok(self)
    }

    /// `node` runs only after every node in `prerequisites` succeeded.
    pub fn after_all(
        &mut self,
        node: NodeRef,
        prerequisites: impl IntoIterator<Item = NodeRef>,
    ) -> Result<&mut Self, GraphError> {
        for p in prerequisites {
            self.after(node, p)?;
        }
        Ok(self)
    }

    /// Rejects cycles. An empty builder yields an empty graph; submitting
    /// it is a validation error.
    pub fn build(self) -> Result<WorkGraph, GraphError> {
        if let Some(cycle) = self.deps.detect_cycle() {
            return Err(GraphError::Cycle(cycle));
        }
        let deps = self.deps;
        let nodes = self
            .specs
            .into_iter()
            .enumerate()
            .map(|(i, spec)| GraphNode {
                spec,
                depends_on: deps.dependencies_of(NodeRef(i)),
            })
            .collect();
        Ok(WorkGraph { nodes })
    }

    fn check(&self, node: NodeRef) -> Result<(), GraphError> {
        if node.0 < self.specs.len() {
            Ok(())
        } else {
            Err(GraphError::UnknownNode(node))
        }
    }
}
