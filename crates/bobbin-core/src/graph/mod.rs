//! Dependency Graph Builder.
//!
//! A `WorkGraph` is a validated, acyclic batch of task specs with edges
//! expressed as `NodeRef`s (positions in the batch). The scheduler turns it
//! into records: roots start Enqueued, every other node starts Blocked.

pub mod builder;
pub mod dependency;

use std::fmt;

pub use builder::{GraphBuilder, GraphNode, WorkGraph};
pub use dependency::DependencyGraph;

/// Position of a node inside one submission batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(pub(crate) usize);

impl NodeRef {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("dependency cycle: {}", display_path(.0))]
    Cycle(Vec<NodeRef>),

    #[error("node {0} is not part of this batch")]
    UnknownNode(NodeRef),

    #[error("node {0} cannot depend on itself")]
    SelfDependency(NodeRef),
}

fn display_path(path: &[NodeRef]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
