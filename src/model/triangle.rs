//! Triangle (closed 3-cycle) in the truss graph.

use serde::{Deserialize, Serialize};

use super::NodeId;

/// Opaque triangle identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TriangleId(pub u64);

impl std::fmt::Display for TriangleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Three nodes. Edges are derived through the store, so a triangle whose
/// edge was deleted stays around as "incomplete".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triangle {
    pub id: TriangleId,
    pub nodes: [NodeId; 3],
}

impl Triangle {
    pub fn new(id: TriangleId, nodes: [NodeId; 3]) -> Self {
        Self { id, nodes }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// The three unordered node pairs, one per side.
    pub fn sides(&self) -> [(NodeId, NodeId); 3] {
        let [a, b, c] = self.nodes;
        [(a, b), (b, c), (a, c)]
    }

    /// The corner not on the given side.
    pub fn opposite(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        self.nodes.iter().copied().find(|n| *n != a && *n != b)
    }
}
