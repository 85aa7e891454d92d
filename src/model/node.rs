//! Node (hub point) in the truss graph.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{EdgeId, TriangleId};

/// Opaque node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Opaque pod identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PodId(pub u64);

impl std::fmt::Display for PodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// A payload attachment point mounted on a node (a foot, a seat mount, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub id: PodId,
    pub node: NodeId,
    /// Mounting direction away from the hub centre.
    pub direction: Vector3<f64>,
}

/// A hub point of the structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Point3<f64>,
    /// Fixed nodes are never relocated by relaxation.
    pub fixed: bool,
    pub(crate) incidents: SmallVec<[EdgeId; 8]>,
    pub(crate) triangles: SmallVec<[TriangleId; 8]>,
    pub(crate) pods: Vec<Pod>,
}

impl Node {
    pub fn new(id: NodeId, position: Point3<f64>) -> Self {
        Self {
            id,
            position,
            fixed: false,
            incidents: SmallVec::new(),
            triangles: SmallVec::new(),
            pods: Vec::new(),
        }
    }

    /// Edges meeting at this node, in creation order.
    pub fn incidents(&self) -> &[EdgeId] {
        &self.incidents
    }

    /// Triangles this node is a corner of.
    pub fn adjacent_triangles(&self) -> &[TriangleId] {
        &self.triangles
    }

    pub fn pods(&self) -> &[Pod] {
        &self.pods
    }

    pub fn has_pods(&self) -> bool {
        !self.pods.is_empty()
    }

    pub fn distance(&self, point: &Point3<f64>) -> f64 {
        nalgebra::distance(&self.position, point)
    }
}
