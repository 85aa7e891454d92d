//! Tagged references to graph objects and the events store mutations emit.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use super::{EdgeId, NodeId, PodId, TriangleId};

/// Any object owned by the store. Polymorphic only over what the store can
/// do to every kind: delete it, or ask the host to redraw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectRef {
    Node(NodeId),
    Edge(EdgeId),
    Triangle(TriangleId),
}

impl From<NodeId> for ObjectRef {
    fn from(id: NodeId) -> Self { ObjectRef::Node(id) }
}

impl From<EdgeId> for ObjectRef {
    fn from(id: EdgeId) -> Self { ObjectRef::Edge(id) }
}

impl From<TriangleId> for ObjectRef {
    fn from(id: TriangleId) -> Self { ObjectRef::Triangle(id) }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectRef::Node(id) => write!(f, "{id}"),
            ObjectRef::Edge(id) => write!(f, "{id}"),
            ObjectRef::Triangle(id) => write!(f, "{id}"),
        }
    }
}

/// What changed. Returned from store mutations so the host can update its
/// representation; nothing in the core subscribes to these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphEvent {
    NodeMoved { node: NodeId, from: Point3<f64>, to: Point3<f64> },
    EdgeStretched { edge: EdgeId, length: f64 },
    PodDeleted(PodId),
    Deleted(ObjectRef),
    Redraw(ObjectRef),
}
