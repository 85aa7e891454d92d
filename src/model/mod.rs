//! # Truss Graph Model
//!
//! Plain DTOs for the strut graph: nodes (hub points), edges (struts) and
//! triangles (3-cycles closed by three edges). These types cross every
//! stage boundary: store ↔ rigidity ↔ topology ↔ elongation ↔ export.
//!
//! Design rule: no simulator types, no store handles here.
//! This module is pure data: no I/O, no collaborator calls.

pub mod node;
pub mod edge;
pub mod triangle;
pub mod object;

use std::collections::BTreeMap;

use nalgebra::Point3;

pub use node::{Node, NodeId, Pod, PodId};
pub use edge::{Edge, EdgeId, LinkKind};
pub use triangle::{Triangle, TriangleId};
pub use object::{GraphEvent, ObjectRef};

/// Node positions keyed by node, e.g. a simulator sample of the structure.
pub type PositionSnapshot = BTreeMap<NodeId, Point3<f64>>;
