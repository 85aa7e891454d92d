//! Edge (strut) in the truss graph.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{NodeId, TriangleId};

/// Opaque edge identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// What kind of link the strut is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Rigid,
    Actuator,
    Spring,
    Generic,
}

impl LinkKind {
    /// Actuators and springs change length at runtime.
    pub fn is_dynamic(self) -> bool {
        matches!(self, LinkKind::Actuator | LinkKind::Spring)
    }
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LinkKind::Rigid => "rigid",
            LinkKind::Actuator => "actuator",
            LinkKind::Spring => "spring",
            LinkKind::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// A strut between two nodes.
///
/// The strut body has a frozen length; whatever is left of the node-to-node
/// distance is reserved clearance ("elongation") split between both ends by
/// `elongation_ratio`. The store re-derives both elongations whenever an
/// endpoint moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub first: NodeId,
    pub second: NodeId,
    pub kind: LinkKind,
    pub(crate) body_length: f64,
    pub(crate) elongation_ratio: f64,
    pub(crate) first_elongation: f64,
    pub(crate) second_elongation: f64,
    pub(crate) triangles: SmallVec<[TriangleId; 4]>,
}

impl Edge {
    /// New edge of the given current length with `floor` reserved at both ends.
    pub fn new(id: EdgeId, first: NodeId, second: NodeId, kind: LinkKind, length: f64, floor: f64) -> Self {
        let mut edge = Self {
            id,
            first,
            second,
            kind,
            body_length: 0.0,
            elongation_ratio: 0.5,
            first_elongation: 0.0,
            second_elongation: 0.0,
            triangles: SmallVec::new(),
        };
        edge.reset_elongation(length, floor);
        edge
    }

    pub fn nodes(&self) -> [NodeId; 2] {
        [self.first, self.second]
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind.is_dynamic()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.first == node || self.second == node
    }

    pub fn is_first_node(&self, node: NodeId) -> bool {
        self.first == node
    }

    /// The "other" end of the edge from the given node.
    pub fn other_node(&self, from: NodeId) -> Option<NodeId> {
        if from == self.first { Some(self.second) }
        else if from == self.second { Some(self.first) }
        else { None }
    }

    /// The node both edges meet at, if any.
    pub fn shared_node(&self, other: &Edge) -> Option<NodeId> {
        if other.contains(self.first) { Some(self.first) }
        else if other.contains(self.second) { Some(self.second) }
        else { None }
    }

    pub fn adjacent_triangles(&self) -> &[TriangleId] {
        &self.triangles
    }

    pub fn body_length(&self) -> f64 {
        self.body_length
    }

    pub fn elongation_ratio(&self) -> f64 {
        self.elongation_ratio
    }

    pub fn first_elongation(&self) -> f64 {
        self.first_elongation
    }

    pub fn second_elongation(&self) -> f64 {
        self.second_elongation
    }

    pub fn total_elongation(&self) -> f64 {
        self.first_elongation + self.second_elongation
    }

    /// Reserved clearance at the end touching `node`.
    pub fn elongation_at(&self, node: NodeId) -> Option<f64> {
        if node == self.first { Some(self.first_elongation) }
        else if node == self.second { Some(self.second_elongation) }
        else { None }
    }

    /// Re-freeze the body so that both ends reserve exactly `floor`.
    pub fn reset_elongation(&mut self, length: f64, floor: f64) {
        self.body_length = (length - 2.0 * floor).max(0.0);
        self.elongation_ratio = 0.5;
        self.sync_elongations(length);
    }

    /// Re-freeze the body around explicit per-end elongations.
    pub(crate) fn set_elongations(&mut self, length: f64, first: f64, second: f64) {
        let total = first + second;
        self.body_length = (length - total).max(0.0);
        self.elongation_ratio = if total > 0.0 { first / total } else { 0.5 };
        self.sync_elongations(length);
    }

    pub(crate) fn set_elongation_ratio(&mut self, ratio: f64, length: f64) {
        self.elongation_ratio = ratio.clamp(0.0, 1.0);
        self.sync_elongations(length);
    }

    pub(crate) fn sync_elongations(&mut self, length: f64) {
        let total = (length - self.body_length).max(0.0);
        self.first_elongation = total * self.elongation_ratio;
        self.second_elongation = total - self.first_elongation;
    }
}
