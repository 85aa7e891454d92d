//! # Graph Store
//!
//! Owns every node, edge, triangle and pod of a truss structure.
//!
//! - Nodes closer than the merge tolerance collapse into one.
//! - Edges are deduplicated by their unordered endpoint pair.
//! - Triangles are deduplicated by their node set and appear on their own
//!   whenever a new edge closes a 3-cycle.
//!
//! Collections are `BTreeMap`s keyed by monotonically increasing ids, so
//! every scan runs in creation order and every stage is reproducible.
//!
//! ## Limitations
//!
//! - **Linear nearest-neighbour scans**: `closest_*` and node merging walk the
//!   whole collection. Fine for structures of a few hundred elements.
//! - **Single owner**: there is no interior locking. Each pipeline stage
//!   takes `&mut TrussGraph` for its whole duration.
//! - **No observers**: mutations return a `Vec<GraphEvent>` for the host to
//!   apply; nothing in the store reacts to anything implicitly.

pub mod record;

use std::collections::BTreeMap;

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use smallvec::SmallVec;
use tracing::debug;

use crate::config::Presets;
use crate::geometry::{self, DEGENERATE_EPS};
use crate::model::*;
use crate::{Error, Result};

pub use record::{EdgeRecord, GraphRecord, NodeRecord, PodRecord};

fn edge_key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b { (a, b) } else { (b, a) }
}

fn triangle_key(a: NodeId, b: NodeId, c: NodeId) -> [NodeId; 3] {
    let mut key = [a, b, c];
    key.sort();
    key
}

// ============================================================================
// TrussGraph
// ============================================================================

/// The strut graph of one structure.
#[derive(Debug, Clone)]
pub struct TrussGraph {
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
    triangles: BTreeMap<TriangleId, Triangle>,
    /// sorted endpoint pair → edge
    edge_index: HashMap<(NodeId, NodeId), EdgeId>,
    /// sorted node triple → triangle
    triangle_index: HashMap<[NodeId; 3], TriangleId>,
    next_node_id: u64,
    next_edge_id: u64,
    next_triangle_id: u64,
    next_pod_id: u64,
    merge_tolerance: f64,
    minimum_elongation: f64,
}

impl Default for TrussGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TrussGraph {
    pub fn new() -> Self {
        Self::with_presets(&Presets::default())
    }

    pub fn with_presets(presets: &Presets) -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            triangles: BTreeMap::new(),
            edge_index: HashMap::new(),
            triangle_index: HashMap::new(),
            next_node_id: 1,
            next_edge_id: 1,
            next_triangle_id: 1,
            next_pod_id: 1,
            merge_tolerance: presets.merge_tolerance,
            minimum_elongation: presets.minimum_elongation,
        }
    }

    pub fn merge_tolerance(&self) -> f64 {
        self.merge_tolerance
    }

    pub fn minimum_elongation(&self) -> f64 {
        self.minimum_elongation
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Drop everything. Id counters keep running so stale ids never alias.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.triangles.clear();
        self.edge_index.clear();
        self.triangle_index.clear();
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Return the node within merge tolerance of `position`, or insert one.
    pub fn create_node(&mut self, position: Point3<f64>) -> NodeId {
        if let Some(id) = self.find_close_node(&position, self.merge_tolerance) {
            return id;
        }
        self.insert_node(position)
    }

    /// Insert a node without merging, even next to an existing one.
    pub fn insert_node(&mut self, position: Point3<f64>) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        self.nodes.insert(id, Node::new(id, position));
        id
    }

    /// First node (in creation order) within `tolerance` of `position`.
    pub fn find_close_node(&self, position: &Point3<f64>, tolerance: f64) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|n| n.distance(position) <= tolerance)
            .map(|n| n.id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn require_node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn position(&self, id: NodeId) -> Result<Point3<f64>> {
        Ok(self.require_node(id)?.position)
    }

    /// Current position of every node.
    pub fn positions(&self) -> PositionSnapshot {
        self.nodes.iter().map(|(id, n)| (*id, n.position)).collect()
    }

    pub fn set_fixed(&mut self, id: NodeId, fixed: bool) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))?;
        node.fixed = fixed;
        Ok(())
    }

    /// Nodes joined to `id` by an edge, in edge creation order.
    pub fn adjacent_nodes(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(&id) else { return Vec::new() };
        node.incidents
            .iter()
            .filter_map(|e| self.edges.get(e))
            .filter_map(|e| e.other_node(id))
            .collect()
    }

    /// Relocate a node. Incident edges keep their body length, so their
    /// elongations absorb the change.
    pub fn move_node(&mut self, id: NodeId, position: Point3<f64>) -> Result<Vec<GraphEvent>> {
        let node = self.nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))?;
        let from = node.position;
        node.position = position;
        let incidents = node.incidents.clone();

        let mut events = vec![GraphEvent::NodeMoved { node: id, from, to: position }];
        for edge_id in incidents {
            let length = self.edge_length(edge_id)?;
            if let Some(edge) = self.edges.get_mut(&edge_id) {
                edge.sync_elongations(length);
                events.push(GraphEvent::EdgeStretched { edge: edge_id, length });
            }
        }
        Ok(events)
    }

    // ========================================================================
    // Pods
    // ========================================================================

    pub fn add_pod(&mut self, node: NodeId, direction: Vector3<f64>) -> Result<PodId> {
        let id = PodId(self.next_pod_id);
        let target = self.nodes.get_mut(&node).ok_or_else(|| Error::NotFound(format!("Node {node}")))?;
        self.next_pod_id += 1;
        target.pods.push(Pod { id, node, direction });
        Ok(id)
    }

    pub fn delete_pod(&mut self, id: PodId) -> bool {
        for node in self.nodes.values_mut() {
            if let Some(idx) = node.pods.iter().position(|p| p.id == id) {
                node.pods.remove(idx);
                return true;
            }
        }
        false
    }

    pub fn pods(&self) -> impl Iterator<Item = &Pod> {
        self.nodes.values().flat_map(|n| n.pods.iter())
    }

    // ========================================================================
    // Edges
    // ========================================================================

    /// Return the edge between `n1` and `n2`, or create it. A new edge closes
    /// a triangle with every node adjacent to both endpoints.
    pub fn create_edge(&mut self, n1: NodeId, n2: NodeId, kind: LinkKind) -> Result<EdgeId> {
        if n1 == n2 {
            return Err(Error::InvalidEdge(format!("edge from {n1} to itself")));
        }
        let length = nalgebra::distance(&self.position(n1)?, &self.position(n2)?);
        if let Some(id) = self.find_edge(n1, n2) {
            return Ok(id);
        }

        let id = EdgeId(self.next_edge_id);
        self.next_edge_id += 1;
        self.edges.insert(id, Edge::new(id, n1, n2, kind, length, self.minimum_elongation));
        self.edge_index.insert(edge_key(n1, n2), id);
        for n in [n1, n2] {
            if let Some(node) = self.nodes.get_mut(&n) {
                node.incidents.push(id);
            }
        }

        // triangles that existed before their side did
        let waiting: Vec<TriangleId> = self.nodes[&n1]
            .triangles
            .iter()
            .copied()
            .filter(|t| self.triangles.get(t).is_some_and(|tri| tri.contains(n2)))
            .collect();
        for t in waiting {
            self.attach_triangle_edges(t);
        }

        self.create_possible_triangles(id)?;
        Ok(id)
    }

    pub fn create_edge_from_points(
        &mut self,
        first: Point3<f64>,
        second: Point3<f64>,
        kind: LinkKind,
    ) -> Result<EdgeId> {
        let n1 = self.create_node(first);
        let n2 = self.create_node(second);
        self.create_edge(n1, n2, kind)
    }

    fn create_possible_triangles(&mut self, edge: EdgeId) -> Result<()> {
        let (n1, n2) = {
            let e = &self.edges[&edge];
            (e.first, e.second)
        };
        let second_neighbours = self.adjacent_nodes(n2);
        let common: Vec<NodeId> = self
            .adjacent_nodes(n1)
            .into_iter()
            .filter(|n| *n != n2 && second_neighbours.contains(n))
            .collect();
        for other in common {
            let t = self.create_triangle(n1, n2, other)?;
            debug!(edge = %edge, triangle = %t, "edge closed triangle");
        }
        Ok(())
    }

    pub fn find_edge(&self, a: NodeId, b: NodeId) -> Option<EdgeId> {
        self.edge_index.get(&edge_key(a, b)).copied()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn require_edge(&self, id: EdgeId) -> Result<&Edge> {
        self.edges.get(&id).ok_or_else(|| Error::NotFound(format!("Edge {id}")))
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges.keys().copied().collect()
    }

    pub fn edge_length(&self, id: EdgeId) -> Result<f64> {
        let e = self.require_edge(id)?;
        Ok(nalgebra::distance(&self.position(e.first)?, &self.position(e.second)?))
    }

    pub fn edge_midpoint(&self, id: EdgeId) -> Result<Point3<f64>> {
        let e = self.require_edge(id)?;
        Ok(nalgebra::center(&self.position(e.first)?, &self.position(e.second)?))
    }

    /// Unit direction of the edge pointing away from `node`.
    pub fn edge_direction_from(&self, id: EdgeId, node: NodeId) -> Result<Vector3<f64>> {
        let e = self.require_edge(id)?;
        let other = e
            .other_node(node)
            .ok_or(Error::NotIncident { node, edge: id })?;
        let v = self.position(other)? - self.position(node)?;
        if v.norm() <= DEGENERATE_EPS {
            return Err(Error::DegeneratePose(format!("edge {id} has zero length")));
        }
        Ok(v.normalize())
    }

    pub fn set_elongation_ratio(&mut self, id: EdgeId, ratio: f64) -> Result<()> {
        let length = self.edge_length(id)?;
        let edge = self.edges.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Edge {id}")))?;
        edge.set_elongation_ratio(ratio, length);
        Ok(())
    }

    /// Reserve exactly `first`/`second` at the ends, re-freezing the body.
    pub fn set_elongations(&mut self, id: EdgeId, first: f64, second: f64) -> Result<()> {
        let length = self.edge_length(id)?;
        let edge = self.edges.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Edge {id}")))?;
        edge.set_elongations(length, first, second);
        Ok(())
    }

    /// Put every edge back to the minimum elongation at both ends.
    pub fn reset_elongations(&mut self) -> Result<()> {
        for id in self.edge_ids() {
            let length = self.edge_length(id)?;
            let floor = self.minimum_elongation;
            if let Some(edge) = self.edges.get_mut(&id) {
                edge.reset_elongation(length, floor);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Triangles
    // ========================================================================

    /// Return the triangle on these three nodes, or create it.
    pub fn create_triangle(&mut self, a: NodeId, b: NodeId, c: NodeId) -> Result<TriangleId> {
        for n in [a, b, c] {
            self.require_node(n)?;
        }
        if a == b || b == c || a == c {
            return Err(Error::InvalidEdge(format!("triangle needs three distinct nodes, got {a}, {b}, {c}")));
        }
        if let Some(id) = self.find_triangle(a, b, c) {
            return Ok(id);
        }

        let id = TriangleId(self.next_triangle_id);
        self.next_triangle_id += 1;
        self.triangles.insert(id, Triangle::new(id, [a, b, c]));
        self.triangle_index.insert(triangle_key(a, b, c), id);
        for n in [a, b, c] {
            if let Some(node) = self.nodes.get_mut(&n) {
                node.triangles.push(id);
            }
        }
        self.attach_triangle_edges(id);
        Ok(id)
    }

    fn attach_triangle_edges(&mut self, id: TriangleId) {
        let Some(tri) = self.triangles.get(&id) else { return };
        let sides = tri.sides();
        for (a, b) in sides {
            if let Some(e) = self.find_edge(a, b) {
                if let Some(edge) = self.edges.get_mut(&e) {
                    if !edge.triangles.contains(&id) {
                        edge.triangles.push(id);
                    }
                }
            }
        }
    }

    pub fn find_triangle(&self, a: NodeId, b: NodeId, c: NodeId) -> Option<TriangleId> {
        self.triangle_index.get(&triangle_key(a, b, c)).copied()
    }

    pub fn triangle(&self, id: TriangleId) -> Option<&Triangle> {
        self.triangles.get(&id)
    }

    pub fn require_triangle(&self, id: TriangleId) -> Result<&Triangle> {
        self.triangles.get(&id).ok_or_else(|| Error::NotFound(format!("Triangle {id}")))
    }

    pub fn triangles(&self) -> impl Iterator<Item = &Triangle> {
        self.triangles.values()
    }

    pub fn triangle_ids(&self) -> Vec<TriangleId> {
        self.triangles.keys().copied().collect()
    }

    /// The existing edges along the triangle's sides.
    pub fn triangle_edges(&self, id: TriangleId) -> SmallVec<[EdgeId; 3]> {
        let Some(tri) = self.triangles.get(&id) else { return SmallVec::new() };
        tri.sides().iter().filter_map(|(a, b)| self.find_edge(*a, *b)).collect()
    }

    /// All three sides exist as edges.
    pub fn is_triangle_complete(&self, id: TriangleId) -> bool {
        self.triangle_edges(id).len() == 3
    }

    /// Any side is an actuator or spring.
    pub fn is_triangle_dynamic(&self, id: TriangleId) -> bool {
        self.triangle_edges(id)
            .iter()
            .any(|e| self.edges.get(e).is_some_and(Edge::is_dynamic))
    }

    /// Face normal in the current pose.
    pub fn triangle_normal(&self, id: TriangleId) -> Result<Vector3<f64>> {
        let tri = self.require_triangle(id)?;
        let [a, b, c] = tri.nodes;
        geometry::face_normal(&self.position(a)?, &self.position(b)?, &self.position(c)?)
            .ok_or_else(|| Error::DegeneratePose(format!("triangle {id} is degenerate")))
    }

    pub fn triangle_center(&self, id: TriangleId) -> Result<Point3<f64>> {
        let tri = self.require_triangle(id)?;
        let [a, b, c] = tri.nodes;
        Ok(geometry::incenter(&self.position(a)?, &self.position(b)?, &self.position(c)?))
    }

    /// Triangles sharing an existing edge with `id`, ascending.
    pub fn adjacent_triangles(&self, id: TriangleId) -> Vec<TriangleId> {
        let mut out: Vec<TriangleId> = self
            .triangle_edges(id)
            .iter()
            .filter_map(|e| self.edges.get(e))
            .flat_map(|e| e.triangles.iter().copied())
            .filter(|t| *t != id)
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Neighbouring pairs of the triangles hinged on `edge`, in their order
    /// of rotation about the edge axis. Two triangles give one pair; three or
    /// more give a closed ring of consecutive pairs.
    pub fn sorted_adjacent_triangle_pairs(&self, edge: EdgeId) -> Result<Vec<(TriangleId, TriangleId)>> {
        let e = self.require_edge(edge)?;
        let origin = self.position(e.first)?;
        let axis = self.position(e.second)? - origin;
        if axis.norm() <= DEGENERATE_EPS {
            return Err(Error::DegeneratePose(format!("edge {edge} has zero length")));
        }
        let axis = axis.normalize();
        let u = geometry::any_perpendicular(&axis);
        let v = axis.cross(&u);

        let mut around = Vec::with_capacity(e.triangles.len());
        for t in &e.triangles {
            let Some(apex) = self.triangles.get(t).and_then(|tri| tri.opposite(e.first, e.second)) else {
                continue;
            };
            let d = self.position(apex)? - origin;
            let radial = d - axis * d.dot(&axis);
            around.push((radial.dot(&v).atan2(radial.dot(&u)), *t));
        }
        around.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));

        let ring: Vec<TriangleId> = around.into_iter().map(|(_, t)| t).collect();
        Ok(match ring.len() {
            0 | 1 => Vec::new(),
            2 => vec![(ring[0], ring[1])],
            n => (0..n).map(|i| (ring[i], ring[(i + 1) % n])).collect(),
        })
    }

    // ========================================================================
    // Nearest-neighbour queries
    // ========================================================================

    pub fn closest_node(&self, point: &Point3<f64>) -> Option<NodeId> {
        self.nodes
            .values()
            .min_by(|a, b| a.distance(point).total_cmp(&b.distance(point)))
            .map(|n| n.id)
    }

    pub fn closest_edge(&self, point: &Point3<f64>) -> Option<EdgeId> {
        self.edges
            .values()
            .filter_map(|e| {
                let a = self.nodes.get(&e.first)?.position;
                let b = self.nodes.get(&e.second)?.position;
                Some((geometry::point_segment_distance(point, &a, &b), e.id))
            })
            .min_by(|x, y| x.0.total_cmp(&y.0))
            .map(|(_, id)| id)
    }

    pub fn closest_triangle(&self, point: &Point3<f64>) -> Option<TriangleId> {
        self.triangles
            .keys()
            .filter_map(|t| Some((nalgebra::distance(&self.triangle_center(*t).ok()?, point), *t)))
            .min_by(|x, y| x.0.total_cmp(&y.0))
            .map(|(_, id)| id)
    }

    /// Pods sit on their node, so this is the closest pod-bearing node's pod.
    pub fn closest_pod(&self, point: &Point3<f64>) -> Option<PodId> {
        self.nodes
            .values()
            .flat_map(|n| n.pods.iter().map(move |p| (n.distance(point), p.id)))
            .min_by(|x, y| x.0.total_cmp(&y.0))
            .map(|(_, id)| id)
    }

    // ========================================================================
    // Delete / redraw
    // ========================================================================

    /// Remove an object. Nodes take their pods, incident edges and triangles
    /// with them; edges leave their triangles behind as incomplete.
    pub fn delete(&mut self, object: ObjectRef) -> Vec<GraphEvent> {
        let mut events = Vec::new();
        match object {
            ObjectRef::Node(id) => self.delete_node(id, &mut events),
            ObjectRef::Edge(id) => self.delete_edge(id, &mut events),
            ObjectRef::Triangle(id) => self.delete_triangle(id, &mut events),
        }
        events
    }

    fn delete_node(&mut self, id: NodeId, events: &mut Vec<GraphEvent>) {
        let Some(node) = self.nodes.get(&id) else { return };
        let pods: Vec<PodId> = node.pods.iter().map(|p| p.id).collect();
        let incidents = node.incidents.clone();
        let triangles = node.triangles.clone();

        for pod in pods {
            self.delete_pod(pod);
            events.push(GraphEvent::PodDeleted(pod));
        }
        for edge in incidents {
            self.delete_edge(edge, events);
        }
        for tri in triangles {
            self.delete_triangle(tri, events);
        }
        self.nodes.remove(&id);
        events.push(GraphEvent::Deleted(ObjectRef::Node(id)));
    }

    fn delete_edge(&mut self, id: EdgeId, events: &mut Vec<GraphEvent>) {
        let Some(edge) = self.edges.remove(&id) else { return };
        self.edge_index.remove(&edge_key(edge.first, edge.second));
        for n in edge.nodes() {
            if let Some(node) = self.nodes.get_mut(&n) {
                node.incidents.retain(|e| *e != id);
            }
        }
        events.push(GraphEvent::Deleted(ObjectRef::Edge(id)));
    }

    fn delete_triangle(&mut self, id: TriangleId, events: &mut Vec<GraphEvent>) {
        let Some(tri) = self.triangles.remove(&id) else { return };
        let [a, b, c] = tri.nodes;
        self.triangle_index.remove(&triangle_key(a, b, c));
        for n in tri.nodes {
            if let Some(node) = self.nodes.get_mut(&n) {
                node.triangles.retain(|t| *t != id);
            }
        }
        for (x, y) in tri.sides() {
            if let Some(e) = self.find_edge(x, y) {
                if let Some(edge) = self.edges.get_mut(&e) {
                    edge.triangles.retain(|t| *t != id);
                }
            }
        }
        events.push(GraphEvent::Deleted(ObjectRef::Triangle(id)));
    }

    /// Ask the host to redraw an object and everything drawn relative to it.
    pub fn redraw(&self, object: ObjectRef) -> Vec<GraphEvent> {
        match object {
            ObjectRef::Node(id) => {
                let Some(node) = self.nodes.get(&id) else { return Vec::new() };
                std::iter::once(object)
                    .chain(node.incidents.iter().map(|e| ObjectRef::Edge(*e)))
                    .chain(node.triangles.iter().map(|t| ObjectRef::Triangle(*t)))
                    .map(GraphEvent::Redraw)
                    .collect()
            }
            ObjectRef::Edge(id) if self.edges.contains_key(&id) => vec![GraphEvent::Redraw(object)],
            ObjectRef::Triangle(id) if self.triangles.contains_key(&id) => vec![GraphEvent::Redraw(object)],
            _ => Vec::new(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
