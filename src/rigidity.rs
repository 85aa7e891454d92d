//! # Rigidity Analyzer
//!
//! Finds the *static groups* of a structure: maximal sets of triangles that
//! never rotate relative to each other while any single actuator moves.
//!
//! 1. Collect neighbouring triangle pairs around every edge (both complete).
//! 2. Measure each pair's dihedral angle in the rest pose.
//! 3. Drive each dynamic edge alone through the [`Simulator`] and measure
//!    again. Pairs whose angle moved more than the tolerance are rotation
//!    partners.
//! 4. Flood-fill the non-dynamic triangles over shared edges, never stepping
//!    between rotation partners. Each fill is one group.
//!
//! This is an empirical test, not a proof: a mechanism no single actuator
//! excites is reported as rigid.
//!
//! Iteration runs in ascending id order throughout, so the partition and
//! group numbering are reproducible.

use std::collections::BTreeSet;

use hashbrown::{HashMap, HashSet};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RigidityConfig;
use crate::geometry;
use crate::graph::TrussGraph;
use crate::model::*;
use crate::sim::{DriveConfig, Simulator};
use crate::{Error, Result};

// ============================================================================
// Static groups
// ============================================================================

/// Position of a group in the analyzer's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub usize);

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "G{}", self.0)
    }
}

/// Triangles that move as one rigid body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticGroup {
    pub id: GroupId,
    pub triangles: BTreeSet<TriangleId>,
    pub nodes: BTreeSet<NodeId>,
}

impl StaticGroup {
    pub fn new(id: GroupId, graph: &TrussGraph, triangles: BTreeSet<TriangleId>) -> Self {
        let mut group = Self { id, triangles, nodes: BTreeSet::new() };
        group.refresh_nodes(graph);
        group
    }

    /// Recompute the node set from the current triangles.
    pub fn refresh_nodes(&mut self, graph: &TrussGraph) {
        self.nodes = self
            .triangles
            .iter()
            .filter_map(|t| graph.triangle(*t))
            .flat_map(|t| t.nodes)
            .collect();
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// Existing edges along the sides of the group's triangles.
    pub fn edges(&self, graph: &TrussGraph) -> BTreeSet<EdgeId> {
        self.triangles
            .iter()
            .flat_map(|t| graph.triangle_edges(*t))
            .collect()
    }

    /// The group's edges meeting at `node`, ascending.
    pub fn edges_at(&self, graph: &TrussGraph, node: NodeId) -> Vec<EdgeId> {
        self.edges(graph)
            .into_iter()
            .filter(|e| graph.edge(*e).is_some_and(|e| e.contains(node)))
            .collect()
    }

    /// Some node of the group carries a pod.
    pub fn has_pods(&self, graph: &TrussGraph) -> bool {
        self.nodes.iter().any(|n| graph.node(*n).is_some_and(Node::has_pods))
    }

    /// Some triangle of the group has pods on all three corners, so the
    /// group carries the payload.
    pub fn bears_payload(&self, graph: &TrussGraph) -> bool {
        self.triangles.iter().filter_map(|t| graph.triangle(*t)).any(|t| {
            t.nodes.iter().all(|n| graph.node(*n).is_some_and(Node::has_pods))
        })
    }

    /// Nodes both groups touch, ascending.
    pub fn shared_nodes(&self, other: &StaticGroup) -> Vec<NodeId> {
        self.nodes.intersection(&other.nodes).copied().collect()
    }
}

/// Every group touching `node`.
pub fn static_groups_for_node(groups: &[StaticGroup], node: NodeId) -> Vec<&StaticGroup> {
    groups.iter().filter(|g| g.contains_node(node)).collect()
}

// ============================================================================
// Analysis
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RigidityReport {
    pub groups: Vec<StaticGroup>,
    /// Every dynamic edge that was driven, in order.
    pub probed_edges: Vec<EdgeId>,
    /// Pairs observed rotating, smaller id first.
    pub rotating_pairs: BTreeSet<(TriangleId, TriangleId)>,
    /// How many triangle pairs were measured per probe.
    pub measured_pairs: usize,
}

impl RigidityReport {
    pub fn group(&self, id: GroupId) -> Option<&StaticGroup> {
        self.groups.get(id.0)
    }

    /// The group holding `triangle`, if any.
    pub fn group_of(&self, triangle: TriangleId) -> Option<GroupId> {
        self.groups.iter().find(|g| g.triangles.contains(&triangle)).map(|g| g.id)
    }
}

fn snapshot_normal(graph: &TrussGraph, positions: &PositionSnapshot, t: TriangleId) -> Result<Vector3<f64>> {
    let tri = graph.require_triangle(t)?;
    let corner = |n: NodeId| {
        positions
            .get(&n)
            .copied()
            .ok_or_else(|| Error::Simulation(format!("snapshot is missing node {n}")))
    };
    let [a, b, c] = tri.nodes;
    geometry::face_normal(&corner(a)?, &corner(b)?, &corner(c)?)
        .ok_or_else(|| Error::DegeneratePose(format!("triangle {t} collapsed")))
}

/// Angle between the face normals of two triangles in the given pose.
pub fn dihedral_angle(
    graph: &TrussGraph,
    positions: &PositionSnapshot,
    first: TriangleId,
    second: TriangleId,
) -> Result<f64> {
    let n1 = snapshot_normal(graph, positions, first)?;
    let n2 = snapshot_normal(graph, positions, second)?;
    Ok(geometry::angle_between(&n1, &n2))
}

fn measure(
    graph: &TrussGraph,
    positions: &PositionSnapshot,
    pairs: &[(TriangleId, TriangleId)],
) -> Result<Vec<f64>> {
    pairs.iter().map(|(a, b)| dihedral_angle(graph, positions, *a, *b)).collect()
}

/// Neighbouring complete pairs around every edge, deduplicated.
fn triangle_pairs(graph: &TrussGraph) -> Result<Vec<(TriangleId, TriangleId)>> {
    let mut pairs = BTreeSet::new();
    for edge in graph.edges() {
        for (a, b) in graph.sorted_adjacent_triangle_pairs(edge.id)? {
            if graph.is_triangle_complete(a) && graph.is_triangle_complete(b) {
                pairs.insert(if a < b { (a, b) } else { (b, a) });
            }
        }
    }
    Ok(pairs.into_iter().collect())
}

/// Probe every actuator and partition the rigid triangles into groups.
pub fn find_static_groups<S: Simulator + ?Sized>(
    graph: &TrussGraph,
    simulator: &mut S,
    config: &RigidityConfig,
) -> Result<RigidityReport> {
    let pairs = triangle_pairs(graph)?;
    let rest = graph.positions();
    let baseline = measure(graph, &rest, &pairs)?;

    let actuators: Vec<EdgeId> = graph.edges().filter(|e| e.is_dynamic()).map(|e| e.id).collect();
    let mut rotating = BTreeSet::new();

    for actuator in &actuators {
        let drive = DriveConfig::probe(graph, *actuator, config);
        let pose = simulator.simulate(graph, &drive)?;
        let angles = measure(graph, &pose, &pairs)?;

        let before = rotating.len();
        for ((pair, base), moved) in pairs.iter().zip(&baseline).zip(&angles) {
            if (base - moved).abs() > config.angle_tolerance {
                rotating.insert(*pair);
            }
        }
        debug!(actuator = %actuator, new_partners = rotating.len() - before, "probed actuator");
    }
    simulator.restore_neutral(graph)?;

    let groups = partition(graph, &rotating);
    info!(
        groups = groups.len(),
        actuators = actuators.len(),
        pairs = pairs.len(),
        "rigidity analysis complete"
    );

    Ok(RigidityReport {
        groups,
        probed_edges: actuators,
        rotating_pairs: rotating,
        measured_pairs: pairs.len(),
    })
}

/// Flood-fill non-dynamic triangles, never crossing a rotating pair.
fn partition(graph: &TrussGraph, rotating: &BTreeSet<(TriangleId, TriangleId)>) -> Vec<StaticGroup> {
    let mut partners: HashMap<TriangleId, HashSet<TriangleId>> = HashMap::new();
    for (a, b) in rotating {
        partners.entry(*a).or_default().insert(*b);
        partners.entry(*b).or_default().insert(*a);
    }

    let candidates: BTreeSet<TriangleId> = graph
        .edges()
        .filter(|e| !e.is_dynamic())
        .flat_map(|e| e.adjacent_triangles().iter().copied())
        .filter(|t| !graph.is_triangle_dynamic(*t))
        .collect();

    let mut visited: HashSet<TriangleId> = HashSet::new();
    let mut groups = Vec::new();

    for seed in &candidates {
        if visited.contains(seed) {
            continue;
        }
        let mut members = BTreeSet::new();
        let mut stack = vec![*seed];
        visited.insert(*seed);

        while let Some(t) = stack.pop() {
            members.insert(t);
            // reversed so the lowest neighbour is visited first
            for other in graph.adjacent_triangles(t).into_iter().rev() {
                let blocked = partners.get(&t).is_some_and(|p| p.contains(&other));
                if blocked || !candidates.contains(&other) || visited.contains(&other) {
                    continue;
                }
                visited.insert(other);
                stack.push(other);
            }
        }
        groups.push(StaticGroup::new(GroupId(groups.len()), graph, members));
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::KinematicSimulator;
    use nalgebra::Point3;

    fn p(x: f64, y: f64, z: f64) -> Point3<f64> {
        Point3::new(x, y, z)
    }

    /// Two rigid leaves hinged on AB, opened by an actuator between C and D.
    fn book() -> (TrussGraph, [NodeId; 4]) {
        let mut g = TrussGraph::new();
        let a = g.create_node(p(0.0, 0.0, 0.0));
        let b = g.create_node(p(1000.0, 0.0, 0.0));
        let c = g.create_node(p(500.0, 800.0, 0.0));
        let d = g.create_node(p(500.0, 300.0, 700.0));
        for (x, y) in [(a, b), (a, c), (b, c), (a, d), (b, d)] {
            g.create_edge(x, y, LinkKind::Rigid).unwrap();
        }
        g.create_edge(c, d, LinkKind::Actuator).unwrap();
        (g, [a, b, c, d])
    }

    #[test]
    fn test_single_triangle_is_one_group() {
        let mut g = TrussGraph::new();
        let a = g.create_node(p(0.0, 0.0, 0.0));
        let b = g.create_node(p(1000.0, 0.0, 0.0));
        let c = g.create_node(p(0.0, 1000.0, 0.0));
        g.create_edge(a, b, LinkKind::Rigid).unwrap();
        g.create_edge(b, c, LinkKind::Rigid).unwrap();
        g.create_edge(c, a, LinkKind::Rigid).unwrap();

        let report = find_static_groups(&g, &mut KinematicSimulator::default(), &RigidityConfig::default()).unwrap();
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].len(), 1);
        assert!(report.probed_edges.is_empty());
    }

    #[test]
    fn test_actuated_book_splits_leaves() {
        let (g, [a, b, c, d]) = book();
        let abc = g.find_triangle(a, b, c).unwrap();
        let abd = g.find_triangle(a, b, d).unwrap();

        let report = find_static_groups(&g, &mut KinematicSimulator::default(), &RigidityConfig::default()).unwrap();
        assert_eq!(report.probed_edges.len(), 1);
        assert!(report.rotating_pairs.contains(&(abc.min(abd), abc.max(abd))));
        assert_eq!(report.groups.len(), 2);
        assert_ne!(report.group_of(abc), report.group_of(abd));
        // triangles on the actuator belong to nobody
        assert_eq!(report.group_of(g.find_triangle(a, c, d).unwrap()), None);
        assert_eq!(report.groups[0].shared_nodes(&report.groups[1]), vec![a, b]);
    }

    #[test]
    fn test_rigid_tetrahedron_is_one_group() {
        let mut g = TrussGraph::new();
        let n = [p(0.0, 0.0, 0.0), p(1000.0, 0.0, 0.0), p(500.0, 866.0, 0.0), p(500.0, 289.0, 816.0)]
            .map(|q| g.create_node(q));
        for i in 0..4 {
            for j in (i + 1)..4 {
                g.create_edge(n[i], n[j], LinkKind::Rigid).unwrap();
            }
        }
        let report = find_static_groups(&g, &mut KinematicSimulator::default(), &RigidityConfig::default()).unwrap();
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].len(), 4);
        assert_eq!(report.groups[0].nodes.len(), 4);
        assert_eq!(static_groups_for_node(&report.groups, n[2]).len(), 1);
    }

    #[test]
    fn test_payload_and_pods() {
        let (mut g, [a, b, c, d]) = book();
        let report = find_static_groups(&g, &mut KinematicSimulator::default(), &RigidityConfig::default()).unwrap();
        let abc = report.group_of(g.find_triangle(a, b, c).unwrap()).unwrap();
        let abd = report.group_of(g.find_triangle(a, b, d).unwrap()).unwrap();

        g.add_pod(c, Vector3::z()).unwrap();
        assert!(report.groups[abc.0].has_pods(&g));
        assert!(!report.groups[abd.0].has_pods(&g));
        assert!(!report.groups[abc.0].bears_payload(&g));

        g.add_pod(a, Vector3::z()).unwrap();
        g.add_pod(b, Vector3::z()).unwrap();
        assert!(report.groups[abc.0].bears_payload(&g));
    }

    #[test]
    fn test_degenerate_pose_is_fatal() {
        let mut g = TrussGraph::new();
        let a = g.create_node(p(0.0, 0.0, 0.0));
        let b = g.create_node(p(1000.0, 0.0, 0.0));
        let c = g.create_node(p(2000.0, 0.0, 0.0));
        let d = g.create_node(p(500.0, 800.0, 0.0));
        for (x, y) in [(a, b), (b, c), (a, c), (a, d), (b, d)] {
            g.create_edge(x, y, LinkKind::Rigid).unwrap();
        }
        let err = find_static_groups(&g, &mut KinematicSimulator::default(), &RigidityConfig::default()).unwrap_err();
        assert!(matches!(err, Error::DegeneratePose(_)));
    }
}
