//! Part manifest: the finished hubs, hinges and elongations as plain
//! records for an external part-file writer.
//!
//! ```text
//! TrussGraph + Topology + ElongationReport → build_manifest() → PartManifest
//!   → write_manifest() → JSON → part-file generator
//! ```
//!
//! Building the manifest is also the last validation step. Anything the
//! hardware cannot be made from (two hinges on one side of an edge, a spacer
//! shorter than the minimum, a sub-hub between two hinges) aborts here.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Presets;
use crate::elongation::{ElongationRecord, ElongationReport};
use crate::graph::TrussGraph;
use crate::model::*;
use crate::rigidity::GroupId;
use crate::topology::{Hinge, Hub, Topology};
use crate::{Error, Result};

// ============================================================================
// Records
// ============================================================================

/// Which hinge sides an edge leaving a hub continues into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HingeConnection {
    None,
    /// The edge is the `b` side of a hinge.
    A,
    /// The edge is the `a` side of a hinge.
    B,
    AB,
}

impl HingeConnection {
    fn from_sides(is_a_side: bool, is_b_side: bool) -> Self {
        match (is_a_side, is_b_side) {
            (false, false) => HingeConnection::None,
            (true, false) => HingeConnection::B,
            (false, true) => HingeConnection::A,
            (true, true) => HingeConnection::AB,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubEdgeRecord {
    pub edge: EdgeId,
    pub other_node: NodeId,
    /// Unit vector from the hub towards `other_node`.
    pub direction: [f64; 3],
    pub connection: HingeConnection,
    pub elongation: f64,
    pub l1: f64,
    pub l2: f64,
    /// `elongation - l1 - l2`
    pub l3: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodMount {
    pub pod: PodId,
    pub direction: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubRecord {
    pub node: NodeId,
    pub group: GroupId,
    pub is_main: bool,
    pub l1: f64,
    /// In hub edge order.
    pub edges: Vec<HubEdgeRecord>,
    /// Only the main hub carries pods.
    pub pods: Vec<PodMount>,
}

/// One side of a printed hinge part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HingeEnd {
    Node(NodeId),
    /// The joint between the two halves of a split double hinge.
    Virtual(u64),
}

impl std::fmt::Display for HingeEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HingeEnd::Node(id) => write!(f, "{id}"),
            HingeEnd::Virtual(n) => write!(f, "V{n}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HingePart {
    Simple,
    DoubleFirst,
    DoubleSecond,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HingeRecord {
    pub node: NodeId,
    pub a_edge: EdgeId,
    pub b_edge: EdgeId,
    pub a_end: HingeEnd,
    pub b_end: HingeEnd,
    pub part: HingePart,
    pub is_double: bool,
    /// Corner angle between the two edges, not a face dihedral.
    pub angle: f64,
    /// Another hinge or a sub-hub continues from this side.
    pub a_gap: bool,
    pub b_gap: bool,
    pub a_with_connector: bool,
    pub b_with_connector: bool,
    pub l1: f64,
    /// Zero for dynamic edges.
    pub a_l3: f64,
    pub b_l3: f64,
}

/// Everything the part-file writer needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartManifest {
    pub hubs: Vec<HubRecord>,
    pub hinges: Vec<HingeRecord>,
    pub elongations: Vec<ElongationRecord>,
}

impl PartManifest {
    pub fn main_hubs(&self) -> impl Iterator<Item = &HubRecord> {
        self.hubs.iter().filter(|h| h.is_main)
    }

    pub fn sub_hubs(&self) -> impl Iterator<Item = &HubRecord> {
        self.hubs.iter().filter(|h| !h.is_main)
    }
}

// ============================================================================
// Build
// ============================================================================

fn elongation_at(graph: &TrussGraph, edge: EdgeId, node: NodeId) -> Result<f64> {
    graph
        .require_edge(edge)?
        .elongation_at(node)
        .ok_or(Error::NotIncident { node, edge })
}

fn far_end(graph: &TrussGraph, edge: EdgeId, node: NodeId) -> Result<NodeId> {
    graph
        .require_edge(edge)?
        .other_node(node)
        .ok_or(Error::NotIncident { node, edge })
}

fn hub_record(graph: &TrussGraph, hub: &Hub, hinges: &[&Hinge], presets: &Presets) -> Result<HubRecord> {
    let node = hub.node;
    let (l1, l2) = (presets.main_clearance, presets.gap_length);
    let mut edges = Vec::with_capacity(hub.edges.len());

    for edge in &hub.edges {
        let as_a = hinges.iter().filter(|h| h.a == *edge).count();
        let as_b = hinges.iter().filter(|h| h.b == *edge).count();
        if as_a > 1 || as_b > 1 {
            return Err(Error::HingeConflict { node, edge: *edge });
        }
        let connection = HingeConnection::from_sides(as_a == 1, as_b == 1);
        if !hub.is_main && connection == HingeConnection::AB {
            return Err(Error::SubHubDoubleHinge { node, edge: *edge });
        }

        let elongation = elongation_at(graph, *edge, node)?;
        let l3 = elongation - l1 - l2;
        if !hub.is_main && l3 < presets.minimum_spacer {
            return Err(Error::SpacerTooShort { node, edge: *edge, l3, minimum: presets.minimum_spacer });
        }

        let other_node = far_end(graph, *edge, node)?;
        edges.push(HubEdgeRecord {
            edge: *edge,
            other_node,
            direction: graph.edge_direction_from(*edge, node)?.into(),
            connection,
            elongation,
            l1,
            l2,
            l3,
        });
    }

    let pods = if hub.is_main {
        graph
            .require_node(node)?
            .pods()
            .iter()
            .map(|p| PodMount { pod: p.id, direction: p.direction.try_normalize(0.0).unwrap_or(p.direction).into() })
            .collect()
    } else {
        Vec::new()
    };

    Ok(HubRecord { node, group: hub.group, is_main: hub.is_main, l1, edges, pods })
}

fn hinge_records(
    graph: &TrussGraph,
    hinge: &Hinge,
    siblings: &[&Hinge],
    sub_hubs: &[&Hub],
    presets: &Presets,
    next_virtual: &mut u64,
) -> Result<Vec<HingeRecord>> {
    let node = hinge.node;
    let (l1, l2) = (presets.main_clearance, presets.gap_length);

    let continues_a = siblings.iter().filter(|o| o.b == hinge.a).count();
    let continues_b = siblings.iter().filter(|o| o.a == hinge.b).count();
    if continues_a > 1 {
        return Err(Error::HingeConflict { node, edge: hinge.a });
    }
    if continues_b > 1 {
        return Err(Error::HingeConflict { node, edge: hinge.b });
    }

    let a_dynamic = graph.require_edge(hinge.a)?.is_dynamic();
    let b_dynamic = graph.require_edge(hinge.b)?.is_dynamic();
    let mut a_l3 = elongation_at(graph, hinge.a, node)? - l1 - l2;
    let mut b_l3 = elongation_at(graph, hinge.b, node)? - l1 - l2;
    if !a_dynamic && !b_dynamic {
        for (edge, l3) in [(hinge.a, a_l3), (hinge.b, b_l3)] {
            if l3 < presets.minimum_spacer {
                return Err(Error::SpacerTooShort { node, edge, l3, minimum: presets.minimum_spacer });
            }
        }
    }
    if a_dynamic {
        a_l3 = 0.0;
    }
    if b_dynamic {
        b_l3 = 0.0;
    }

    let a_gap = continues_a == 1 || sub_hubs.iter().any(|h| h.contains(hinge.a));
    let b_gap = continues_b == 1 || sub_hubs.iter().any(|h| h.contains(hinge.b));
    let a_end = HingeEnd::Node(far_end(graph, hinge.a, node)?);
    let b_end = HingeEnd::Node(far_end(graph, hinge.b, node)?);

    let simple = HingeRecord {
        node,
        a_edge: hinge.a,
        b_edge: hinge.b,
        a_end,
        b_end,
        part: HingePart::Simple,
        is_double: hinge.is_double,
        angle: hinge.angle,
        a_gap,
        b_gap,
        a_with_connector: true,
        b_with_connector: !b_gap,
        l1,
        a_l3,
        b_l3,
    };
    if !hinge.is_double {
        return Ok(vec![simple]);
    }

    // a double hinge prints as two parts meeting at a virtual joint
    let joint = HingeEnd::Virtual(*next_virtual);
    *next_virtual += 1;
    let first = HingeRecord {
        b_end: joint,
        part: HingePart::DoubleFirst,
        b_gap: true,
        a_with_connector: !a_dynamic,
        b_with_connector: false,
        ..simple.clone()
    };
    let second = HingeRecord {
        a_end: joint,
        part: HingePart::DoubleSecond,
        a_gap: true,
        a_with_connector: false,
        b_with_connector: simple.b_with_connector && !b_dynamic,
        ..simple
    };
    Ok(vec![first, second])
}

/// Validate the finished structure and assemble its part records.
pub fn build_manifest(
    graph: &TrussGraph,
    topology: &Topology,
    elongations: &ElongationReport,
    presets: &Presets,
) -> Result<PartManifest> {
    let mut manifest = PartManifest { elongations: elongations.records.clone(), ..Default::default() };
    let mut next_virtual = 1;

    for node in topology.nodes() {
        let hinges: Vec<&Hinge> = topology.hinges_at_node(node).collect();
        let sub_hubs: Vec<&Hub> = topology.sub_hubs_at_node(node).collect();

        for hinge in &hinges {
            manifest
                .hinges
                .extend(hinge_records(graph, hinge, &hinges, &sub_hubs, presets, &mut next_virtual)?);
        }
        for hub in topology.hubs_at_node(node) {
            manifest.hubs.push(hub_record(graph, hub, &hinges, presets)?);
        }
    }

    info!(
        hubs = manifest.hubs.len(),
        hinges = manifest.hinges.len(),
        edges = manifest.elongations.len(),
        "part manifest built"
    );
    Ok(manifest)
}

/// Write the manifest as pretty JSON.
pub fn write_manifest(manifest: &PartManifest, writer: &mut dyn Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, manifest)?;
    writeln!(writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elongation::ElongationReport;
    use nalgebra::Point3;

    /// Right-angled corner at O with free ends, both edges elongated to
    /// `clearance` at O.
    fn corner(clearance: f64, second: LinkKind) -> (TrussGraph, NodeId, EdgeId, EdgeId) {
        let mut g = TrussGraph::new();
        let o = g.create_node(Point3::origin());
        let x = g.create_node(Point3::new(1000.0, 0.0, 0.0));
        let y = g.create_node(Point3::new(0.0, 1000.0, 0.0));
        let ox = g.create_edge(o, x, LinkKind::Rigid).unwrap();
        let oy = g.create_edge(o, y, second).unwrap();
        g.set_elongations(ox, clearance, 20.0).unwrap();
        g.set_elongations(oy, clearance, 20.0).unwrap();
        (g, o, ox, oy)
    }

    fn hinge(node: NodeId, a: EdgeId, b: EdgeId, is_double: bool) -> Hinge {
        Hinge { node, a, b, is_double, angle: std::f64::consts::FRAC_PI_2 }
    }

    #[test]
    fn test_simple_hinge_record() {
        let (g, o, ox, oy) = corner(90.0, LinkKind::Rigid);
        let topo = Topology { hinges: vec![hinge(o, ox, oy, false)], ..Default::default() };
        let m = build_manifest(&g, &topo, &ElongationReport::default(), &Presets::default()).unwrap();

        assert_eq!(m.hinges.len(), 1);
        let h = &m.hinges[0];
        assert_eq!(h.part, HingePart::Simple);
        assert!((h.a_l3 - 15.0).abs() < 1e-9);
        assert!(!h.a_gap && !h.b_gap);
        assert!(h.a_with_connector && h.b_with_connector);
    }

    #[test]
    fn test_short_spacer_is_fatal() {
        let (g, o, ox, oy) = corner(80.0, LinkKind::Rigid);
        let topo = Topology { hinges: vec![hinge(o, ox, oy, false)], ..Default::default() };
        let err = build_manifest(&g, &topo, &ElongationReport::default(), &Presets::default()).unwrap_err();
        assert!(matches!(err, Error::SpacerTooShort { .. }));
    }

    #[test]
    fn test_double_hinge_splits_at_virtual_joint() {
        let (g, o, ox, oy) = corner(20.0, LinkKind::Actuator);
        let topo = Topology { hinges: vec![hinge(o, ox, oy, true)], ..Default::default() };
        let m = build_manifest(&g, &topo, &ElongationReport::default(), &Presets::default()).unwrap();

        assert_eq!(m.hinges.len(), 2);
        let (first, second) = (&m.hinges[0], &m.hinges[1]);
        assert_eq!(first.part, HingePart::DoubleFirst);
        assert_eq!(second.part, HingePart::DoubleSecond);
        assert_eq!(first.b_end, HingeEnd::Virtual(1));
        assert_eq!(second.a_end, HingeEnd::Virtual(1));
        assert_eq!(second.a_end.to_string(), "V1");
        // actuator side has no spacer and no connector
        assert_eq!(second.b_l3, 0.0);
        assert!(!second.b_with_connector);
    }

    #[test]
    fn test_two_hinges_on_one_side_conflict() {
        let mut g = TrussGraph::new();
        let o = g.create_node(Point3::origin());
        let ends = [
            Point3::new(1000.0, 0.0, 0.0),
            Point3::new(0.0, 1000.0, 0.0),
            Point3::new(0.0, 0.0, 1000.0),
        ];
        let e: Vec<EdgeId> = ends
            .iter()
            .map(|p| {
                let n = g.create_node(*p);
                let id = g.create_edge(o, n, LinkKind::Rigid).unwrap();
                g.set_elongations(id, 100.0, 20.0).unwrap();
                id
            })
            .collect();
        let topo = Topology {
            hinges: vec![hinge(o, e[1], e[0], false), hinge(o, e[2], e[0], false), hinge(o, e[0], e[1], false)],
            ..Default::default()
        };
        let err = build_manifest(&g, &topo, &ElongationReport::default(), &Presets::default()).unwrap_err();
        assert!(matches!(err, Error::HingeConflict { .. }));
    }

    #[test]
    fn test_hub_connections_and_manifest_json() {
        let (mut g, o, ox, oy) = corner(100.0, LinkKind::Rigid);
        let z = g.create_node(Point3::new(0.0, 0.0, 1000.0));
        let oz = g.create_edge(o, z, LinkKind::Rigid).unwrap();
        g.set_elongations(oz, 100.0, 20.0).unwrap();
        g.add_pod(o, nalgebra::Vector3::new(0.0, 0.0, -2.0)).unwrap();

        let topo = Topology {
            hubs: vec![Hub { node: o, group: GroupId(0), edges: vec![ox, oy, oz], is_main: true }],
            hinges: vec![hinge(o, ox, oy, false)],
            ..Default::default()
        };
        let m = build_manifest(&g, &topo, &ElongationReport::default(), &Presets::default()).unwrap();
        let hub = &m.hubs[0];
        assert_eq!(hub.edges[0].connection, HingeConnection::B);
        assert_eq!(hub.edges[1].connection, HingeConnection::A);
        assert_eq!(hub.edges[2].connection, HingeConnection::None);
        assert_eq!(hub.pods[0].direction, [0.0, 0.0, -1.0]);
        assert_eq!(m.main_hubs().count(), 1);

        let mut out = Vec::new();
        write_manifest(&m, &mut out).unwrap();
        let back: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(back["hubs"][0]["edges"][0]["connection"], "b");
        assert_eq!(back["hinges"][0]["part"], "simple");
        assert_eq!(back["hinges"][0]["a_end"]["node"], 2);
    }

    #[test]
    fn test_sub_hub_between_two_hinges_is_rejected() {
        let (mut g, o, ox, oy) = corner(100.0, LinkKind::Rigid);
        let z = g.create_node(Point3::new(0.0, 0.0, 1000.0));
        let oz = g.create_edge(o, z, LinkKind::Rigid).unwrap();
        g.set_elongations(oz, 100.0, 20.0).unwrap();
        let topo = Topology {
            hubs: vec![Hub { node: o, group: GroupId(1), edges: vec![ox, oy, oz], is_main: false }],
            hinges: vec![hinge(o, ox, oy, false), hinge(o, oz, ox, false)],
            ..Default::default()
        };
        let err = build_manifest(&g, &topo, &ElongationReport::default(), &Presets::default()).unwrap_err();
        assert!(matches!(err, Error::SubHubDoubleHinge { .. }));
    }
}
