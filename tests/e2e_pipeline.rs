//! End-to-end tests for the full export pipeline.
//!
//! Each test exercises: rigidity -> topology -> elongation -> export against
//! the reference simulator and relaxation, unless a test swaps one out.

use nalgebra::{Point3, Vector3};
use pretty_assertions::assert_eq;

use truss_export::export::HingePart;
use truss_export::{
    write_manifest, Error, ExportConfig, ExportPipeline, KinematicSimulator, LengthRequest,
    LinkKind, NodeId, PartManifest, Relaxation, RelaxationReport, Stage, TrussGraph,
};

fn tetrahedron(g: &mut TrussGraph) -> [NodeId; 4] {
    let n = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1000.0, 0.0, 0.0),
        Point3::new(500.0, 866.0, 0.0),
        Point3::new(500.0, 289.0, 816.0),
    ]
    .map(|p| g.create_node(p));
    for i in 0..4 {
        for j in (i + 1)..4 {
            g.create_edge(n[i], n[j], LinkKind::Rigid).unwrap();
        }
    }
    n
}

fn triangle(g: &mut TrussGraph) -> [NodeId; 3] {
    let a = g.create_node(Point3::new(0.0, 0.0, 0.0));
    let b = g.create_node(Point3::new(1000.0, 0.0, 0.0));
    let c = g.create_node(Point3::new(0.0, 1000.0, 0.0));
    for (x, y) in [(a, b), (b, c), (c, a)] {
        g.create_edge(x, y, LinkKind::Rigid).unwrap();
    }
    [a, b, c]
}

struct Stuck;

impl Relaxation for Stuck {
    fn apply_length_changes(
        &mut self,
        _graph: &mut TrussGraph,
        _requests: &[LengthRequest],
    ) -> truss_export::Result<RelaxationReport> {
        Ok(RelaxationReport::default())
    }
}

// ============================================================================
// 1. Successful runs
// ============================================================================

#[test]
fn test_tetrahedron_exports_four_main_hubs() {
    let mut g = TrussGraph::new();
    let nodes = tetrahedron(&mut g);
    g.add_pod(nodes[0], Vector3::new(0.0, 0.0, -1.0)).unwrap();

    let mut pipeline = ExportPipeline::reference(ExportConfig::default());
    let report = pipeline.run(&mut g).unwrap();
    let manifest = &report.manifest;

    assert_eq!(report.rigidity.groups.len(), 1);
    assert_eq!(manifest.hubs.len(), 4);
    assert_eq!(manifest.main_hubs().count(), 4);
    assert!(manifest.hinges.is_empty());
    assert_eq!(manifest.elongations.len(), 6);

    let with_pod = manifest.hubs.iter().find(|h| h.node == nodes[0]).unwrap();
    assert_eq!(with_pod.pods.len(), 1);
    for hub in &manifest.hubs {
        assert_eq!(hub.edges.len(), 3);
        for e in &hub.edges {
            assert!((e.l3 - (e.elongation - e.l1 - e.l2)).abs() < 1e-9);
            let norm = e.direction.iter().map(|c| c * c).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }
    assert!(pipeline.state().elongation.is_some());
}

#[test]
fn test_rigid_triangle_exports_three_hinges() {
    let mut g = TrussGraph::new();
    triangle(&mut g);

    let report = ExportPipeline::reference(ExportConfig::default()).run(&mut g).unwrap();
    let manifest = &report.manifest;
    assert!(manifest.hubs.is_empty());
    assert_eq!(manifest.hinges.len(), 3);
    for h in &manifest.hinges {
        assert_eq!(h.part, HingePart::Simple);
        assert!(h.a_l3 >= 10.0 && h.b_l3 >= 10.0, "{h:?}");
        assert!(!h.a_gap && !h.b_gap);
    }
}

#[test]
fn test_actuated_book_exports_after_inset() {
    let mut g = TrussGraph::new();
    let a = g.create_node(Point3::new(0.0, 0.0, 0.0));
    let b = g.create_node(Point3::new(1000.0, 0.0, 0.0));
    let c = g.create_node(Point3::new(500.0, 800.0, 0.0));
    let d = g.create_node(Point3::new(500.0, 300.0, 700.0));
    for (x, y) in [(a, b), (a, c), (b, c), (a, d), (b, d)] {
        g.create_edge(x, y, LinkKind::Rigid).unwrap();
    }
    g.create_edge(c, d, LinkKind::Actuator).unwrap();

    let report = ExportPipeline::reference(ExportConfig::default()).run(&mut g).unwrap();
    assert_eq!(report.topology.insets.len(), 1);
    assert_eq!(g.node_count(), 6);
    assert!(report.manifest.hubs.is_empty());

    // six simple leaf hinges, plus two double hinges (two parts each) at
    // either end of the actuator
    let manifest = &report.manifest;
    assert_eq!(manifest.hinges.iter().filter(|h| h.part == HingePart::Simple).count(), 6);
    assert_eq!(manifest.hinges.len(), 6 + 4 * 2);

    let cd = g.find_edge(c, d).unwrap();
    for end in [c, d] {
        let parts: Vec<_> = manifest
            .hinges
            .iter()
            .filter(|h| h.node == end && (h.a_edge == cd || h.b_edge == cd))
            .collect();
        assert_eq!(parts.len(), 4, "at {end}");
        for h in parts {
            assert!(h.is_double);
            let actuator_l3 = if h.a_edge == cd { h.a_l3 } else { h.b_l3 };
            assert_eq!(actuator_l3, 0.0);
        }
    }

    // the rigidity report still names the leaf the inset rebuilt; the
    // topology groups only hold live triangles
    let stale = report
        .rigidity
        .groups
        .iter()
        .flat_map(|s| s.triangles.iter())
        .filter(|t| g.triangle(**t).is_none())
        .count();
    assert!(stale > 0);
    assert!(report.topology.groups.iter().flat_map(|s| s.triangles.iter()).all(|t| g.triangle(*t).is_some()));

    // the actuator keeps its floor clearance
    let record = report.elongation.record(cd).unwrap();
    assert_eq!(record.first_target, None);
    assert_eq!(record.second_target, None);
}

#[test]
fn test_manifest_json_is_readable() {
    let mut g = TrussGraph::new();
    tetrahedron(&mut g);
    let report = ExportPipeline::reference(ExportConfig::default()).run(&mut g).unwrap();

    let mut out = Vec::new();
    write_manifest(&report.manifest, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.ends_with('\n'));

    let back: PartManifest = serde_json::from_str(&text).unwrap();
    assert_eq!(back.hubs.len(), 4);
    assert_eq!(back.elongations.len(), 6);
}

#[test]
fn test_runs_are_reproducible() {
    let run = || {
        let mut g = TrussGraph::new();
        tetrahedron(&mut g);
        ExportPipeline::reference(ExportConfig::default()).run(&mut g).unwrap().manifest
    };
    assert_eq!(run(), run());
}

// ============================================================================
// 2. Failures keep partial state
// ============================================================================

#[test]
fn test_fixed_hinge_node_fails_at_export() {
    let mut g = TrussGraph::new();
    let [a, ..] = triangle(&mut g);
    g.set_fixed(a, true).unwrap();

    let mut pipeline = ExportPipeline::reference(ExportConfig::default());
    let err = pipeline.run(&mut g).unwrap_err();
    assert!(matches!(err, Error::Stage { stage: Stage::Export, .. }));
    assert!(matches!(err.root(), Error::SpacerTooShort { node, .. } if *node == a));

    let state = pipeline.state();
    assert!(state.rigidity.is_some());
    assert!(state.topology.is_some());
    assert!(state.elongation.is_some());
}

#[test]
fn test_stuck_relaxation_fails_at_elongation() {
    let mut g = TrussGraph::new();
    tetrahedron(&mut g);
    let config = ExportConfig { max_elongation_passes: 2, ..ExportConfig::default() };
    let mut pipeline = ExportPipeline::new(KinematicSimulator::default(), Stuck, config);

    let err = pipeline.run(&mut g).unwrap_err();
    assert!(matches!(err, Error::Stage { stage: Stage::Elongation, .. }));
    assert!(matches!(err.root(), Error::NoConvergence { passes: 2, .. }));
    assert!(pipeline.state().targets.is_some());
    assert!(pipeline.state().elongation.is_none());
}

#[test]
fn test_invalid_config_fails_before_any_stage() {
    let mut g = TrussGraph::new();
    triangle(&mut g);
    let config = ExportConfig { max_elongation_passes: 0, ..ExportConfig::default() };

    let mut pipeline = ExportPipeline::reference(config);
    let err = pipeline.run(&mut g).unwrap_err();
    assert!(matches!(err, Error::Stage { stage: Stage::Prepare, .. }));
    assert!(matches!(err.root(), Error::InvalidConfig(_)));
    assert!(pipeline.state().rigidity.is_none());
}

#[test]
fn test_config_loads_from_json() {
    let config = ExportConfig::from_json_str(
        r#"{"shorten_elongations": true, "rigidity": {"drive_fraction": 0.2}}"#,
    )
    .unwrap();
    let pipeline = ExportPipeline::reference(config);
    assert!(pipeline.config().shorten_elongations);
    assert_eq!(pipeline.simulator().drive_fraction, 0.2);
}
