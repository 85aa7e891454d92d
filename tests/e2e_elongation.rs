//! End-to-end tests for the elongation solver over topologies produced by
//! the earlier stages.

use nalgebra::Point3;

use truss_export::elongation::{self, main_hub_elongation};
use truss_export::{
    compute_targets, find_static_groups, synthesize, ElongationTargets, Error, ExportConfig,
    KinematicSimulator, LengthRequest, LinkKind, NodeId, PositionRelaxation, Presets, Relaxation,
    RelaxationReport, RigidityConfig, Topology, TrussGraph,
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

fn topology(g: &mut TrussGraph) -> Topology {
    let report = find_static_groups(g, &mut KinematicSimulator::default(), &RigidityConfig::default()).unwrap();
    synthesize(g, report.groups, &Presets::default()).unwrap()
}

/// Accepts every batch and moves nothing.
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
// 1. Targets
// ============================================================================

#[test]
fn test_right_angle_needs_cuff_radius_times_root_two() {
    let presets = Presets::default();
    let target = main_hub_elongation(std::f64::consts::FRAC_PI_2, &presets);
    assert!((target - presets.connector_cuff_radius * 2f64.sqrt()).abs() < 1e-9);
}

#[test]
fn test_tetrahedron_targets_every_end() {
    let mut g = TrussGraph::new();
    tetrahedron(&mut g);
    let topo = topology(&mut g);
    let targets = compute_targets(&g, &topo, &Presets::default()).unwrap();

    // all corners are near 60 degrees, so r * sqrt(3) everywhere
    let expected = 27.0 * 3f64.sqrt();
    assert_eq!(targets.len(), 6);
    for (_, per_node) in targets.iter() {
        assert_eq!(per_node.len(), 2);
        for target in per_node.values() {
            assert!((target - expected).abs() < 0.5, "target {target}");
        }
    }
}

#[test]
fn test_fixed_nodes_get_no_targets() {
    let mut g = TrussGraph::new();
    let [a, ..] = tetrahedron(&mut g);
    g.set_fixed(a, true).unwrap();
    let topo = topology(&mut g);
    let targets = compute_targets(&g, &topo, &Presets::default()).unwrap();

    for edge in g.node(a).unwrap().incidents() {
        assert_eq!(targets.get(*edge, a), None);
    }
    assert_eq!(targets.len(), 6);
}

// ============================================================================
// 2. Solving
// ============================================================================

#[test]
fn test_tetrahedron_settles_within_band() {
    let mut g = TrussGraph::new();
    tetrahedron(&mut g);
    let topo = topology(&mut g);
    let config = ExportConfig::default();
    let targets = compute_targets(&g, &topo, &config.presets).unwrap();

    let report = elongation::solve(&mut g, &targets, &mut PositionRelaxation::default(), &config).unwrap();
    assert!(report.passes >= 1 && report.passes <= 3, "passes {}", report.passes);
    assert_eq!(report.records.len(), 6);

    let band = config.presets.shortening_band + config.presets.grow_step;
    for r in &report.records {
        for (have, want) in [(r.first_elongation, r.first_target), (r.second_elongation, r.second_target)] {
            let want = want.unwrap();
            assert!(have >= want - 1e-3, "{have} below {want}");
            assert!(have <= want + band, "{have} far above {want}");
        }
    }
}

#[test]
fn test_fixed_node_target_is_fatal() {
    let mut g = TrussGraph::new();
    let [a, b, ..] = tetrahedron(&mut g);
    g.set_fixed(a, true).unwrap();
    let ab = g.find_edge(a, b).unwrap();

    let mut targets = ElongationTargets::new();
    targets.raise(ab, a, 60.0, 20.0);
    let err = elongation::solve(&mut g, &targets, &mut PositionRelaxation::default(), &ExportConfig::default())
        .unwrap_err();
    assert!(matches!(err, Error::FixedNodeTargeted { node, edge } if node == a && edge == ab));
}

#[test]
fn test_stuck_relaxation_hits_pass_cap() {
    let mut g = TrussGraph::new();
    tetrahedron(&mut g);
    let topo = topology(&mut g);
    let config = ExportConfig { max_elongation_passes: 4, ..ExportConfig::default() };
    let targets = compute_targets(&g, &topo, &config.presets).unwrap();

    let err = elongation::solve(&mut g, &targets, &mut Stuck, &config).unwrap_err();
    assert!(matches!(err, Error::NoConvergence { passes: 4, pending: 6 }));
}
