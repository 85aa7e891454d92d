//! Reference simulator and relaxation engine.
//!
//! Neither models mass or forces. Both treat edges as distance constraints
//! and let the projection solver find the nearest consistent pose.

use std::collections::BTreeMap;

use hashbrown::HashSet;
use tracing::{debug, warn};

use super::solver::{self, DistanceConstraint, SolverConfig};
use super::{DriveConfig, LengthRequest, Relaxation, RelaxationReport, Simulator};
use crate::graph::TrussGraph;
use crate::model::{EdgeId, NodeId, PositionSnapshot};
use crate::{Error, Result};

fn fixed_nodes(graph: &TrussGraph) -> HashSet<NodeId> {
    graph.nodes().filter(|n| n.fixed).map(|n| n.id).collect()
}

fn all_finite(positions: &PositionSnapshot) -> bool {
    positions.values().all(|p| p.coords.iter().all(|c| c.is_finite()))
}

// ============================================================================
// KinematicSimulator
// ============================================================================

/// Extends each driven edge by a fixed fraction of its length.
///
/// Rigid and generic edges keep their length, idle actuators and springs are
/// free, and fixed nodes are pinned. The resulting pose is what the
/// structure would look like once the driven actuator has moved.
#[derive(Debug, Clone)]
pub struct KinematicSimulator {
    pub drive_fraction: f64,
    pub solver: SolverConfig,
    runs: usize,
}

impl Default for KinematicSimulator {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl KinematicSimulator {
    pub fn new(drive_fraction: f64) -> Self {
        Self { drive_fraction, solver: SolverConfig::default(), runs: 0 }
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Simulations run since the last neutral reset.
    pub fn runs(&self) -> usize {
        self.runs
    }
}

impl Simulator for KinematicSimulator {
    fn simulate(&mut self, graph: &TrussGraph, drive: &DriveConfig) -> Result<PositionSnapshot> {
        if !(self.drive_fraction > 0.0) {
            return Err(Error::SimulatorUnavailable(format!(
                "drive fraction {} cannot move anything",
                self.drive_fraction
            )));
        }
        self.solver.validate()?;
        let driven: HashSet<EdgeId> = drive.driven().collect();
        let stretch = 1.0 + self.drive_fraction * drive.duration.max(0.0);

        let mut constraints = Vec::with_capacity(graph.edge_count());
        for edge in graph.edges() {
            let length = graph.edge_length(edge.id)?;
            let length = if driven.contains(&edge.id) {
                length * stretch
            } else if edge.is_dynamic() {
                continue;
            } else {
                length
            };
            constraints.push(DistanceConstraint { a: edge.first, b: edge.second, length });
        }

        let mut positions = graph.positions();
        let stats = solver::project(&mut positions, &fixed_nodes(graph), &constraints, &self.solver);
        self.runs += 1;

        if !all_finite(&positions) {
            return Err(Error::Simulation("solver produced non-finite positions".into()));
        }
        if !stats.converged {
            debug!(residual = stats.max_residual, "simulation did not settle");
        }
        Ok(positions)
    }

    fn restore_neutral(&mut self, _graph: &TrussGraph) -> Result<()> {
        // nothing was ever written to the graph
        self.runs = 0;
        Ok(())
    }
}

// ============================================================================
// PositionRelaxation
// ============================================================================

/// Moves nodes so that requested edges reach their requested length while
/// every other edge keeps its current one.
#[derive(Debug, Clone, Default)]
pub struct PositionRelaxation {
    pub solver: SolverConfig,
}

impl PositionRelaxation {
    pub fn new(solver: SolverConfig) -> Self {
        Self { solver }
    }
}

impl Relaxation for PositionRelaxation {
    fn apply_length_changes(
        &mut self,
        graph: &mut TrussGraph,
        requests: &[LengthRequest],
    ) -> Result<RelaxationReport> {
        self.solver.validate()?;
        let mut targets: BTreeMap<EdgeId, f64> = BTreeMap::new();
        for r in requests {
            graph.require_edge(r.edge)?;
            if !r.length.is_finite() || r.length <= 0.0 {
                return Err(Error::Relaxation(format!("edge {} cannot become {} long", r.edge, r.length)));
            }
            if let Some(ratio) = r.elongation_ratio {
                graph.set_elongation_ratio(r.edge, ratio)?;
            }
            targets.insert(r.edge, r.length);
        }

        let mut constraints = Vec::with_capacity(graph.edge_count());
        for edge in graph.edges() {
            let length = match targets.get(&edge.id) {
                Some(target) => *target,
                None => graph.edge_length(edge.id)?,
            };
            constraints.push(DistanceConstraint { a: edge.first, b: edge.second, length });
        }

        let before = graph.positions();
        let mut positions = before.clone();
        let stats = solver::project(&mut positions, &fixed_nodes(graph), &constraints, &self.solver);
        if !all_finite(&positions) {
            return Err(Error::Relaxation("solver produced non-finite positions".into()));
        }
        if !stats.converged {
            warn!(
                residual = stats.max_residual,
                requests = requests.len(),
                "relaxation left edges off their requested length"
            );
        }

        let mut report = RelaxationReport { stats, ..Default::default() };
        for (id, position) in positions {
            if before.get(&id) == Some(&position) {
                continue;
            }
            report.events.extend(graph.move_node(id, position)?);
            report.moved_nodes += 1;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinkKind;
    use nalgebra::Point3;

    #[test]
    fn test_simulate_extends_driven_edge_without_mutating() {
        let mut g = TrussGraph::new();
        let a = g.create_node(Point3::new(0.0, 0.0, 0.0));
        let b = g.create_node(Point3::new(1000.0, 0.0, 0.0));
        let act = g.create_edge(a, b, LinkKind::Actuator).unwrap();
        let before = g.positions();

        let mut sim = KinematicSimulator::default();
        let drive = DriveConfig { powers: [(act, 1.0)].into_iter().collect(), duration: 1.0 };
        let after = sim.simulate(&g, &drive).unwrap();

        assert!((nalgebra::distance(&after[&a], &after[&b]) - 1100.0).abs() < 1e-5);
        assert_eq!(g.positions(), before);
        assert_eq!(sim.runs(), 1);
        sim.restore_neutral(&g).unwrap();
        assert_eq!(sim.runs(), 0);
    }

    #[test]
    fn test_zero_drive_fraction_is_unavailable() {
        let g = TrussGraph::new();
        let mut sim = KinematicSimulator::new(0.0);
        assert!(matches!(
            sim.simulate(&g, &DriveConfig::default()),
            Err(Error::SimulatorUnavailable(_))
        ));
    }

    #[test]
    fn test_relaxation_moves_free_node_only() {
        let mut g = TrussGraph::new();
        let a = g.create_node(Point3::new(0.0, 0.0, 0.0));
        let b = g.create_node(Point3::new(1000.0, 0.0, 0.0));
        g.set_fixed(a, true).unwrap();
        let ab = g.create_edge(a, b, LinkKind::Rigid).unwrap();

        let mut relax = PositionRelaxation::default();
        let report = relax
            .apply_length_changes(&mut g, &[LengthRequest { edge: ab, length: 1050.0, elongation_ratio: Some(0.25) }])
            .unwrap();

        assert!(report.stats.converged);
        assert_eq!(report.moved_nodes, 1);
        assert_eq!(g.position(a).unwrap(), Point3::origin());
        let edge = g.edge(ab).unwrap();
        // body stays 960, so 90 of clearance split 1:3
        assert!((edge.first_elongation() - 22.5).abs() < 1e-5);
        assert!((edge.second_elongation() - 67.5).abs() < 1e-5);
    }

    #[test]
    fn test_relaxation_rejects_bad_length() {
        let mut g = TrussGraph::new();
        let a = g.create_node(Point3::new(0.0, 0.0, 0.0));
        let b = g.create_node(Point3::new(1000.0, 0.0, 0.0));
        let ab = g.create_edge(a, b, LinkKind::Rigid).unwrap();
        let err = PositionRelaxation::default()
            .apply_length_changes(&mut g, &[LengthRequest { edge: ab, length: f64::NAN, elongation_ratio: None }])
            .unwrap_err();
        assert!(matches!(err, Error::Relaxation(_)));
    }
}
