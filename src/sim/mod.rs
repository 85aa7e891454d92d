//! Collaborator seams for the two external engines the pipeline drives.
//!
//! - [`Simulator`]: the rigidity oracle. Given which dynamic edges are
//!   powered, report where every node ends up after a short run.
//! - [`Relaxation`]: the batched geometric update the elongation solver
//!   uses to stretch edges.
//!
//! Both are blocking calls. [`KinematicSimulator`] and [`PositionRelaxation`]
//! are in-crate reference implementations built on [`solver::project`].

pub mod kinematic;
pub mod solver;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::RigidityConfig;
use crate::graph::TrussGraph;
use crate::model::{EdgeId, GraphEvent, PositionSnapshot};
use crate::Result;

pub use kinematic::{KinematicSimulator, PositionRelaxation};
pub use solver::{DistanceConstraint, SolverConfig, SolverStats};

// ============================================================================
// Simulator
// ============================================================================

/// Power per dynamic edge for one simulation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveConfig {
    pub powers: BTreeMap<EdgeId, f64>,
    pub duration: f64,
}

impl DriveConfig {
    /// Drive `edge` at full power and every other dynamic edge at idle power.
    pub fn probe(graph: &TrussGraph, edge: EdgeId, config: &RigidityConfig) -> Self {
        let powers = graph
            .edges()
            .filter(|e| e.is_dynamic())
            .map(|e| (e.id, if e.id == edge { 1.0 } else { config.idle_power }))
            .collect();
        Self { powers, duration: config.duration }
    }

    pub fn power(&self, edge: EdgeId) -> f64 {
        self.powers.get(&edge).copied().unwrap_or(0.0)
    }

    /// Edges running at more than half power.
    pub fn driven(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.powers.iter().filter(|(_, p)| **p >= 0.5).map(|(e, _)| *e)
    }
}

/// Runs the structure forward under a drive and samples node positions.
///
/// Implementations must not mutate the graph and must be deterministic for
/// an identical graph and drive.
pub trait Simulator {
    fn simulate(&mut self, graph: &TrussGraph, drive: &DriveConfig) -> Result<PositionSnapshot>;

    /// Return every dynamic edge to its rest state after probing.
    fn restore_neutral(&mut self, graph: &TrussGraph) -> Result<()>;
}

// ============================================================================
// Relaxation
// ============================================================================

/// Ask for `edge` to become `length` long.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LengthRequest {
    pub edge: EdgeId,
    pub length: f64,
    /// New first/total elongation split, applied before the edge moves.
    pub elongation_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelaxationReport {
    pub stats: SolverStats,
    pub moved_nodes: usize,
    pub events: Vec<GraphEvent>,
}

/// Applies a batch of edge length requests by relocating non-fixed nodes.
pub trait Relaxation {
    fn apply_length_changes(
        &mut self,
        graph: &mut TrussGraph,
        requests: &[LengthRequest],
    ) -> Result<RelaxationReport>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinkKind;
    use nalgebra::Point3;

    #[test]
    fn test_probe_powers_only_dynamic_edges() {
        let mut g = TrussGraph::new();
        let a = g.create_node(Point3::new(0.0, 0.0, 0.0));
        let b = g.create_node(Point3::new(500.0, 0.0, 0.0));
        let c = g.create_node(Point3::new(0.0, 500.0, 0.0));
        g.create_edge(a, b, LinkKind::Rigid).unwrap();
        let ac = g.create_edge(a, c, LinkKind::Actuator).unwrap();
        let bc = g.create_edge(b, c, LinkKind::Spring).unwrap();

        let drive = DriveConfig::probe(&g, ac, &RigidityConfig::default());
        assert_eq!(drive.powers.len(), 2);
        assert_eq!(drive.power(ac), 1.0);
        assert_eq!(drive.power(bc), 1e-6);
        assert_eq!(drive.driven().collect::<Vec<_>>(), vec![ac]);
    }
}
