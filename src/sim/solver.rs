//! Gauss-Seidel projection of distance constraints.
//!
//! Each iteration walks the constraints in order and moves both endpoints
//! along the edge until it has its target length, weighting pinned nodes at
//! zero. With ω = 1 this is plain position-based dynamics; `sor_factor`
//! scales each correction the same way successive over-relaxation scales a
//! Gauss-Seidel update.
//!
//! ```text
//! Δ = (|p_b - p_a| - L) / (w_a + w_b) · ω · û
//! p_a += w_a · Δ
//! p_b -= w_b · Δ
//! ```

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::geometry::DEGENERATE_EPS;
use crate::model::{NodeId, PositionSnapshot};
use crate::{Error, Result};

/// One edge that should have `length` between `a` and `b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceConstraint {
    pub a: NodeId,
    pub b: NodeId,
    pub length: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum number of sweeps over all constraints.
    pub max_iterations: usize,
    /// Stop once every constraint is within this many millimetres.
    pub tolerance: f64,
    /// Correction scale, in (0, 2).
    pub sor_factor: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            tolerance: 1e-6,
            sor_factor: 1.0,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sor_factor <= 0.0 || self.sor_factor >= 2.0 {
            return Err(Error::InvalidConfig("solver sor_factor must be in (0, 2)".into()));
        }
        if !(self.tolerance > 0.0) {
            return Err(Error::InvalidConfig("solver tolerance must be positive".into()));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig("solver max_iterations must be at least 1".into()));
        }
        Ok(())
    }
}

/// Result of one projection run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SolverStats {
    pub iterations: usize,
    pub initial_residual: f64,
    /// Largest |length - target| over all constraints after the last sweep.
    pub max_residual: f64,
    pub converged: bool,
}

fn max_residual(positions: &PositionSnapshot, constraints: &[DistanceConstraint]) -> f64 {
    constraints
        .iter()
        .filter_map(|c| {
            let pa = positions.get(&c.a)?;
            let pb = positions.get(&c.b)?;
            Some((nalgebra::distance(pa, pb) - c.length).abs())
        })
        .fold(0.0, f64::max)
}

/// Project `positions` onto the constraint set in place.
///
/// Constraints naming a node missing from `positions` are ignored, as are
/// constraints whose endpoints coincide (no direction to push along).
pub fn project(
    positions: &mut PositionSnapshot,
    pinned: &HashSet<NodeId>,
    constraints: &[DistanceConstraint],
    config: &SolverConfig,
) -> SolverStats {
    let initial_residual = max_residual(positions, constraints);
    let mut stats = SolverStats {
        iterations: 0,
        initial_residual,
        max_residual: initial_residual,
        converged: initial_residual < config.tolerance,
    };
    if stats.converged {
        return stats;
    }

    for iter in 0..config.max_iterations {
        stats.iterations = iter + 1;
        for c in constraints {
            let (Some(pa), Some(pb)) = (positions.get(&c.a).copied(), positions.get(&c.b).copied()) else {
                continue;
            };
            let wa = if pinned.contains(&c.a) { 0.0 } else { 1.0 };
            let wb = if pinned.contains(&c.b) { 0.0 } else { 1.0 };
            if wa + wb == 0.0 {
                continue;
            }
            let d = pb - pa;
            let len = d.norm();
            if len <= DEGENERATE_EPS {
                continue;
            }
            let correction = d * ((len - c.length) / len / (wa + wb) * config.sor_factor);
            if let Some(p) = positions.get_mut(&c.a) {
                *p += correction * wa;
            }
            if let Some(p) = positions.get_mut(&c.b) {
                *p -= correction * wb;
            }
        }

        stats.max_residual = max_residual(positions, constraints);
        if stats.max_residual < config.tolerance {
            stats.converged = true;
            break;
        }
    }
    stats
}
