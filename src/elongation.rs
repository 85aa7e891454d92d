//! # Elongation Solver
//!
//! Decides how much straight clearance every edge end reserves so that the
//! hardware chosen by the topology fits, then stretches the structure until
//! every end has at least that much.
//!
//! ## Targets
//!
//! Per (edge, node) the target is the largest of:
//!
//! - the minimum elongation floor,
//! - **main hub**: at free nodes with hubs, every main-hub edge needs room
//!   for its connector cuff. With θ the smallest angle between the edge and
//!   any other edge at the node and r the cuff radius:
//!
//!   ```text
//!   target = r · √(2 · (1 − cos(π − θ)))
//!   ```
//!
//!   The tighter the angle, the further the cuff has to sit from the node.
//! - **sub-hub / hinge**: at free nodes, every non-dynamic edge in a sub-hub
//!   or a hinge needs `l1 + l2 + l3` (main clearance, gap, minimum spacer).
//!
//! ## Fixed point
//!
//! Each pass compares every targeted edge's current elongations with its
//! targets and queues one [`LengthRequest`] per edge that is too short (or,
//! with shortening on, too long by more than the band). The batch goes to
//! the [`Relaxation`] engine, then the next pass re-measures. The loop stops
//! when a pass queues nothing, or fails after `max_elongation_passes`.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ExportConfig, Presets};
use crate::geometry;
use crate::graph::TrussGraph;
use crate::model::*;
use crate::sim::{LengthRequest, Relaxation};
use crate::topology::Topology;
use crate::{Error, Result};

// ============================================================================
// Targets
// ============================================================================

/// Required clearance per edge end. Raising only ever increases a target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElongationTargets {
    targets: BTreeMap<EdgeId, BTreeMap<NodeId, f64>>,
}

impl ElongationTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the target at (`edge`, `node`) to at least `length`, never
    /// below `floor`.
    pub fn raise(&mut self, edge: EdgeId, node: NodeId, length: f64, floor: f64) {
        let slot = self.targets.entry(edge).or_default().entry(node).or_insert(floor);
        *slot = slot.max(length);
    }

    pub fn get(&self, edge: EdgeId, node: NodeId) -> Option<f64> {
        self.targets.get(&edge)?.get(&node).copied()
    }

    pub fn edge(&self, edge: EdgeId) -> Option<&BTreeMap<NodeId, f64>> {
        self.targets.get(&edge)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EdgeId, &BTreeMap<NodeId, f64>)> {
        self.targets.iter().map(|(e, m)| (*e, m))
    }

    /// Number of targeted edges.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Clearance a main-hub edge needs when its nearest neighbour edge is
/// `angle` radians away.
pub fn main_hub_elongation(angle: f64, presets: &Presets) -> f64 {
    if !(angle > 0.0 && angle < PI) {
        return presets.minimum_elongation;
    }
    let r = presets.connector_cuff_radius;
    let chord = r * (2.0 * (1.0 - (PI - angle).cos())).sqrt();
    chord.max(presets.minimum_elongation)
}

/// Smallest angle at `node` between `edge` and any other incident edge.
pub fn shortest_angle_at(graph: &TrussGraph, edge: EdgeId, node: NodeId) -> Result<Option<f64>> {
    let own = graph.edge_direction_from(edge, node)?;
    let mut best: Option<f64> = None;
    for other in graph.require_node(node)?.incidents() {
        if *other == edge {
            continue;
        }
        let angle = geometry::angle_between(&own, &graph.edge_direction_from(*other, node)?);
        best = Some(best.map_or(angle, |b| b.min(angle)));
    }
    Ok(best)
}

/// Collect every target the topology implies.
pub fn compute_targets(graph: &TrussGraph, topology: &Topology, presets: &Presets) -> Result<ElongationTargets> {
    let floor = presets.minimum_elongation;
    let mut targets = ElongationTargets::new();

    for node in graph.nodes().filter(|n| !n.fixed) {
        let Some(main) = topology.main_hub_at_node(node.id) else { continue };
        for edge in &main.edges {
            let length = match shortest_angle_at(graph, *edge, node.id)? {
                Some(angle) => main_hub_elongation(angle, presets),
                None => floor,
            };
            targets.raise(*edge, node.id, length, floor);
        }
    }

    let hinge_clearance = presets.hinge_clearance();
    for node in graph.nodes().filter(|n| !n.fixed) {
        let mut edges: Vec<EdgeId> = topology
            .sub_hubs_at_node(node.id)
            .flat_map(|h| h.edges.iter().copied())
            .chain(topology.hinges_at_node(node.id).flat_map(|h| h.edges()))
            .collect();
        edges.sort();
        edges.dedup();
        for edge in edges {
            if graph.require_edge(edge)?.is_dynamic() {
                continue;
            }
            targets.raise(edge, node.id, hinge_clearance, floor);
        }
    }

    debug!(edges = targets.len(), "elongation targets computed");
    Ok(targets)
}

// ============================================================================
// Solve
// ============================================================================

/// Final state of one edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElongationRecord {
    pub edge: EdgeId,
    pub first_node: NodeId,
    pub second_node: NodeId,
    pub first_target: Option<f64>,
    pub second_target: Option<f64>,
    pub first_elongation: f64,
    pub second_elongation: f64,
    pub elongation_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElongationReport {
    /// Relaxation batches applied.
    pub passes: usize,
    /// Length requests across all passes.
    pub requests: usize,
    pub records: Vec<ElongationRecord>,
}

impl ElongationReport {
    pub fn record(&self, edge: EdgeId) -> Option<&ElongationRecord> {
        self.records.iter().find(|r| r.edge == edge)
    }
}

fn request_for(
    graph: &TrussGraph,
    edge_id: EdgeId,
    per_node: &BTreeMap<NodeId, f64>,
    config: &ExportConfig,
) -> Result<Option<LengthRequest>> {
    let presets = &config.presets;
    let edge = graph.require_edge(edge_id)?;
    let (first, second) = (edge.first_elongation(), edge.second_elongation());
    let (mut new_first, mut new_second) = (first, second);

    for (node, target) in per_node {
        if graph.require_node(*node)?.fixed {
            return Err(Error::FixedNodeTargeted { node: *node, edge: edge_id });
        }
        if *node == edge.first {
            new_first = *target;
        } else if *node == edge.second {
            new_second = *target;
        } else {
            return Err(Error::NotIncident { node: *node, edge: edge_id });
        }
    }

    let too_short = new_first > first || new_second > second;
    let too_long = first > new_first + presets.shortening_band || second > new_second + presets.shortening_band;
    if !too_short && (!config.shorten_elongations || !too_long) {
        return Ok(None);
    }

    let total_old = first + second;
    let total_new = new_first + new_second;
    let ratio = if total_new > 0.0 { new_first / total_new } else { 0.5 };
    let offset = if too_short { presets.grow_step } else { -presets.shrink_step };

    Ok(Some(LengthRequest {
        edge: edge_id,
        length: graph.edge_length(edge_id)? - total_old + total_new + offset,
        elongation_ratio: Some(ratio),
    }))
}

/// Stretch edges until every target is met.
pub fn solve<R: Relaxation + ?Sized>(
    graph: &mut TrussGraph,
    targets: &ElongationTargets,
    relaxation: &mut R,
    config: &ExportConfig,
) -> Result<ElongationReport> {
    let mut report = ElongationReport::default();

    loop {
        let mut requests = Vec::new();
        for (edge, per_node) in targets.iter() {
            if let Some(request) = request_for(graph, edge, per_node, config)? {
                requests.push(request);
            }
        }
        if requests.is_empty() {
            break;
        }
        if report.passes >= config.max_elongation_passes {
            return Err(Error::NoConvergence { passes: report.passes, pending: requests.len() });
        }

        let relaxed = relaxation.apply_length_changes(graph, &requests)?;
        report.passes += 1;
        report.requests += requests.len();
        debug!(
            pass = report.passes,
            requests = requests.len(),
            moved = relaxed.moved_nodes,
            "elongation pass"
        );
    }

    report.records = graph
        .edges()
        .map(|e| ElongationRecord {
            edge: e.id,
            first_node: e.first,
            second_node: e.second,
            first_target: targets.get(e.id, e.first),
            second_target: targets.get(e.id, e.second),
            first_elongation: e.first_elongation(),
            second_elongation: e.second_elongation(),
            elongation_ratio: e.elongation_ratio(),
        })
        .collect();

    info!(passes = report.passes, requests = report.requests, "elongations settled");
    Ok(report)
}
