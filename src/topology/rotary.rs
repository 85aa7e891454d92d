//! Rotary-hinge inset.
//!
//! Two rigid groups that share exactly two nodes turn about the line through
//! them. A hub cannot be welded to both bodies on that axis, so one group is
//! pulled in along the axis: its edges into each axis node are rerouted to a
//! fresh inset node a short distance inward, and the two inset nodes are
//! joined by a new edge that carries the rotation.
//!
//! Rerouting deletes every triangle on a removed edge, including the dynamic
//! ones that hold actuators. Their edge pairs are kept on the inset and
//! resolved against the rerouted edges by [`carried_hinge_pairs`], so the
//! actuator ends still get hinges.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Presets;
use crate::geometry::DEGENERATE_EPS;
use crate::graph::TrussGraph;
use crate::model::*;
use crate::rigidity::{GroupId, StaticGroup};
use crate::{Error, Result};

/// One applied inset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotaryInset {
    /// The shared axis nodes, ascending.
    pub axis: [NodeId; 2],
    /// The group that was moved off the axis.
    pub group: GroupId,
    /// The group left on the axis.
    pub partner: GroupId,
    /// `inset_nodes[i]` replaces `axis[i]` inside `group`.
    pub inset_nodes: [NodeId; 2],
    pub inset_edge: EdgeId,
    pub removed_edges: Vec<EdgeId>,
    /// `reconnected_edges[i]` replaces `removed_edges[i]`.
    pub reconnected_edges: Vec<EdgeId>,
    /// Sides of the dynamic triangles deleted by the reroute, as they were
    /// before it.
    pub broken_dynamic_triangles: Vec<[EdgeId; 3]>,
}

/// Edge pairs of dynamic triangles broken up by `insets`, mapped onto the
/// edges that replaced them. Only pairs that still meet at a node are
/// returned, as `(node, a, b)`.
pub fn carried_hinge_pairs(graph: &TrussGraph, insets: &[RotaryInset]) -> Vec<(NodeId, EdgeId, EdgeId)> {
    let rerouted: BTreeMap<EdgeId, EdgeId> = insets
        .iter()
        .flat_map(|i| i.removed_edges.iter().copied().zip(i.reconnected_edges.iter().copied()))
        .collect();
    // a later inset may reroute an edge an earlier one created
    let resolve = |mut edge: EdgeId| {
        while let Some(next) = rerouted.get(&edge) {
            edge = *next;
        }
        edge
    };

    let mut pairs = Vec::new();
    for sides in insets.iter().flat_map(|i| i.broken_dynamic_triangles.iter()) {
        let sides = (*sides).map(resolve);
        for (i, j) in [(0, 1), (0, 2), (1, 2)] {
            let (Some(a), Some(b)) = (graph.edge(sides[i]), graph.edge(sides[j])) else { continue };
            if !(a.is_dynamic() || b.is_dynamic()) {
                continue;
            }
            if let Some(node) = a.shared_node(b) {
                pairs.push((node, a.id, b.id));
            }
        }
    }
    pairs
}

/// Group pairs whose node sets meet in exactly two nodes. Other non-empty
/// intersections are reported and left alone.
pub fn find_axes(groups: &[StaticGroup]) -> Vec<(usize, usize)> {
    let mut axes = Vec::new();
    for i in 0..groups.len() {
        for j in (i + 1)..groups.len() {
            let shared = groups[i].shared_nodes(&groups[j]);
            match shared.len() {
                0 => {}
                2 => axes.push((i, j)),
                n => warn!(
                    first = %groups[i].id,
                    second = %groups[j].id,
                    shared = n,
                    "static groups share {n} nodes, geometry may not be buildable"
                ),
            }
        }
    }
    axes
}

/// Prefer the group without pods, then the one with fewer nodes, then the
/// later one.
fn choose_inset(graph: &TrussGraph, groups: &[StaticGroup], i: usize, j: usize) -> (usize, usize) {
    let key = |g: &StaticGroup| (g.has_pods(graph), g.nodes.len());
    if key(&groups[i]) < key(&groups[j]) { (i, j) } else { (j, i) }
}

/// Detect every rotation axis and inset one side of it.
pub fn apply_rotary_insets(
    graph: &mut TrussGraph,
    groups: &mut [StaticGroup],
    presets: &Presets,
) -> Result<Vec<RotaryInset>> {
    let mut insets = Vec::new();
    for (i, j) in find_axes(groups) {
        // an earlier inset may have changed either group
        let shared = groups[i].shared_nodes(&groups[j]);
        if shared.len() > 2 {
            return Err(Error::RotaryAxis(format!(
                "groups {} and {} share {} nodes",
                groups[i].id,
                groups[j].id,
                shared.len()
            )));
        }
        let &[p, q] = shared.as_slice() else {
            debug!(first = %groups[i].id, second = %groups[j].id, "axis dissolved by an earlier inset");
            continue;
        };

        let (moved, kept) = choose_inset(graph, groups, i, j);
        let partner = groups[kept].id;
        let inset = inset_group(graph, groups, moved, partner, [p, q], presets)?;
        info!(
            group = %inset.group,
            axis = ?inset.axis,
            inset_edge = %inset.inset_edge,
            "inset rotary hinge"
        );
        insets.push(inset);
    }
    Ok(insets)
}

fn inset_group(
    graph: &mut TrussGraph,
    groups: &mut [StaticGroup],
    index: usize,
    partner: GroupId,
    axis: [NodeId; 2],
    presets: &Presets,
) -> Result<RotaryInset> {
    let group_nodes = groups[index].nodes.clone();
    let axis_kind = graph
        .find_edge(axis[0], axis[1])
        .and_then(|e| graph.edge(e))
        .map_or(LinkKind::Rigid, |e| e.kind);

    let mut removed_edges = Vec::new();
    let mut reconnected_edges = Vec::new();
    let mut broken_dynamic_triangles = Vec::new();
    let mut inset_nodes = [axis[0]; 2];

    for (slot, (at, toward)) in [(axis[0], axis[1]), (axis[1], axis[0])].into_iter().enumerate() {
        let origin = graph.position(at)?;
        let along = graph.position(toward)? - origin;
        if along.norm() <= DEGENERATE_EPS {
            return Err(Error::DegeneratePose(format!("rotary axis {at}-{toward} has zero length")));
        }

        let into_group: Vec<(EdgeId, NodeId, LinkKind)> = graph
            .require_node(at)?
            .incidents()
            .iter()
            .filter_map(|e| graph.edge(*e))
            .filter_map(|e| Some((e.id, e.other_node(at)?, e.kind)))
            .filter(|(_, far, _)| *far != toward && group_nodes.contains(far))
            .collect();

        for (edge, _, _) in &into_group {
            let triangles = graph.require_edge(*edge)?.adjacent_triangles().to_vec();
            for t in triangles {
                if graph.is_triangle_dynamic(t) {
                    if let Ok(sides) = <[EdgeId; 3]>::try_from(graph.triangle_edges(t).as_slice()) {
                        broken_dynamic_triangles.push(sides);
                    }
                }
                graph.delete(t.into());
            }
            graph.delete((*edge).into());
            removed_edges.push(*edge);
        }

        let inset = graph.insert_node(origin + along.normalize() * presets.rotary_inset_distance);
        for (_, far, kind) in into_group {
            reconnected_edges.push(graph.create_edge(inset, far, kind)?);
        }
        inset_nodes[slot] = inset;
    }

    let inset_edge = graph.create_edge(inset_nodes[0], inset_nodes[1], axis_kind)?;

    let node_set: BTreeSet<NodeId> = group_nodes
        .iter()
        .copied()
        .filter(|n| !axis.contains(n))
        .chain(inset_nodes)
        .collect();
    let claimed: BTreeSet<TriangleId> = groups
        .iter()
        .enumerate()
        .filter(|(k, _)| *k != index)
        .flat_map(|(_, g)| g.triangles.iter().copied())
        .collect();
    let triangles: BTreeSet<TriangleId> = graph
        .triangles()
        .filter(|t| t.nodes.iter().all(|n| node_set.contains(n)))
        .map(|t| t.id)
        .filter(|t| !claimed.contains(t))
        .filter(|t| graph.is_triangle_complete(*t) && !graph.is_triangle_dynamic(*t))
        .collect();

    let group = &mut groups[index];
    group.triangles = triangles;
    group.refresh_nodes(graph);

    Ok(RotaryInset {
        axis,
        group: group.id,
        partner,
        inset_nodes,
        inset_edge,
        removed_edges,
        reconnected_edges,
        broken_dynamic_triangles,
    })
}
