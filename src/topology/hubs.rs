//! Hub and hinge placement.

use std::collections::{BTreeMap, BTreeSet};

use hashbrown::{HashMap, HashSet};
use tracing::debug;

use super::{Hinge, Hub};
use crate::geometry;
use crate::graph::TrussGraph;
use crate::model::*;
use crate::rigidity::{GroupId, StaticGroup};
use crate::Result;

/// Order a hub's edges as a greedy chain: start from the lowest id, then
/// keep appending the remaining edge most nearly parallel (by |dot|) to the
/// last one. Ties go to the lower id.
///
/// This approximates walking around the hub. It is not a true angular sort
/// about the hub normal.
pub fn order_hub_edges(graph: &TrussGraph, node: NodeId, edges: &[EdgeId]) -> Result<Vec<EdgeId>> {
    let mut remaining: Vec<(EdgeId, nalgebra::Vector3<f64>)> = edges
        .iter()
        .map(|e| Ok((*e, graph.edge_direction_from(*e, node)?)))
        .collect::<Result<_>>()?;
    remaining.sort_by_key(|(e, _)| *e);

    let mut ordered = Vec::with_capacity(remaining.len());
    if remaining.is_empty() {
        return Ok(ordered);
    }
    let (first, mut current) = remaining.remove(0);
    ordered.push(first);

    while !remaining.is_empty() {
        let mut best = 0;
        for (i, (_, dir)) in remaining.iter().enumerate() {
            // strict so the earlier (lower id) edge wins ties
            if dir.dot(&current).abs() > remaining[best].1.dot(&current).abs() {
                best = i;
            }
        }
        let (edge, dir) = remaining.remove(best);
        ordered.push(edge);
        current = dir;
    }
    Ok(ordered)
}

/// Angle between the two edges as seen from `node`.
pub fn hinge_angle(graph: &TrussGraph, node: NodeId, a: EdgeId, b: EdgeId) -> Result<f64> {
    let da = graph.edge_direction_from(a, node)?;
    let db = graph.edge_direction_from(b, node)?;
    Ok(geometry::angle_between(&da, &db))
}

fn make_hinge(graph: &TrussGraph, node: NodeId, a: EdgeId, b: EdgeId, is_double: bool) -> Result<Hinge> {
    Ok(Hinge {
        node,
        a,
        b,
        is_double,
        angle: hinge_angle(graph, node, a, b)?,
    })
}

pub(crate) struct MainPass {
    pub hubs: Vec<Hub>,
    pub hinges: Vec<Hinge>,
    pub group_edges: BTreeMap<GroupId, BTreeSet<EdgeId>>,
}

/// Emit hubs per (node, group) and hinges between groups. `groups` must
/// already be in priority order; an edge belongs to the first group that
/// claims it.
///
/// `carried` are `(node, a, b)` pairs from dynamic triangles an inset broke
/// up. They become double hinges like the triangle they came from.
pub(crate) fn main_pass(
    graph: &TrussGraph,
    groups: &[StaticGroup],
    carried: &[(NodeId, EdgeId, EdgeId)],
) -> Result<MainPass> {
    let mut processed: HashSet<EdgeId> = HashSet::new();
    let mut group_edges = BTreeMap::new();
    let mut hubs = Vec::new();
    let mut hinges = Vec::new();

    for group in groups {
        let edges: BTreeSet<EdgeId> = group
            .edges(graph)
            .into_iter()
            .filter(|e| !processed.contains(e))
            .collect();

        for node in &group.nodes {
            let at_node: Vec<EdgeId> = edges
                .iter()
                .copied()
                .filter(|e| graph.edge(*e).is_some_and(|e| e.contains(*node)))
                .collect();
            match at_node.len() {
                0 | 1 => {}
                2 => hinges.push(make_hinge(graph, *node, at_node[0], at_node[1], false)?),
                _ => hubs.push(Hub {
                    node: *node,
                    group: group.id,
                    edges: order_hub_edges(graph, *node, &at_node)?,
                    is_main: false,
                }),
            }
        }
        processed.extend(edges.iter().copied());
        group_edges.insert(group.id, edges);
    }

    let same_group = |a: EdgeId, b: EdgeId| group_edges.values().any(|s: &BTreeSet<EdgeId>| s.contains(&a) && s.contains(&b));

    let triangles: BTreeSet<TriangleId> = graph
        .edges()
        .flat_map(|e| e.adjacent_triangles().iter().copied())
        .collect();
    for t in triangles {
        let sides = graph.triangle_edges(t);
        let is_double = graph.is_triangle_dynamic(t);
        for i in 0..sides.len() {
            for j in (i + 1)..sides.len() {
                let (a, b) = (sides[i], sides[j]);
                if same_group(a, b) {
                    continue;
                }
                let (Some(ea), Some(eb)) = (graph.edge(a), graph.edge(b)) else { continue };
                let Some(node) = ea.shared_node(eb) else { continue };
                hinges.push(make_hinge(graph, node, a, b, is_double)?);
            }
        }
    }
    for (node, a, b) in carried {
        if !same_group(*a, *b) {
            hinges.push(make_hinge(graph, *node, *a, *b, true)?);
        }
    }

    for (node, hub) in first_hub_per_node(&hubs) {
        debug!(node = %node, group = %hubs[hub].group, "main hub");
        hubs[hub].is_main = true;
    }

    Ok(MainPass { hubs, hinges: dedup_hinges(hinges), group_edges })
}

/// Hubs are emitted in group priority order, so the first at each node is
/// the main hub.
fn first_hub_per_node(hubs: &[Hub]) -> BTreeMap<NodeId, usize> {
    let mut first = BTreeMap::new();
    for (i, hub) in hubs.iter().enumerate() {
        first.entry(hub.node).or_insert(i);
    }
    first
}

/// One hinge per (node, edge pair). Duplicates fold into the first, which
/// becomes double if any duplicate was.
pub(crate) fn dedup_hinges(hinges: Vec<Hinge>) -> Vec<Hinge> {
    let mut seen: HashMap<(NodeId, EdgeId, EdgeId), usize> = HashMap::new();
    let mut out: Vec<Hinge> = Vec::with_capacity(hinges.len());
    for hinge in hinges {
        let key = (hinge.node, hinge.a.min(hinge.b), hinge.a.max(hinge.b));
        match seen.get(&key) {
            Some(i) => out[*i].is_double |= hinge.is_double,
            None => {
                seen.insert(key, out.len());
                out.push(hinge);
            }
        }
    }
    out
}

/// At each node hinges link edges into paths and rings. Walk each one and
/// point every hinge from the edge we came from (`a`) to the next (`b`), so
/// an edge ends up as `a` of at most one hinge and `b` of at most one.
///
/// Edges joined to more than two hinges stop the walk; the hinges around
/// them keep whatever orientation they had.
pub(crate) fn orient_hinge_chains(hinges: &mut [Hinge]) {
    let mut by_node: BTreeMap<NodeId, Vec<usize>> = BTreeMap::new();
    for (i, h) in hinges.iter().enumerate() {
        by_node.entry(h.node).or_default().push(i);
    }

    for indices in by_node.values() {
        let mut links: BTreeMap<EdgeId, Vec<usize>> = BTreeMap::new();
        for i in indices {
            links.entry(hinges[*i].a).or_default().push(*i);
            links.entry(hinges[*i].b).or_default().push(*i);
        }

        // path ends first, then whatever rings are left
        let mut starts: Vec<EdgeId> = links.iter().filter(|(_, l)| l.len() == 1).map(|(e, _)| *e).collect();
        starts.extend(links.iter().filter(|(_, l)| l.len() == 2).map(|(e, _)| *e));

        let mut visited: HashSet<usize> = HashSet::new();
        for start in starts {
            let mut current = start;
            loop {
                let Some(next) = links[&current].iter().copied().find(|i| !visited.contains(i)) else { break };
                visited.insert(next);
                let hinge = &mut hinges[next];
                let other = if hinge.a == current { hinge.b } else { hinge.a };
                hinge.a = current;
                hinge.b = other;
                current = other;
                if links[&current].len() > 2 {
                    break;
                }
            }
        }
    }
}
