//! # Topology Synthesizer
//!
//! Turns a rigidity partition into connector hardware: which edges meet in
//! a hub at each node, and which edge pairs need a hinge instead.
//!
//! Runs in two passes over the graph:
//!
//! 1. **Rotary inset** ([`rotary`]): groups hinged on a shared two-node axis
//!    are pulled apart so each body gets its own hubs.
//! 2. **Main pass** ([`hubs`]): groups in priority order (payload-bearing
//!    first, then larger first) claim their edges. Each (node, group) with
//!    three or more edges is a [`Hub`]; exactly two is a [`Hinge`]. Edge
//!    pairs inside a triangle that no single group claims become hinges,
//!    double when the triangle is dynamic. Actuator triangles an inset
//!    broke up still count, through the edges that replaced their sides.
//!
//! The first hub at a node in priority order is its main hub; every other
//! hub there is a sub-hub.

pub mod hubs;
pub mod rotary;

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Presets;
use crate::graph::TrussGraph;
use crate::model::*;
use crate::rigidity::{GroupId, StaticGroup};
use crate::Result;

pub use hubs::{hinge_angle, order_hub_edges};
pub use rotary::RotaryInset;

// ============================================================================
// Hardware
// ============================================================================

/// Edges of one static group meeting at one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hub {
    pub node: NodeId,
    pub group: GroupId,
    /// Greedy chain order, see [`order_hub_edges`].
    pub edges: Vec<EdgeId>,
    pub is_main: bool,
}

impl Hub {
    pub fn contains(&self, edge: EdgeId) -> bool {
        self.edges.contains(&edge)
    }
}

/// A rotational joint between two edges at a shared node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hinge {
    pub node: NodeId,
    pub a: EdgeId,
    pub b: EdgeId,
    /// The enclosing triangle has a dynamic side, so both edges turn.
    pub is_double: bool,
    /// Rest angle between the two edge directions at `node`, radians.
    /// This is the opening of the corner, not the dihedral between faces.
    pub angle: f64,
}

impl Hinge {
    pub fn edges(&self) -> [EdgeId; 2] {
        [self.a, self.b]
    }

    pub fn contains(&self, edge: EdgeId) -> bool {
        self.a == edge || self.b == edge
    }
}

// ============================================================================
// Topology
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    /// Static groups after insets, in priority order.
    pub groups: Vec<StaticGroup>,
    pub insets: Vec<RotaryInset>,
    pub hubs: Vec<Hub>,
    pub hinges: Vec<Hinge>,
    /// Edges each group claimed in the main pass.
    pub group_edges: BTreeMap<GroupId, BTreeSet<EdgeId>>,
}

impl Topology {
    pub fn hubs_at_node(&self, node: NodeId) -> impl Iterator<Item = &Hub> {
        self.hubs.iter().filter(move |h| h.node == node)
    }

    pub fn main_hub_at_node(&self, node: NodeId) -> Option<&Hub> {
        self.hubs_at_node(node).find(|h| h.is_main)
    }

    pub fn sub_hubs_at_node(&self, node: NodeId) -> impl Iterator<Item = &Hub> {
        self.hubs_at_node(node).filter(|h| !h.is_main)
    }

    pub fn hinges_at_node(&self, node: NodeId) -> impl Iterator<Item = &Hinge> {
        self.hinges.iter().filter(move |h| h.node == node)
    }

    /// Incident edges at `node` that do not plug into its main hub.
    pub fn non_main_hub_edges_at_node(&self, graph: &TrussGraph, node: NodeId) -> Vec<EdgeId> {
        let main = self.main_hub_at_node(node);
        graph
            .node(node)
            .map(|n| n.incidents().to_vec())
            .unwrap_or_default()
            .into_iter()
            .filter(|e| !main.is_some_and(|h| h.contains(*e)))
            .collect()
    }

    /// Nodes that carry any hardware, ascending.
    pub fn nodes(&self) -> BTreeSet<NodeId> {
        self.hubs.iter().map(|h| h.node).chain(self.hinges.iter().map(|h| h.node)).collect()
    }

    pub fn group(&self, id: GroupId) -> Option<&StaticGroup> {
        self.groups.iter().find(|g| g.id == id)
    }
}

/// Run the inset pre-pass and the main pass.
///
/// The graph is edited in place by the insets; on error it keeps whatever
/// insets were already applied.
pub fn synthesize(graph: &mut TrussGraph, mut groups: Vec<StaticGroup>, presets: &Presets) -> Result<Topology> {
    let insets = rotary::apply_rotary_insets(graph, &mut groups, presets)?;

    groups.retain(|g| {
        if g.is_empty() {
            warn!(group = %g.id, "static group lost all triangles during inset");
        }
        !g.is_empty()
    });
    groups.sort_by_cached_key(|g| (Reverse(g.bears_payload(graph)), Reverse(g.len())));

    let carried = rotary::carried_hinge_pairs(graph, &insets);
    let hubs::MainPass { hubs, mut hinges, group_edges } = hubs::main_pass(graph, &groups, &carried)?;
    hubs::orient_hinge_chains(&mut hinges);

    info!(
        groups = groups.len(),
        insets = insets.len(),
        hubs = hubs.len(),
        hinges = hinges.len(),
        "topology synthesized"
    );
    Ok(Topology { groups, insets, hubs, hinges, group_edges })
}
