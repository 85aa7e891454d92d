//! Serializable snapshot of a [`TrussGraph`].
//!
//! Ids in a record are only meaningful inside that record; loading remaps
//! them onto fresh store ids.

use std::collections::BTreeMap;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use super::TrussGraph;
use crate::config::Presets;
use crate::model::{LinkKind, NodeId};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodRecord {
    pub direction: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u64,
    pub position: [f64; 3],
    #[serde(default)]
    pub fixed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pods: Vec<PodRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub first: u64,
    pub second: u64,
    pub kind: LinkKind,
    /// Absent elongations fall back to the store's minimum at both ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elongations: Option<[f64; 2]>,
}

/// A whole structure as plain data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphRecord {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
    /// Triangles that exist without all three edges. Complete triangles are
    /// recreated by the edges themselves.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triangles: Vec<[u64; 3]>,
}

impl GraphRecord {
    pub fn capture(graph: &TrussGraph) -> Self {
        let nodes = graph
            .nodes()
            .map(|n| NodeRecord {
                id: n.id.0,
                position: n.position.coords.into(),
                fixed: n.fixed,
                pods: n.pods().iter().map(|p| PodRecord { direction: p.direction.into() }).collect(),
            })
            .collect();
        let edges = graph
            .edges()
            .map(|e| EdgeRecord {
                first: e.first.0,
                second: e.second.0,
                kind: e.kind,
                elongations: Some([e.first_elongation(), e.second_elongation()]),
            })
            .collect();
        let triangles = graph
            .triangles()
            .filter(|t| !graph.is_triangle_complete(t.id))
            .map(|t| t.nodes.map(|n| n.0))
            .collect();
        Self { nodes, edges, triangles }
    }

    /// Rebuild a store. Nodes are inserted verbatim, without merging.
    pub fn build(&self, presets: &Presets) -> Result<TrussGraph> {
        let mut graph = TrussGraph::with_presets(presets);
        let mut ids: BTreeMap<u64, NodeId> = BTreeMap::new();

        for n in &self.nodes {
            let id = graph.insert_node(Point3::from(n.position));
            if ids.insert(n.id, id).is_some() {
                return Err(Error::InvalidRecord(format!("duplicate node id {}", n.id)));
            }
            graph.set_fixed(id, n.fixed)?;
            for pod in &n.pods {
                graph.add_pod(id, Vector3::from(pod.direction))?;
            }
        }

        let lookup = |raw: u64| {
            ids.get(&raw)
                .copied()
                .ok_or_else(|| Error::InvalidRecord(format!("reference to unknown node {raw}")))
        };

        for e in &self.edges {
            let edge = graph.create_edge(lookup(e.first)?, lookup(e.second)?, e.kind)?;
            if let Some([first, second]) = e.elongations {
                graph.set_elongations(edge, first, second)?;
            }
        }
        for [a, b, c] in &self.triangles {
            graph.create_triangle(lookup(*a)?, lookup(*b)?, lookup(*c)?)?;
        }
        Ok(graph)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
