//! Verbatim graph snapshots.
//!
//! A snapshot restores neighbor lists exactly as they were written, so a loaded
//! graph answers queries identically to the one that was saved. Loading never
//! repairs anything: a snapshot that breaks a structural invariant is rejected.

use std::collections::HashMap;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::node::{Node, Slot};
use super::params::HnswParams;
use super::Hnsw;
use crate::error::{Error, Result};

/// Serializable form of an [`Hnsw`] graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(flatten)]
    pub params: HnswParams,
    pub dimensions: usize,
    pub entry_point: Option<Slot>,
    pub top_layer: usize,
    pub nodes: Vec<Node>,
}

impl Hnsw {
    pub fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            params: self.params.clone(),
            dimensions: self.dimensions,
            entry_point: self.entry_point,
            top_layer: self.top_layer,
            nodes: self.nodes.clone(),
        }
    }

    /// Rebuilds a graph node for node from `snapshot`.
    ///
    /// The random source is reseeded from the stored seed offset by the node
    /// count, so inserts after a reload draw reproducible levels.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self> {
        snapshot.validate()?;

        let GraphSnapshot {
            params,
            dimensions,
            entry_point,
            top_layer,
            nodes,
        } = snapshot;

        let mut latest = HashMap::with_capacity(nodes.len());
        for (slot, node) in nodes.iter().enumerate() {
            latest.insert(node.id.clone(), slot);
        }

        let rng = StdRng::seed_from_u64(params.seed.wrapping_add(nodes.len() as u64));
        Ok(Hnsw {
            nodes,
            latest,
            entry_point,
            top_layer,
            dimensions,
            params,
            rng,
        })
    }
}

impl GraphSnapshot {
    /// Checks every structural invariant of the graph.
    pub fn validate(&self) -> Result<()> {
        self.params
            .validate()
            .map_err(|err| Error::corrupt(err.to_string()))?;
        if self.dimensions == 0 {
            return Err(Error::corrupt("dimensions must be positive"));
        }

        let count = self.nodes.len();
        for (slot, node) in self.nodes.iter().enumerate() {
            if node.vector.len() != self.dimensions {
                return Err(Error::corrupt(format!(
                    "node {slot} ({}) has {} dimensions, expected {}",
                    node.id,
                    node.vector.len(),
                    self.dimensions
                )));
            }
            if node.vector.iter().any(|x| !x.is_finite()) {
                return Err(Error::corrupt(format!(
                    "node {slot} ({}) holds a non-finite component",
                    node.id
                )));
            }
            if node.max_layer > self.top_layer {
                return Err(Error::corrupt(format!(
                    "node {slot} sits at layer {} above the top layer {}",
                    node.max_layer, self.top_layer
                )));
            }
            if node.neighbors.len() != node.max_layer + 1 {
                return Err(Error::corrupt(format!(
                    "node {slot} has {} neighbor lists for max layer {}",
                    node.neighbors.len(),
                    node.max_layer
                )));
            }

            for (layer, list) in node.neighbors.iter().enumerate() {
                let bound = self.params.max_connections(layer);
                if list.len() > bound {
                    return Err(Error::corrupt(format!(
                        "node {slot} has {} neighbors at layer {layer}, bound is {bound}",
                        list.len()
                    )));
                }
                for neighbor in list {
                    let target = self.nodes.get(neighbor.node).ok_or_else(|| {
                        Error::corrupt(format!(
                            "node {slot} points at missing node {} (of {count})",
                            neighbor.node
                        ))
                    })?;
                    if neighbor.node == slot || target.max_layer < layer {
                        return Err(Error::corrupt(format!(
                            "node {slot} has an invalid edge to {} at layer {layer}",
                            neighbor.node
                        )));
                    }
                    if neighbor.distance.is_nan() {
                        return Err(Error::corrupt(format!(
                            "node {slot} caches a NaN distance"
                        )));
                    }
                }
            }

            if !node.anchors.is_empty() && node.anchors.len() != node.neighbors.len() {
                return Err(Error::corrupt(format!(
                    "node {slot} has {} anchors for {} layers",
                    node.anchors.len(),
                    node.neighbors.len()
                )));
            }
            for (layer, anchor) in node.anchors.iter().enumerate() {
                let Some(anchor) = *anchor else {
                    continue;
                };
                let linked = anchor < slot
                    && self.nodes[anchor].max_layer >= layer
                    && node.neighbors(layer).iter().any(|n| n.node == anchor)
                    && self.nodes[anchor]
                        .neighbors(layer)
                        .iter()
                        .any(|n| n.node == slot);
                if !linked {
                    return Err(Error::corrupt(format!(
                        "node {slot} lost an edge to its anchor {anchor} at layer {layer}"
                    )));
                }
            }
        }

        match self.entry_point {
            None if count == 0 && self.top_layer == 0 => Ok(()),
            None => Err(Error::corrupt("non-empty graph without an entry point")),
            Some(entry) => {
                let node = self.nodes.get(entry).ok_or_else(|| {
                    Error::corrupt(format!("entry point {entry} does not exist"))
                })?;
                if node.max_layer != self.top_layer {
                    return Err(Error::corrupt(format!(
                        "entry point sits at layer {}, top layer is {}",
                        node.max_layer, self.top_layer
                    )));
                }
                Ok(())
            }
        }
    }
}
