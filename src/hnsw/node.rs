//! Node structure.

use serde::{Deserialize, Serialize};

/// Position of a node in the graph's node arena.
pub type Slot = usize;

/// An edge to another node, with the distance between the two cached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub node: Slot,
    pub distance: f32,
}

/// A node in the HNSW graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub vector: Vec<f32>,
    pub max_layer: usize,
    /// One list per layer, `0..=max_layer`.
    pub neighbors: Vec<Vec<Neighbor>>,
    /// Per layer, the older node this one is tied to when it was inserted.
    /// The edges in both directions between the two are never pruned, so the
    /// anchors of a layer form a spanning tree of it.
    #[serde(default)]
    pub anchors: Vec<Option<Slot>>,
}

impl Node {
    pub(crate) fn new(id: String, vector: Vec<f32>, max_layer: usize) -> Self {
        Node {
            id,
            vector,
            max_layer,
            neighbors: vec![Vec::new(); max_layer + 1],
            anchors: vec![None; max_layer + 1],
        }
    }

    pub fn neighbors(&self, layer: usize) -> &[Neighbor] {
        self.neighbors.get(layer).map_or(&[], Vec::as_slice)
    }

    pub fn anchor(&self, layer: usize) -> Option<Slot> {
        self.anchors.get(layer).copied().flatten()
    }
}
