//! Main HNSW implementation.
//!
//! Nodes live in an arena and edges point at arena slots. Adding an id that is
//! already present appends a fresh node and marks the older one as superseded:
//! superseded nodes keep routing searches but are never returned. Nothing is
//! ever unlinked; a rebuild is the only way to drop physical nodes.

pub mod node;
pub mod params;
pub mod snapshot;

use std::{
    cmp::{Ordering, Reverse},
    collections::{BinaryHeap, HashMap, HashSet},
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use node::{Neighbor, Node, Slot};
use params::{HnswParams, NeighborSelection};

/// Hard cap on drawn levels.
const MAX_LEVEL: usize = 16;

/// A search hit: the id and its distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    slot: Slot,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.slot.cmp(&other.slot))
    }
}

/// Hierarchical Navigable Small World (HNSW) index for float vectors.
#[derive(Debug)]
pub struct Hnsw {
    nodes: Vec<Node>,
    latest: HashMap<String, Slot>,
    entry_point: Option<Slot>,
    top_layer: usize,
    dimensions: usize,
    params: HnswParams,
    rng: StdRng,
}

impl Hnsw {
    /// Creates a new index whose random source is seeded from `params.seed`.
    pub fn new(dimensions: usize, params: HnswParams) -> Result<Self> {
        let rng = StdRng::seed_from_u64(params.seed);
        Self::with_rng(dimensions, params, rng)
    }

    /// Creates a new index drawing node levels from `rng`.
    pub fn with_rng(dimensions: usize, params: HnswParams, rng: StdRng) -> Result<Self> {
        params.validate()?;
        if dimensions == 0 {
            return Err(Error::InvalidParams("dimensions must be positive".into()));
        }
        Ok(Hnsw {
            nodes: Vec::new(),
            latest: HashMap::new(),
            entry_point: None,
            top_layer: 0,
            dimensions,
            params,
            rng,
        })
    }

    /// Returns the number of distinct ids in the index.
    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// Returns the number of nodes in the graph, superseded ones included.
    pub fn physical_len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of nodes shadowed by a later insert of the same id.
    pub fn superseded_count(&self) -> usize {
        self.nodes.len() - self.latest.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.latest.contains_key(id)
    }

    /// Returns the most recently inserted vector for `id`.
    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.latest
            .get(id)
            .map(|&slot| self.nodes[slot].vector.as_slice())
    }

    /// Returns an iterator over the live `(id, vector)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(slot, _)| self.is_latest(*slot))
            .map(|(_, node)| (node.id.as_str(), node.vector.as_slice()))
    }

    /// Raw node arena, superseded nodes included.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn entry_point(&self) -> Option<Slot> {
        self.entry_point
    }

    pub fn top_layer(&self) -> usize {
        self.top_layer
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    /// Inserts a vector under `id`.
    pub fn insert(&mut self, id: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        self.check_dimensions(&vector)?;
        let id = id.into();
        let slot = self.nodes.len();

        let Some(entry_point) = self.entry_point else {
            self.nodes.push(Node::new(id.clone(), vector, 0));
            self.latest.insert(id, slot);
            self.entry_point = Some(slot);
            self.top_layer = 0;
            return Ok(());
        };

        let node_level = self.random_level();
        debug!(%id, slot, node_level, "inserting node");

        let mut entry_points = vec![self.candidate(&vector, entry_point)];
        for layer in (node_level + 1..=self.top_layer).rev() {
            entry_points = vec![self.greedy_closest(&vector, entry_points[0], layer)];
        }

        self.nodes.push(Node::new(id.clone(), vector, node_level));

        for layer in (0..=node_level.min(self.top_layer)).rev() {
            let candidates = self.search_layer(
                &self.nodes[slot].vector,
                &entry_points,
                self.params.ef_construction,
                layer,
            );
            let bound = self.params.max_connections(layer);
            let mut selected = self.select_neighbors(&candidates, bound);

            let anchor = self.anchor_for(&self.nodes[slot].vector, &candidates, layer);
            if let Some(anchor) = anchor {
                self.nodes[slot].anchors[layer] = Some(anchor.node);
                if !selected.iter().any(|n| n.node == anchor.node) {
                    if selected.len() >= bound {
                        selected.pop();
                    }
                    selected.push(anchor);
                }
            }

            for neighbor in &selected {
                self.connect(
                    neighbor.node,
                    Neighbor {
                        node: slot,
                        distance: neighbor.distance,
                    },
                    layer,
                );
            }
            self.nodes[slot].neighbors[layer] = selected;

            entry_points = candidates;
        }

        if node_level > self.top_layer {
            debug!(%id, slot, node_level, "promoting node to entry point");
            self.top_layer = node_level;
            self.entry_point = Some(slot);
        }

        self.latest.insert(id, slot);
        Ok(())
    }

    /// Searches for the k nearest neighbors of `query` using the configured
    /// `ef_search` beam width.
    pub fn search_default(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.search(query, k, self.params.ef_search)
    }

    /// Searches for the k nearest neighbors of `query`, keeping `ef` candidates
    /// at the base layer. Results are ascending by distance.
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<SearchResult>> {
        self.check_dimensions(query)?;
        let Some(entry_point) = self.entry_point else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut closest = self.candidate(query, entry_point);
        for layer in (1..=self.top_layer).rev() {
            closest = self.greedy_closest(query, closest, layer);
        }

        // Superseded nodes may take up room in the beam.
        let width = ef.max(k.saturating_add(self.superseded_count()));
        let found = self.search_layer(query, &[closest], width, 0);

        Ok(found
            .into_iter()
            .filter(|c| self.is_latest(c.slot))
            .take(k)
            .map(|c| SearchResult {
                id: self.nodes[c.slot].id.clone(),
                distance: c.distance,
            })
            .collect())
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        if let Some(position) = vector.iter().position(|x| !x.is_finite()) {
            return Err(Error::NonFiniteVector { position });
        }
        Ok(())
    }

    fn is_latest(&self, slot: Slot) -> bool {
        self.latest.get(&self.nodes[slot].id) == Some(&slot)
    }

    fn candidate(&self, query: &[f32], slot: Slot) -> Candidate {
        Candidate {
            distance: self.params.metric.distance(query, &self.nodes[slot].vector),
            slot,
        }
    }

    fn random_level(&mut self) -> usize {
        // 1 - [0, 1) keeps ln() finite.
        let uniform = 1.0 - self.rng.gen::<f64>();
        let level = (-uniform.ln() * self.params.level_multiplier()).floor() as usize;
        level.min(MAX_LEVEL)
    }

    /// Walks to the single nearest node reachable at `layer`, stopping once no
    /// neighbor improves on the current one.
    fn greedy_closest(&self, query: &[f32], start: Candidate, layer: usize) -> Candidate {
        let mut best = start;
        let mut changed = true;
        while changed {
            changed = false;
            for neighbor in self.nodes[best.slot].neighbors(layer) {
                let candidate = self.candidate(query, neighbor.node);
                if candidate.distance < best.distance {
                    best = candidate;
                    changed = true;
                }
            }
        }
        best
    }

    /// Nodes tied to `slot` as their anchor at `layer`.
    fn children(&self, slot: Slot, layer: usize) -> impl Iterator<Item = Slot> + '_ {
        self.nodes[slot]
            .neighbors(layer)
            .iter()
            .map(|n| n.node)
            .filter(move |&n| self.nodes[n].anchor(layer) == Some(slot))
    }

    fn is_anchored(&self, a: Slot, b: Slot, layer: usize) -> bool {
        self.nodes[a].anchor(layer) == Some(b) || self.nodes[b].anchor(layer) == Some(a)
    }

    /// Picks the node a new node is anchored to at `layer`: the nearest
    /// candidate that can take another child, or else the nearest leaf below
    /// the closest candidate. A node keeps at most `bound - 1` children so
    /// that its anchored edges plus the one to its own anchor fit in its list.
    fn anchor_for(
        &self,
        query: &[f32],
        candidates: &[Candidate],
        layer: usize,
    ) -> Option<Neighbor> {
        let limit = self.params.max_connections(layer).saturating_sub(1);
        let has_room = |slot: Slot| self.children(slot, layer).count() < limit;

        let mut current = match candidates.iter().find(|c| has_room(c.slot)) {
            Some(&found) => found,
            None => *candidates.first()?,
        };
        // Children always sit in later slots, so the walk ends at a leaf.
        while !has_room(current.slot) {
            current = self
                .children(current.slot, layer)
                .map(|child| self.candidate(query, child))
                .min()?;
        }
        Some(Neighbor {
            node: current.slot,
            distance: current.distance,
        })
    }

    /// Beam search at one layer. Returns at most `ef` candidates, nearest first.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[Candidate],
        ef: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        let mut visited: HashSet<Slot> = HashSet::new();
        let mut frontier = BinaryHeap::new();
        let mut best: BinaryHeap<Candidate> = BinaryHeap::new();

        for &entry in entry_points {
            if visited.insert(entry.slot) {
                frontier.push(Reverse(entry));
                best.push(entry);
                if best.len() > ef {
                    best.pop();
                }
            }
        }

        while let Some(Reverse(current)) = frontier.pop() {
            if best.len() >= ef {
                if let Some(worst) = best.peek() {
                    if current.distance > worst.distance {
                        break;
                    }
                }
            }

            for neighbor in self.nodes[current.slot].neighbors(layer) {
                if !visited.insert(neighbor.node) {
                    continue;
                }
                let candidate = self.candidate(query, neighbor.node);
                let admit = best.len() < ef
                    || best
                        .peek()
                        .map_or(true, |worst| candidate.distance < worst.distance);
                if admit {
                    frontier.push(Reverse(candidate));
                    best.push(candidate);
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        best.into_sorted_vec()
    }

    /// Picks up to `bound` neighbors from `candidates`, which must be sorted
    /// nearest first relative to the base node.
    fn select_neighbors(&self, candidates: &[Candidate], bound: usize) -> Vec<Neighbor> {
        let to_neighbor = |c: &Candidate| Neighbor {
            node: c.slot,
            distance: c.distance,
        };

        if self.params.selection == NeighborSelection::Closest {
            return candidates.iter().take(bound).map(to_neighbor).collect();
        }

        let mut selected: Vec<Neighbor> = Vec::with_capacity(bound);
        let mut pruned = Vec::new();
        for candidate in candidates {
            if selected.len() >= bound {
                break;
            }
            let vector = &self.nodes[candidate.slot].vector;
            let diverse = selected.iter().all(|kept| {
                self.params
                    .metric
                    .distance(vector, &self.nodes[kept.node].vector)
                    >= candidate.distance
            });
            if diverse {
                selected.push(to_neighbor(candidate));
            } else {
                pruned.push(to_neighbor(candidate));
            }
        }

        if self.params.selection == NeighborSelection::DiverseKeepPruned {
            let free = bound.saturating_sub(selected.len());
            selected.extend(pruned.into_iter().take(free));
        }

        selected
    }

    /// Adds the edge `target -> edge.node` at `layer`, re-pruning the target's
    /// list when it grows past the degree bound.
    fn connect(&mut self, target: Slot, edge: Neighbor, layer: usize) {
        let bound = self.params.max_connections(layer);
        let Some(list) = self.nodes[target].neighbors.get_mut(layer) else {
            return;
        };
        if list.iter().any(|n| n.node == edge.node) {
            return;
        }
        list.push(edge);
        if list.len() <= bound {
            return;
        }

        // Anchored edges are exempt from pruning.
        let (mut kept, rest): (Vec<Neighbor>, Vec<Neighbor>) = std::mem::take(list)
            .into_iter()
            .partition(|n| self.is_anchored(target, n.node, layer));
        let mut candidates: Vec<Candidate> = rest
            .into_iter()
            .map(|n| Candidate {
                distance: n.distance,
                slot: n.node,
            })
            .collect();
        candidates.sort();
        let before = kept.len() + candidates.len();
        let free = bound.saturating_sub(kept.len());
        kept.extend(self.select_neighbors(&candidates, free));
        trace!(
            node = target,
            layer,
            before,
            after = kept.len(),
            "pruned neighbors"
        );
        self.nodes[target].neighbors[layer] = kept;
    }
}
