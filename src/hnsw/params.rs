//! Contains the HnswParams structure for configuring the index.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metric::Metric;

/// How a node's neighbor list is chosen from a candidate set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborSelection {
    /// Walk candidates nearest first and keep one only if it is closer to the
    /// base node than to every neighbor kept so far.
    #[default]
    Diverse,
    /// Like `Diverse`, then top up the free slots with the closest rejected
    /// candidates.
    DiverseKeepPruned,
    /// Keep the closest candidates.
    Closest,
}

/// Parameters for configuring the HNSW index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswParams {
    pub max_connections: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub metric: Metric,
    pub selection: NeighborSelection,
    pub seed: u64,
}

impl HnswParams {
    pub fn with_max_connections(self, max_connections: usize) -> Self {
        HnswParams {
            max_connections,
            ..self
        }
    }

    /// Degree bound at `layer`: `M` above the base layer, `2 * M` at layer 0.
    pub fn max_connections(&self, layer: usize) -> usize {
        if layer == 0 {
            self.max_connections * 2
        } else {
            self.max_connections
        }
    }

    pub fn with_ef_construction(self, ef_construction: usize) -> Self {
        HnswParams {
            ef_construction,
            ..self
        }
    }

    pub fn with_ef_search(self, ef_search: usize) -> Self {
        HnswParams { ef_search, ..self }
    }

    pub fn with_selection(self, selection: NeighborSelection) -> Self {
        HnswParams { selection, ..self }
    }

    pub fn with_seed(self, seed: u64) -> Self {
        HnswParams { seed, ..self }
    }

    pub fn with_metric(self, metric: Metric) -> Self {
        HnswParams { metric, ..self }
    }

    /// Normalisation factor `mL = 1 / ln(M)` of the level distribution.
    pub fn level_multiplier(&self) -> f64 {
        1.0 / (self.max_connections as f64).ln()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections < 2 {
            return Err(Error::InvalidParams(format!(
                "max_connections must be at least 2, got {}",
                self.max_connections
            )));
        }
        if self.ef_construction == 0 {
            return Err(Error::InvalidParams(
                "ef_construction must be positive".into(),
            ));
        }
        if self.ef_search == 0 {
            return Err(Error::InvalidParams("ef_search must be positive".into()));
        }
        Ok(())
    }
}

impl Default for HnswParams {
    fn default() -> Self {
        HnswParams {
            max_connections: 16,
            ef_construction: 200,
            ef_search: 64,
            metric: Metric::Cosine,
            selection: NeighborSelection::Diverse,
            seed: 42,
        }
    }
}
