//! semdex
//!
//! semdex is a Hierarchical Navigable Small World (HNSW) index for approximate
//! nearest neighbor search over text embeddings, plus the service that keeps
//! an embedder, the graph and a metadata table in step and persists them as
//! a single JSON snapshot.

pub mod embedder;
mod error;
mod hnsw;
pub mod metric;
pub mod service;

pub use embedder::{Embedder, EmbedderInfo, HashEmbedder};
#[cfg(feature = "remote")]
pub use embedder::OllamaEmbedder;
pub use error::{Error, Result};
pub use hnsw::node::{Neighbor, Node, Slot};
pub use hnsw::params::{HnswParams, NeighborSelection};
pub use hnsw::snapshot::GraphSnapshot;
pub use hnsw::{Hnsw, SearchResult};
pub use metric::Metric;
pub use service::{
    EmbeddingService, EntityKind, EntryId, Metadata, MetadataEntry, SearchHit, SearchOptions,
    ServiceSnapshot,
};
