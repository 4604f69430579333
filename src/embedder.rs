//! Text embedders.
//!
//! An [`Embedder`] turns text into a fixed-length vector. The index never sees
//! text, so any implementation works as long as it keeps its dimensionality
//! fixed for the lifetime of the index it feeds:
//! - [`HashEmbedder`] - deterministic feature hashing, no model required
//! - [`OllamaEmbedder`] - remote embeddings over HTTP (feature `remote`)
//!
//! Implementations should not return a zero vector for non-empty input. The
//! index tolerates one, but it can never be found by similarity.

mod hash;
#[cfg(feature = "remote")]
mod ollama;

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

pub use hash::HashEmbedder;
#[cfg(feature = "remote")]
pub use ollama::OllamaEmbedder;

/// Identifies an embedder. Stored in snapshots so a reload with a different
/// model is caught instead of silently mixing vector spaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedderInfo {
    pub name: String,
    pub model: String,
    pub dimensions: usize,
}

impl EmbedderInfo {
    /// True when vectors from `other` live in the same space as ours.
    pub fn is_compatible(&self, other: &EmbedderInfo) -> bool {
        self == other
    }
}

impl fmt::Display for EmbedderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({} dims)", self.name, self.model, self.dimensions)
    }
}

/// Trait for text embedders.
pub trait Embedder: Send + Sync {
    fn info(&self) -> EmbedderInfo;

    fn dimensions(&self) -> usize {
        self.info().dimensions
    }

    /// Embeds `text` into a vector of [`Embedder::dimensions`] floats.
    ///
    /// # Errors
    /// Whatever went wrong producing the vector (network, model, decoding).
    fn embed(&self, text: &str) -> impl Future<Output = anyhow::Result<Vec<f32>>> + Send;
}
