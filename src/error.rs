//! Error types for the index and the embedding service.

use thiserror::Error;

/// Result type alias for semdex operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A vector does not have the dimensionality the graph was built with.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A vector holds a NaN or infinite component.
    #[error("vector component {position} is not finite")]
    NonFiniteVector { position: usize },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Failure reported by the embedder, passed through untouched.
    #[error(transparent)]
    Embedder(#[from] anyhow::Error),

    /// The snapshot was produced by a different embedder.
    #[error("embedder mismatch: snapshot was written by {expected}, got {actual}")]
    EmbedderMismatch { expected: String, actual: String },

    /// An entry id that does not follow the `<kind>:<entityId>` convention.
    #[error("invalid entry id: {0}")]
    InvalidId(String),

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("malformed snapshot json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::CorruptSnapshot(msg.into())
    }

    /// Returns true for errors caused by how the index or embedder was set up
    /// rather than by the data flowing through it.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::DimensionMismatch { .. }
                | Error::InvalidParams(_)
                | Error::EmbedderMismatch { .. }
        )
    }
}
