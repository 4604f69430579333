//! Embedding service: an [`Embedder`], an [`Hnsw`] graph and a metadata table
//! joined by id.
//!
//! The graph has no update-in-place and no delete. Re-adding an id inserts a
//! second node and shadows the first; [`EmbeddingService::remove`] only drops
//! the metadata row and leaves a tombstone in the graph. Both are filtered out
//! of search results, and both are reclaimed by [`EmbeddingService::reindex`]
//! or [`EmbeddingService::compact`].
//!
//! One service belongs to one owner (say, one user session). Mutating calls
//! take `&mut self`; hosts that share an instance across tasks must serialize
//! access themselves.

mod entry;
mod snapshot;

use std::collections::BTreeMap;

use anyhow::anyhow;
use chrono::Utc;
use tracing::{debug, info, trace, warn};

use crate::embedder::Embedder;
use crate::error::{Error, Result};
use crate::hnsw::{params::HnswParams, Hnsw};

pub use entry::{EntityKind, EntryId, Metadata, MetadataEntry};
pub use snapshot::{ServiceSnapshot, FORMAT_VERSION};

/// A search hit joined with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub distance: f32,
    pub metadata: MetadataEntry,
}

/// Per-query knobs for [`EmbeddingService::search_with`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Beam width; defaults to the index's `ef_search`.
    pub ef: Option<usize>,
    /// Keep only hits of these kinds. The graph search widens until `k`
    /// matching hits are found or every live entry has been seen.
    pub kinds: Option<Vec<EntityKind>>,
}

impl SearchOptions {
    pub fn with_ef(self, ef: usize) -> Self {
        SearchOptions {
            ef: Some(ef),
            ..self
        }
    }

    pub fn with_kinds(self, kinds: impl IntoIterator<Item = EntityKind>) -> Self {
        SearchOptions {
            kinds: Some(kinds.into_iter().collect()),
            ..self
        }
    }

    fn matches(&self, entry: &MetadataEntry) -> bool {
        self.kinds
            .as_ref()
            .map_or(true, |kinds| kinds.contains(&entry.kind))
    }
}

pub struct EmbeddingService<E> {
    embedder: E,
    index: Hnsw,
    metadata: BTreeMap<String, MetadataEntry>,
}

impl<E: Embedder> EmbeddingService<E> {
    /// Creates an empty service whose graph takes its dimensionality from
    /// `embedder`.
    pub fn new(embedder: E, params: HnswParams) -> Result<Self> {
        let index = Hnsw::new(embedder.dimensions(), params)?;
        Ok(EmbeddingService {
            embedder,
            index,
            metadata: BTreeMap::new(),
        })
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn index(&self) -> &Hnsw {
        &self.index
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&MetadataEntry> {
        self.metadata.get(id)
    }

    /// Number of ids still in the graph whose metadata has been removed.
    pub fn tombstone_count(&self) -> usize {
        self.index.len().saturating_sub(self.metadata.len())
    }

    /// Embeds `text` and indexes it under `id`, replacing any metadata already
    /// stored for that id.
    pub async fn add(
        &mut self,
        id: impl Into<String>,
        text: impl Into<String>,
        metadata: Metadata,
    ) -> Result<()> {
        let id = id.into();
        let text = text.into();

        let vector = self.embed(&text).await?;
        self.index.insert(id.clone(), vector)?;

        let entry = MetadataEntry {
            text,
            kind: metadata.kind,
            fields: metadata.fields,
            updated_at: Utc::now(),
        };
        if self.metadata.insert(id.clone(), entry).is_some() {
            debug!(%id, superseded = self.index.superseded_count(), "re-added entry");
        }
        Ok(())
    }

    /// Returns the `k` live entries closest in meaning to `query`.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        self.search_with(query, k, &SearchOptions::default()).await
    }

    pub async fn search_with(
        &self,
        query: &str,
        k: usize,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let vector = self.embed(query).await?;
        let ef = options.ef.unwrap_or(self.index.params().ef_search);

        // Tombstones still occupy result slots in the graph.
        let mut fetch = k.saturating_add(self.tombstone_count());
        loop {
            let found = self.index.search(&vector, fetch, ef)?;
            let exhausted = found.len() < fetch || fetch >= self.index.len();

            let hits: Vec<SearchHit> = found
                .into_iter()
                .filter_map(|hit| {
                    let metadata = self.metadata.get(&hit.id)?;
                    Some(SearchHit {
                        id: hit.id,
                        distance: hit.distance,
                        metadata: metadata.clone(),
                    })
                })
                .filter(|hit| options.matches(&hit.metadata))
                .take(k)
                .collect();

            if hits.len() >= k || exhausted || options.kinds.is_none() {
                return Ok(hits);
            }
            trace!(fetch, found = hits.len(), k, "widening filtered search");
            fetch = fetch.saturating_mul(2);
        }
    }

    /// Drops the metadata for `id`. The graph node stays behind as a tombstone
    /// until the next rebuild.
    pub fn remove(&mut self, id: &str) -> Option<MetadataEntry> {
        let removed = self.metadata.remove(id)?;
        let tombstones = self.tombstone_count();
        debug!(%id, tombstones, "removed entry");
        if tombstones > self.metadata.len() {
            warn!(
                tombstones,
                live = self.metadata.len(),
                "tombstones outnumber live entries; reindex to reclaim them"
            );
        }
        Some(removed)
    }

    /// Re-embeds every live entry into a fresh graph.
    ///
    /// The current graph stays in place until the rebuild succeeds, so an
    /// embedder failure leaves the service untouched.
    pub async fn reindex(&mut self) -> Result<()> {
        let mut index = Hnsw::new(self.index.dimensions(), self.index.params().clone())?;
        for (id, entry) in &self.metadata {
            let vector = self.embed(&entry.text).await?;
            index.insert(id.clone(), vector)?;
        }
        self.replace_index(index);
        Ok(())
    }

    /// Rebuilds the graph from the vectors it already holds for live entries,
    /// without calling the embedder.
    pub fn compact(&mut self) -> Result<()> {
        let mut index = Hnsw::new(self.index.dimensions(), self.index.params().clone())?;
        for (id, vector) in self.index.iter() {
            if self.metadata.contains_key(id) {
                index.insert(id, vector.to_vec())?;
            }
        }
        self.replace_index(index);
        Ok(())
    }

    fn replace_index(&mut self, index: Hnsw) {
        info!(
            entries = index.len(),
            dropped = self.index.physical_len().saturating_sub(index.physical_len()),
            "rebuilt index"
        );
        self.index = index;
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.embedder.embed(text).await?;
        if vector.len() != self.index.dimensions() {
            return Err(Error::DimensionMismatch {
                expected: self.index.dimensions(),
                actual: vector.len(),
            });
        }
        if let Some(position) = vector.iter().position(|x| !x.is_finite()) {
            let err = anyhow!("embedder returned a non-finite value at component {position}");
            return Err(err.into());
        }
        Ok(vector)
    }
}
