//! Whole-service persistence.
//!
//! The snapshot is the only thing a host writes to durable storage: graph,
//! metadata table and the descriptor of the embedder that produced the
//! vectors. The embedder itself is supplied again at load time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{EmbeddingService, MetadataEntry};
use crate::embedder::{Embedder, EmbedderInfo};
use crate::error::{Error, Result};
use crate::hnsw::{snapshot::GraphSnapshot, Hnsw};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub format_version: u32,
    pub embedder: EmbedderInfo,
    pub index: GraphSnapshot,
    pub metadata: BTreeMap<String, MetadataEntry>,
}

impl<E: Embedder> EmbeddingService<E> {
    pub fn to_snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            format_version: FORMAT_VERSION,
            embedder: self.embedder.info(),
            index: self.index.to_snapshot(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_snapshot())?)
    }

    /// Restores a service from `snapshot`, bound to `embedder`.
    ///
    /// Neighbor lists are taken as stored, not recomputed. Fails if the
    /// snapshot is structurally broken or was written by an embedder that
    /// does not match `embedder`.
    pub fn from_snapshot(snapshot: ServiceSnapshot, embedder: E) -> Result<Self> {
        if snapshot.format_version != FORMAT_VERSION {
            return Err(Error::corrupt(format!(
                "unsupported format version {}",
                snapshot.format_version
            )));
        }

        let info = embedder.info();
        if info.dimensions != snapshot.index.dimensions {
            return Err(Error::DimensionMismatch {
                expected: snapshot.index.dimensions,
                actual: info.dimensions,
            });
        }
        if !snapshot.embedder.is_compatible(&info) {
            return Err(Error::EmbedderMismatch {
                expected: snapshot.embedder.to_string(),
                actual: info.to_string(),
            });
        }

        let index = Hnsw::from_snapshot(snapshot.index)?;
        if let Some(orphan) = snapshot.metadata.keys().find(|id| !index.contains(id)) {
            return Err(Error::corrupt(format!(
                "metadata entry {orphan} has no node in the graph"
            )));
        }

        Ok(EmbeddingService {
            embedder,
            index,
            metadata: snapshot.metadata,
        })
    }

    pub fn from_json(data: &str, embedder: E) -> Result<Self> {
        let snapshot: ServiceSnapshot = serde_json::from_str(data)?;
        Self::from_snapshot(snapshot, embedder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use crate::service::tests::{seed, service};
    use crate::service::{EntityKind, Metadata, SearchOptions};

    struct OtherEmbedder;

    impl Embedder for OtherEmbedder {
        fn info(&self) -> EmbedderInfo {
            EmbedderInfo {
                name: "other".into(),
                model: "v1".into(),
                dimensions: 512,
            }
        }

        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0; 512])
        }
    }

    #[tokio::test]
    async fn test_round_trip_gives_identical_results() {
        let mut service = service();
        seed(&mut service).await;
        service.remove("res:2");
        service
            .add(
                "msg:1",
                "lunch moved to thursday",
                Metadata::new(EntityKind::Message).with_field("edited", true),
            )
            .await
            .unwrap();

        let json = service.to_json().unwrap();
        let restored = EmbeddingService::from_json(&json, HashEmbedder::new(512)).unwrap();

        assert_eq!(restored.len(), service.len());
        assert_eq!(restored.tombstone_count(), service.tombstone_count());
        assert_eq!(restored.to_snapshot(), service.to_snapshot());

        for query in ["budget", "lunch", "deployment checklist", "guide", "zebra"] {
            for k in [1, 3, 10] {
                assert_eq!(
                    restored.search(query, k).await.unwrap(),
                    service.search(query, k).await.unwrap()
                );
            }
            let options = SearchOptions::default()
                .with_ef(4)
                .with_kinds([EntityKind::Message]);
            assert_eq!(
                restored.search_with(query, 3, &options).await.unwrap(),
                service.search_with(query, 3, &options).await.unwrap()
            );
        }
    }

    #[tokio::test]
    async fn test_snapshot_json_shape() {
        let mut service = service();
        seed(&mut service).await;

        let value: serde_json::Value = serde_json::from_str(&service.to_json().unwrap()).unwrap();
        assert_eq!(value["format_version"], FORMAT_VERSION);
        assert_eq!(value["embedder"]["name"], "hash");
        assert_eq!(value["index"]["max_connections"], 16);
        assert_eq!(value["index"]["metric"], "cosine");
        assert_eq!(value["index"]["nodes"].as_array().unwrap().len(), 5);
        assert_eq!(value["metadata"]["conv:1"]["type"], "conversation");
    }

    #[tokio::test]
    async fn test_rejects_other_dimensions() {
        let mut service = service();
        seed(&mut service).await;
        let json = service.to_json().unwrap();

        let err = EmbeddingService::from_json(&json, HashEmbedder::new(256))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 512,
                actual: 256
            }
        ));
    }

    #[tokio::test]
    async fn test_rejects_other_embedder() {
        let mut service = service();
        seed(&mut service).await;
        let json = service.to_json().unwrap();

        let err = EmbeddingService::from_json(&json, OtherEmbedder).err().unwrap();
        assert!(matches!(err, Error::EmbedderMismatch { .. }));
    }

    #[tokio::test]
    async fn test_rejects_malformed_snapshots() {
        let mut service = service();
        seed(&mut service).await;
        let json = service.to_json().unwrap();

        let truncated = &json[..json.len() - 10];
        assert!(matches!(
            EmbeddingService::from_json(truncated, HashEmbedder::new(512)),
            Err(Error::Json(_))
        ));

        let mut future = service.to_snapshot();
        future.format_version = 99;
        assert!(matches!(
            EmbeddingService::from_snapshot(future, HashEmbedder::new(512)),
            Err(Error::CorruptSnapshot(_))
        ));

        let mut orphaned = service.to_snapshot();
        let entry = orphaned.metadata["conv:1"].clone();
        orphaned.metadata.insert("conv:404".into(), entry);
        assert!(matches!(
            EmbeddingService::from_snapshot(orphaned, HashEmbedder::new(512)),
            Err(Error::CorruptSnapshot(_))
        ));

        let mut dangling = service.to_snapshot();
        dangling.index.entry_point = Some(dangling.index.nodes.len());
        assert!(EmbeddingService::from_snapshot(dangling, HashEmbedder::new(512)).is_err());
    }

    #[tokio::test]
    async fn test_restored_service_keeps_working() {
        let mut service = service();
        seed(&mut service).await;
        let mut restored =
            EmbeddingService::from_json(&service.to_json().unwrap(), HashEmbedder::new(512))
                .unwrap();

        restored
            .add(
                "conv:2",
                "annual budget planning",
                Metadata::new(EntityKind::Conversation),
            )
            .await
            .unwrap();
        restored.remove("conv:1");
        restored.reindex().await.unwrap();

        let hits = restored.search("annual budget planning", 1).await.unwrap();
        assert_eq!(hits[0].id, "conv:2");
        assert_eq!(restored.index().physical_len(), 5);
    }
}
