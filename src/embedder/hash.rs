//! Deterministic feature-hashing embedder.
//!
//! Every lowercase word is hashed with SHA-256 into one of `dimensions` signed
//! buckets and the bag is L2-normalised. Texts sharing words land close to each
//! other, which is enough for tests and offline hosts without a model.

use sha2::{Digest, Sha256};

use super::{Embedder, EmbedderInfo};

const MODEL: &str = "sha256-bow-v1";

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        HashEmbedder { dimensions }
    }

    /// Synchronous form of [`Embedder::embed`].
    ///
    /// Returns the zero vector only for blank text.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        if self.dimensions == 0 {
            return vector;
        }

        let mut words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(str::to_lowercase)
            .peekable();

        if words.peek().is_none() {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return vector;
            }
            self.accumulate(&mut vector, trimmed);
        } else {
            for word in words {
                self.accumulate(&mut vector, &word);
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }

    fn accumulate(&self, vector: &mut [f32], token: &str) {
        let digest = Sha256::digest(token.as_bytes());
        let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
            % self.dimensions;
        let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
}

impl Embedder for HashEmbedder {
    fn info(&self) -> EmbedderInfo {
        EmbedderInfo {
            name: "hash".to_string(),
            model: MODEL.to_string(),
            dimensions: self.dimensions,
        }
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}
