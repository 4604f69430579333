//! Ollama embedding client.
//!
//! Talks to the `/api/embed` endpoint of a local or remote Ollama server.
//!
//! Environment variables read by [`OllamaEmbedder::from_env`]:
//! - `OLLAMA_ENDPOINT` - server URL (default: `http://localhost:11434`)
//! - `OLLAMA_MODEL` - embedding model (default: `nomic-embed-text`)
//! - `OLLAMA_DIMENSIONS` - vector length the model produces (default: `768`)

use std::env;

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};

use super::{Embedder, EmbedderInfo};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_DIMENSIONS: usize = 768;

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        let endpoint: String = endpoint.into();
        OllamaEmbedder {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions,
        }
    }

    /// Builds an embedder from the `OLLAMA_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let endpoint = var("OLLAMA_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.into());
        let model = var("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into());
        let dimensions = match var("OLLAMA_DIMENSIONS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("OLLAMA_DIMENSIONS is not a number: {raw}"))?,
            None => DEFAULT_DIMENSIONS,
        };
        if dimensions == 0 {
            bail!("OLLAMA_DIMENSIONS must be positive");
        }
        Ok(Self::new(endpoint, model, dimensions))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn first_embedding(&self, response: EmbedResponse) -> anyhow::Result<Vec<f32>> {
        let vector = response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no embeddings returned from ollama"))?;
        if vector.len() != self.dimensions {
            bail!(
                "ollama model {} returned {} dimensions, expected {}",
                self.model,
                vector.len(),
                self.dimensions
            );
        }
        Ok(vector)
    }
}

impl Embedder for OllamaEmbedder {
    fn info(&self) -> EmbedderInfo {
        EmbedderInfo {
            name: "ollama".to_string(),
            model: self.model.clone(),
            dimensions: self.dimensions,
        }
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let url = format!("{}/api/embed", self.endpoint);
        let request = EmbedRequest {
            model: &self.model,
            input: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("ollama request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("ollama embedding failed with {status}: {body}");
        }

        let data: EmbedResponse = response
            .json()
            .await
            .context("failed to parse ollama response")?;
        self.first_embedding(data)
    }
}
