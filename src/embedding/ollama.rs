//! Embedding model served by a local Ollama instance.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use docqa_core::embedding::EmbeddingModel;
use docqa_core::error::{RagError, Result};

use crate::config::EmbeddingConfig;

/// Embedding model behind Ollama's `POST /api/embed`.
///
/// Requires Ollama to be running with the model pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedding {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
}

impl OllamaEmbedding {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            url: config.url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                RagError::Embedding(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "Ollama API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("Invalid Ollama response: {}", e)))?;
        parse_embed_response(&json)
    }
}

/// Extract the `embeddings` arrays from an `/api/embed` response.
pub(crate) fn parse_embed_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            RagError::Embedding("Invalid Ollama response: missing embeddings array".to_string())
        })?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .ok_or_else(|| {
                    RagError::Embedding(
                        "Invalid Ollama response: embedding is not an array".to_string(),
                    )
                })
                .map(|values| {
                    values
                        .iter()
                        .map(|v| v.as_f64().unwrap_or(f64::NAN) as f32)
                        .collect()
                })
        })
        .collect()
}

#[async_trait]
impl EmbeddingModel for OllamaEmbedding {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    /// Ollama loads a model on first request, so loading is a warm-up embed
    /// that also checks the configured dimensionality.
    async fn load(&self) -> Result<()> {
        let warmup = self.request(&["ping"]).await?;
        let got = warmup.first().map(|v| v.len()).unwrap_or(0);
        if got != self.dims {
            return Err(RagError::Embedding(format!(
                "model {} produces {} dimensions but embedding.dims = {}",
                self.model, got, self.dims
            )));
        }
        debug!(model = %self.model, "ollama embedding model ready");
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("Empty embedding response".to_string()))
    }
}
