//! In-process embedding model via fastembed.
//!
//! Models are downloaded from Hugging Face on first load and cached; after
//! that, embedding runs entirely offline. ONNX inference is blocking, so it
//! runs on tokio's blocking pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use docqa_core::embedding::EmbeddingModel;
use docqa_core::error::{RagError, Result};

use crate::config::EmbeddingConfig;

pub struct LocalEmbedding {
    model_name: String,
    dims: usize,
    model: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalEmbedding {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        // Fail on unknown names at construction, not at first use.
        fastembed_model(&config.model)?;
        Ok(Self {
            model_name: config.model.clone(),
            dims: config.dims,
            model: Arc::new(Mutex::new(None)),
        })
    }
}

fn fastembed_model(name: &str) -> anyhow::Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        other => anyhow::bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base",
            other
        ),
    }
}

#[async_trait]
impl EmbeddingModel for LocalEmbedding {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn load(&self) -> Result<()> {
        let which = fastembed_model(&self.model_name).map_err(|e| RagError::Embedding(e.to_string()))?;
        let slot = self.model.clone();
        tokio::task::spawn_blocking(move || {
            let model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(which).with_show_download_progress(false),
            )
            .map_err(|e| {
                RagError::Embedding(format!("Failed to initialize local embedding model: {}", e))
            })?;
            let mut guard = slot
                .lock()
                .map_err(|_| RagError::Embedding("embedding model lock poisoned".to_string()))?;
            *guard = Some(model);
            Ok(())
        })
        .await
        .map_err(|e| RagError::Embedding(format!("embedding worker failed: {}", e)))?
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let slot = self.model.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| RagError::Embedding("embedding model lock poisoned".to_string()))?;
            let model = guard
                .as_mut()
                .ok_or_else(|| RagError::Embedding("local embedding model not loaded".to_string()))?;
            model
                .embed(vec![text], None)
                .map_err(|e| RagError::Embedding(format!("Local embedding failed: {}", e)))?
                .into_iter()
                .next()
                .ok_or_else(|| RagError::Embedding("Empty embedding response".to_string()))
        })
        .await
        .map_err(|e| RagError::Embedding(format!("embedding worker failed: {}", e)))?
    }
}
