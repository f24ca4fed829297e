//! Embedding adapter and model backends.
//!
//! [`Embedder`] wraps any [`EmbeddingModel`] and guarantees that every vector
//! it hands out has the model's fixed dimensionality and unit L2 norm. The
//! model is loaded lazily, exactly once, no matter how many callers race to
//! use it first.
//!
//! Backends:
//! - **[`OllamaEmbedding`]** calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedding`** runs a model in-process via fastembed
//!   (feature `local-embeddings-fastembed`); no network calls after download.
//!
//! # Model Selection
//!
//! Use [`create_model`] to instantiate the backend named by the configuration:
//!
//! ```rust,no_run
//! # use docqa::config::EmbeddingConfig;
//! # use docqa::embedding::create_model;
//! let config = EmbeddingConfig::default(); // provider = "ollama"
//! let model = create_model(&config).unwrap();
//! assert_eq!(model.model_name(), "nomic-embed-text");
//! ```

#[cfg(feature = "local-embeddings-fastembed")]
mod local;
mod ollama;

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedding;
pub use ollama::OllamaEmbedding;

pub use docqa_core::embedding::{cosine_similarity, l2_normalize, EmbeddingModel};

use std::sync::Arc;

use anyhow::bail;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use docqa_core::error::{RagError, Result};

use crate::config::EmbeddingConfig;

/// Normalizing, lazily initialized front end to an [`EmbeddingModel`].
pub struct Embedder {
    model: Arc<dyn EmbeddingModel>,
    loaded: OnceCell<()>,
}

impl Embedder {
    pub fn new(model: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            model,
            loaded: OnceCell::new(),
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Dimensionality of every vector this embedder returns.
    pub fn dims(&self) -> usize {
        self.model.dims()
    }

    pub fn is_initialized(&self) -> bool {
        self.loaded.initialized()
    }

    /// Load the model. Idempotent; concurrent callers share one load.
    ///
    /// A failed load leaves the embedder uninitialized so a later call can
    /// try again.
    pub async fn initialize(&self) -> Result<()> {
        self.loaded
            .get_or_try_init(|| async {
                info!(model = self.model.model_name(), dims = self.model.dims(), "loading embedding model");
                self.model.load().await
            })
            .await?;
        Ok(())
    }

    /// Embed one text into a unit vector.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.initialize().await?;
        let vector = self.model.embed(text).await?;

        if vector.len() != self.dims() {
            return Err(RagError::Embedding(format!(
                "model {} returned {} dimensions, expected {}",
                self.model_name(),
                vector.len(),
                self.dims()
            )));
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(RagError::Embedding(format!(
                "model {} returned a non-finite vector",
                self.model_name()
            )));
        }

        debug!(chars = text.chars().count(), "embedded text");
        Ok(l2_normalize(vector))
    }
}

/// Create the [`EmbeddingModel`] named by `config.provider`.
///
/// # Supported Providers
///
/// | Config Value | Model |
/// |-------------|-------|
/// | `"ollama"` | [`OllamaEmbedding`] |
/// | `"local"` | `LocalEmbedding` (feature `local-embeddings-fastembed`) |
pub fn create_model(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn EmbeddingModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedding::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedding::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
