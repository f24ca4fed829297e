//! Vector index adapter over a [`Store`].
//!
//! [`VectorIndex`] pins the embedding dimension, renormalizes every vector
//! on the way in, and turns the store's cosine distances into similarity
//! scores on the way out.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::l2_normalize;
use crate::error::{RagError, Result};
use crate::models::{NewChunk, ScoredChunk};
use crate::store::Store;

/// Map a cosine distance in `[0, 2]` to a similarity in `[0, 1]`.
///
/// Opposite vectors and anything past orthogonal score `0.0`; `NaN` also
/// maps to `0.0`.
///
/// # Example
///
/// ```rust
/// use docqa_core::index::distance_to_similarity;
///
/// assert_eq!(distance_to_similarity(0.0), 1.0);
/// assert_eq!(distance_to_similarity(0.25), 0.75);
/// assert_eq!(distance_to_similarity(1.7), 0.0);
/// assert_eq!(distance_to_similarity(f32::NAN), 0.0);
/// ```
pub fn distance_to_similarity(distance: f32) -> f32 {
    if distance.is_nan() {
        return 0.0;
    }
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Fixed-dimension vector index backed by a [`Store`].
#[derive(Clone)]
pub struct VectorIndex {
    store: Arc<dyn Store>,
    dims: usize,
}

impl VectorIndex {
    pub fn new(store: Arc<dyn Store>, dims: usize) -> Self {
        Self { store, dims }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Fail if the store already holds vectors of another dimension.
    pub async fn check_dimensions(&self) -> Result<()> {
        match self.store.vector_dims().await? {
            Some(existing) if existing != self.dims => Err(RagError::Index(format!(
                "store holds {}-dimensional vectors but the embedding model produces {}; \
                 re-ingest documents or restore the previous model",
                existing, self.dims
            ))),
            _ => Ok(()),
        }
    }

    /// Validate and store one chunk. Returns the chunk id.
    pub async fn insert(&self, mut chunk: NewChunk) -> Result<i64> {
        if chunk.embedding.len() != self.dims {
            return Err(RagError::Index(format!(
                "embedding has {} dimensions, index expects {}",
                chunk.embedding.len(),
                self.dims
            )));
        }
        chunk.embedding = l2_normalize(chunk.embedding);
        let id = self.store.insert_chunk(&chunk).await?;
        debug!(
            chunk_id = id,
            document_id = chunk.document_id,
            chunk_index = chunk.chunk_index,
            "indexed chunk"
        );
        Ok(id)
    }

    /// Up to `k` chunks ordered by descending similarity.
    pub async fn query(
        &self,
        vector: &[f32],
        k: usize,
        documents: Option<&[i64]>,
    ) -> Result<Vec<ScoredChunk>> {
        if vector.len() != self.dims {
            return Err(RagError::Index(format!(
                "query has {} dimensions, index expects {}",
                vector.len(),
                self.dims
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut hits = self
            .store
            .nearest_chunks(vector, k, documents)
            .await
            .map_err(|e| match e {
                RagError::Index(msg) => RagError::Retrieval(msg),
                other => other,
            })?;
        hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        debug!(k, returned = hits.len(), "vector query");
        Ok(hits
            .into_iter()
            .map(|(chunk, distance)| ScoredChunk {
                chunk,
                similarity: distance_to_similarity(distance),
            })
            .collect())
    }

    /// Remove every chunk of a document. Returns the number removed.
    pub async fn delete_by_document(&self, document_id: i64) -> Result<u64> {
        let removed = self.store.delete_chunks(document_id).await?;
        debug!(document_id, removed, "deleted document chunks");
        Ok(removed)
    }
}
