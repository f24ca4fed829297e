//! Storage abstraction for docqa.
//!
//! The [`Store`] trait defines every persistence operation the ingestion and
//! retrieval pipeline needs: document rows, chunk rows with their vectors,
//! and nearest-neighbour lookup. Backends are pluggable (SQLite in the app
//! crate, [`memory::InMemoryStore`] here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes, and
//! must serialize their own writes so concurrent callers cannot corrupt the
//! vector index.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CorpusStats, Document, DocumentChunk, NewChunk, NewDocument};

/// Abstract storage backend.
///
/// All operations are async (via `async-trait`). In-memory implementations
/// return immediately-ready futures.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_document`](Store::insert_document) | Record an uploaded document |
/// | [`mark_processed`](Store::mark_processed) | Finish a successful ingestion |
/// | [`mark_failed`](Store::mark_failed) | Record an ingestion error |
/// | [`get_document`](Store::get_document) | Fetch one document |
/// | [`list_documents`](Store::list_documents) | All documents, newest first |
/// | [`delete_document`](Store::delete_document) | Remove a document and its chunks |
/// | [`insert_chunk`](Store::insert_chunk) | Store a chunk and its vector |
/// | [`delete_chunks`](Store::delete_chunks) | Remove all chunks of a document |
/// | [`nearest_chunks`](Store::nearest_chunks) | Top-k by cosine distance |
/// | [`vector_dims`](Store::vector_dims) | Dimension of stored vectors |
/// | [`stats`](Store::stats) | Corpus counters |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new, unprocessed document. Returns its assigned id.
    async fn insert_document(&self, doc: &NewDocument) -> Result<i64>;

    /// Set the chunk count, the processed flag, and the processed timestamp.
    async fn mark_processed(&self, id: i64, total_chunks: i64, processed_at: i64) -> Result<()>;

    /// Record an ingestion failure on the document.
    async fn mark_failed(&self, id: i64, message: &str) -> Result<()>;

    async fn get_document(&self, id: i64) -> Result<Option<Document>>;

    /// All documents ordered by upload time, newest first.
    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Delete a document and all of its chunks in one atomic operation.
    ///
    /// Returns `false` if no such document exists.
    async fn delete_document(&self, id: i64) -> Result<bool>;

    /// Store a chunk with its embedding. Returns the chunk id.
    async fn insert_chunk(&self, chunk: &NewChunk) -> Result<i64>;

    /// Delete every chunk belonging to a document. Returns the number removed.
    async fn delete_chunks(&self, document_id: i64) -> Result<u64>;

    /// Up to `k` chunks nearest to `query` with their cosine distance,
    /// ascending. When `documents` is given, only chunks of those documents
    /// are considered.
    async fn nearest_chunks(
        &self,
        query: &[f32],
        k: usize,
        documents: Option<&[i64]>,
    ) -> Result<Vec<(DocumentChunk, f32)>>;

    /// Dimension of the vectors already stored, or `None` if there are none.
    async fn vector_dims(&self) -> Result<Option<usize>>;

    async fn stats(&self) -> Result<CorpusStats>;
}
