//! In-memory [`Store`] implementation for tests and embedding in other hosts.
//!
//! All state lives behind one `std::sync::RwLock`, so every write (including
//! the document + chunk cascade) is atomic with respect to readers. Vector
//! search goes through an [`AnnIndex`] kept in step with the chunk map.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::ann::AnnIndex;
use crate::error::{RagError, Result};
use crate::models::{CorpusStats, Document, DocumentChunk, NewChunk, NewDocument};

use super::Store;

#[derive(Default)]
struct State {
    docs: BTreeMap<i64, Document>,
    chunks: BTreeMap<i64, DocumentChunk>,
    ann: AnnIndex,
    next_doc_id: i64,
    next_chunk_id: i64,
}

/// In-memory store for tests and hosts without SQLite.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| RagError::Index("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| RagError::Index("in-memory store lock poisoned".to_string()))
    }
}

impl State {
    fn remove_chunks_of(&mut self, document_id: i64) -> u64 {
        let ids: Vec<i64> = self
            .chunks
            .values()
            .filter(|c| c.document_id == document_id)
            .map(|c| c.id)
            .collect();
        for id in &ids {
            self.chunks.remove(id);
            self.ann.remove(*id);
        }
        ids.len() as u64
    }

    fn doc_mut(&mut self, id: i64) -> Result<&mut Document> {
        self.docs.get_mut(&id).ok_or(RagError::NotFound(id))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_document(&self, doc: &NewDocument) -> Result<i64> {
        let mut state = self.write()?;
        state.next_doc_id += 1;
        let id = state.next_doc_id;
        state.docs.insert(
            id,
            Document {
                id,
                title: doc.title.clone(),
                file_path: doc.file_path.clone(),
                full_text: doc.full_text.clone(),
                page_count: doc.page_count,
                word_count: doc.word_count,
                total_chunks: 0,
                is_processed: false,
                error_message: None,
                uploaded_at: doc.uploaded_at,
                processed_at: None,
            },
        );
        Ok(id)
    }

    async fn mark_processed(&self, id: i64, total_chunks: i64, processed_at: i64) -> Result<()> {
        let mut state = self.write()?;
        let doc = state.doc_mut(id)?;
        doc.total_chunks = total_chunks;
        doc.is_processed = true;
        doc.error_message = None;
        doc.processed_at = Some(processed_at);
        Ok(())
    }

    async fn mark_failed(&self, id: i64, message: &str) -> Result<()> {
        let mut state = self.write()?;
        let doc = state.doc_mut(id)?;
        doc.error_message = Some(message.to_string());
        doc.is_processed = false;
        Ok(())
    }

    async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        Ok(self.read()?.docs.get(&id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let state = self.read()?;
        let mut docs: Vec<Document> = state.docs.values().cloned().collect();
        docs.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(b.id.cmp(&a.id)));
        Ok(docs)
    }

    async fn delete_document(&self, id: i64) -> Result<bool> {
        let mut state = self.write()?;
        if state.docs.remove(&id).is_none() {
            return Ok(false);
        }
        state.remove_chunks_of(id);
        Ok(true)
    }

    async fn insert_chunk(&self, chunk: &NewChunk) -> Result<i64> {
        let mut state = self.write()?;
        if !state.docs.contains_key(&chunk.document_id) {
            return Err(RagError::Index(format!(
                "chunk references unknown document {}",
                chunk.document_id
            )));
        }
        state.next_chunk_id += 1;
        let id = state.next_chunk_id;
        state.ann.insert(id, chunk.embedding.clone());
        state.chunks.insert(
            id,
            DocumentChunk {
                id,
                document_id: chunk.document_id,
                chunk_index: chunk.chunk_index,
                text: chunk.text.clone(),
                page_number: chunk.page_number,
                start_offset: chunk.start_offset,
                end_offset: chunk.end_offset,
                embedding: chunk.embedding.clone(),
                created_at: chunk.created_at,
            },
        );
        Ok(id)
    }

    async fn delete_chunks(&self, document_id: i64) -> Result<u64> {
        Ok(self.write()?.remove_chunks_of(document_id))
    }

    async fn nearest_chunks(
        &self,
        query: &[f32],
        k: usize,
        documents: Option<&[i64]>,
    ) -> Result<Vec<(DocumentChunk, f32)>> {
        let state = self.read()?;
        let hits = state.ann.search(query, k, |id| match documents {
            Some(allowed) => state
                .chunks
                .get(&id)
                .map(|c| allowed.contains(&c.document_id))
                .unwrap_or(false),
            None => true,
        });
        Ok(hits
            .into_iter()
            .filter_map(|(id, d)| state.chunks.get(&id).map(|c| (c.clone(), d)))
            .collect())
    }

    async fn vector_dims(&self) -> Result<Option<usize>> {
        Ok(self.read()?.chunks.values().next().map(|c| c.embedding.len()))
    }

    async fn stats(&self) -> Result<CorpusStats> {
        let state = self.read()?;
        Ok(CorpusStats {
            document_count: state.docs.len() as i64,
            chunk_count: state.chunks.len() as i64,
            word_count: state.docs.values().map(|d| d.word_count).sum(),
        })
    }
}
