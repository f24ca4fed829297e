//! SQLite-backed [`Store`] implementation.
//!
//! Documents and chunks live in two tables linked by `ON DELETE CASCADE`;
//! chunk vectors are stored as little-endian f32 BLOBs beside the text.
//! Nearest-neighbour queries go through an in-process HNSW graph that is
//! built from the `chunks` table on first use and kept in step with every
//! later write.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, info};

use docqa_core::ann::AnnIndex;
use docqa_core::embedding::{blob_to_vec, vec_to_blob};
use docqa_core::error::{RagError, Result};
use docqa_core::models::{CorpusStats, Document, DocumentChunk, NewChunk, NewDocument};
use docqa_core::store::Store;

/// Graph plus the chunk → document map used for filtered queries.
struct VectorCache {
    ann: AnnIndex,
    owners: HashMap<i64, i64>,
}

/// SQLite implementation of the [`Store`] trait.
///
/// Writes that touch vectors hold the cache lock for the duration of the SQL
/// statement, so the graph never disagrees with the table.
pub struct SqliteStore {
    pool: SqlitePool,
    cache: Mutex<Option<VectorCache>>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            cache: Mutex::new(None),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_cache(&self) -> Result<VectorCache> {
        let rows = sqlx::query("SELECT id, document_id, embedding FROM chunks ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(RagError::index)?;

        let mut ann = AnnIndex::default();
        let mut owners = HashMap::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            ann.insert(id, blob_to_vec(&blob));
            owners.insert(id, row.get("document_id"));
        }
        info!(vectors = rows.len(), "warmed vector index from sqlite");
        Ok(VectorCache { ann, owners })
    }

    async fn chunks_by_id(&self, ids: &[i64]) -> Result<HashMap<i64, DocumentChunk>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, document_id, chunk_index, text, page_number, start_offset, end_offset, \
             embedding, created_at FROM chunks WHERE id IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(RagError::index)?;
        Ok(rows
            .iter()
            .map(|row| {
                let chunk = chunk_from_row(row);
                (chunk.id, chunk)
            })
            .collect())
    }
}

fn document_from_row(row: &SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        title: row.get("title"),
        file_path: row.get("file_path"),
        full_text: row.get("full_text"),
        page_count: row.get("page_count"),
        word_count: row.get("word_count"),
        total_chunks: row.get("total_chunks"),
        is_processed: row.get("is_processed"),
        error_message: row.get("error_message"),
        uploaded_at: row.get("uploaded_at"),
        processed_at: row.get("processed_at"),
    }
}

fn chunk_from_row(row: &SqliteRow) -> DocumentChunk {
    let blob: Vec<u8> = row.get("embedding");
    DocumentChunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_index: row.get("chunk_index"),
        text: row.get("text"),
        page_number: row.get("page_number"),
        start_offset: row.get("start_offset"),
        end_offset: row.get("end_offset"),
        embedding: blob_to_vec(&blob),
        created_at: row.get("created_at"),
    }
}

const DOCUMENT_COLUMNS: &str = "id, title, file_path, full_text, page_count, word_count, \
     total_chunks, is_processed, error_message, uploaded_at, processed_at";

#[async_trait]
impl Store for SqliteStore {
    async fn insert_document(&self, doc: &NewDocument) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (title, file_path, full_text, page_count, word_count, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.title)
        .bind(&doc.file_path)
        .bind(&doc.full_text)
        .bind(doc.page_count)
        .bind(doc.word_count)
        .bind(doc.uploaded_at)
        .execute(&self.pool)
        .await
        .map_err(RagError::index)?;

        let id = result.last_insert_rowid();
        debug!(document_id = id, "inserted document");
        Ok(id)
    }

    async fn mark_processed(&self, id: i64, total_chunks: i64, processed_at: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET total_chunks = ?, is_processed = 1, error_message = NULL, processed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(total_chunks)
        .bind(processed_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(RagError::index)?;

        if result.rows_affected() == 0 {
            return Err(RagError::NotFound(id));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: i64, message: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE documents SET error_message = ?, is_processed = 0 WHERE id = ?")
                .bind(message)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(RagError::index)?;

        if result.rows_affected() == 0 {
            return Err(RagError::NotFound(id));
        }
        Ok(())
    }

    async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let sql = format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RagError::index)?;
        Ok(row.as_ref().map(document_from_row))
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT {} FROM documents ORDER BY uploaded_at DESC, id DESC",
            DOCUMENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(RagError::index)?;
        Ok(rows.iter().map(document_from_row).collect())
    }

    async fn delete_document(&self, id: i64) -> Result<bool> {
        let mut cache = self.cache.lock().await;
        let mut tx = self.pool.begin().await.map_err(RagError::index)?;

        let chunk_ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM chunks WHERE document_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await
            .map_err(RagError::index)?;

        // Chunks go with the document through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(RagError::index)?;
        tx.commit().await.map_err(RagError::index)?;

        if let Some(cache) = cache.as_mut() {
            for chunk_id in &chunk_ids {
                cache.ann.remove(*chunk_id);
                cache.owners.remove(chunk_id);
            }
        }
        debug!(document_id = id, chunks = chunk_ids.len(), "deleted document");
        Ok(result.rows_affected() > 0)
    }

    async fn insert_chunk(&self, chunk: &NewChunk) -> Result<i64> {
        let mut cache = self.cache.lock().await;
        let result = sqlx::query(
            r#"
            INSERT INTO chunks (document_id, chunk_index, text, page_number, start_offset,
                                end_offset, dims, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(chunk.page_number)
        .bind(chunk.start_offset)
        .bind(chunk.end_offset)
        .bind(chunk.embedding.len() as i64)
        .bind(vec_to_blob(&chunk.embedding))
        .bind(chunk.created_at)
        .execute(&self.pool)
        .await
        .map_err(RagError::index)?;

        let id = result.last_insert_rowid();
        if let Some(cache) = cache.as_mut() {
            cache.ann.insert(id, chunk.embedding.clone());
            cache.owners.insert(id, chunk.document_id);
        }
        Ok(id)
    }

    async fn delete_chunks(&self, document_id: i64) -> Result<u64> {
        let mut cache = self.cache.lock().await;
        let mut tx = self.pool.begin().await.map_err(RagError::index)?;

        let chunk_ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(RagError::index)?;
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(RagError::index)?;
        tx.commit().await.map_err(RagError::index)?;

        if let Some(cache) = cache.as_mut() {
            for chunk_id in &chunk_ids {
                cache.ann.remove(*chunk_id);
                cache.owners.remove(chunk_id);
            }
        }
        Ok(result.rows_affected())
    }

    async fn nearest_chunks(
        &self,
        query: &[f32],
        k: usize,
        documents: Option<&[i64]>,
    ) -> Result<Vec<(DocumentChunk, f32)>> {
        let hits = {
            let mut guard = self.cache.lock().await;
            if guard.is_none() {
                *guard = Some(self.load_cache().await?);
            }
            let Some(cache) = guard.as_ref() else {
                return Ok(Vec::new());
            };
            cache.ann.search(query, k, |id| match documents {
                Some(allowed) => cache
                    .owners
                    .get(&id)
                    .map(|doc| allowed.contains(doc))
                    .unwrap_or(false),
                None => true,
            })
        };

        let ids: Vec<i64> = hits.iter().map(|(id, _)| *id).collect();
        let mut rows = self.chunks_by_id(&ids).await?;
        Ok(hits
            .into_iter()
            .filter_map(|(id, distance)| rows.remove(&id).map(|c| (c, distance)))
            .collect())
    }

    async fn vector_dims(&self) -> Result<Option<usize>> {
        let dims: Option<i64> = sqlx::query_scalar("SELECT dims FROM chunks LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(RagError::index)?;
        Ok(dims.map(|d| d as usize))
    }

    async fn stats(&self) -> Result<CorpusStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM documents) AS document_count,
                (SELECT COUNT(*) FROM chunks) AS chunk_count,
                (SELECT COALESCE(SUM(word_count), 0) FROM documents) AS word_count
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(RagError::index)?;

        Ok(CorpusStats {
            document_count: row.get("document_count"),
            chunk_count: row.get("chunk_count"),
            word_count: row.get("word_count"),
        })
    }
}
