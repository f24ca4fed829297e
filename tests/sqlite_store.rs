//! SQLite store tests against a real database file.

use docqa::db::connect_path;
use docqa::migrate::migrate_pool;
use docqa::sqlite_store::SqliteStore;
use docqa_core::embedding::l2_normalize;
use docqa_core::models::{NewChunk, NewDocument};
use docqa_core::store::Store;
use tempfile::TempDir;

async fn open(dir: &TempDir) -> SqliteStore {
    let pool = connect_path(&dir.path().join("docqa.sqlite")).await.unwrap();
    migrate_pool(&pool).await.unwrap();
    SqliteStore::new(pool)
}

fn new_doc(title: &str, uploaded_at: i64) -> NewDocument {
    NewDocument {
        title: title.to_string(),
        file_path: format!("/tmp/{}.pdf", title),
        full_text: format!("{} full text", title),
        page_count: 2,
        word_count: 50,
        uploaded_at,
    }
}

/// Unit vector pointing mostly along `axis`.
fn vector(axis: usize, dims: usize) -> Vec<f32> {
    let mut v = vec![0.05; dims];
    v[axis % dims] = 1.0;
    l2_normalize(v)
}

fn chunk(document_id: i64, index: i64, embedding: Vec<f32>) -> NewChunk {
    NewChunk {
        document_id,
        chunk_index: index,
        text: format!("chunk {} of document {}", index, document_id),
        page_number: 1 + index / 2,
        start_offset: index * 425,
        end_offset: index * 425 + 500,
        embedding,
        created_at: 1_700_000_000,
    }
}

#[tokio::test]
async fn documents_round_trip_and_list_newest_first() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;

    let old = store.insert_document(&new_doc("old", 100)).await.unwrap();
    let new = store.insert_document(&new_doc("new", 200)).await.unwrap();

    let docs = store.list_documents().await.unwrap();
    assert_eq!(docs.iter().map(|d| d.id).collect::<Vec<_>>(), vec![new, old]);
    assert!(!docs[0].is_processed);

    store.mark_processed(old, 4, 150).await.unwrap();
    let doc = store.get_document(old).await.unwrap().unwrap();
    assert!(doc.is_processed);
    assert_eq!(doc.total_chunks, 4);
    assert_eq!(doc.processed_at, Some(150));
    assert_eq!(doc.full_text, "old full text");

    store.mark_failed(new, "embedding failed").await.unwrap();
    let doc = store.get_document(new).await.unwrap().unwrap();
    assert!(!doc.is_processed);
    assert_eq!(doc.error_message.as_deref(), Some("embedding failed"));

    assert!(store.get_document(999).await.unwrap().is_none());
}

#[tokio::test]
async fn nearest_chunks_ranked_and_filtered() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let a = store.insert_document(&new_doc("a", 1)).await.unwrap();
    let b = store.insert_document(&new_doc("b", 2)).await.unwrap();
    for i in 0..4 {
        store.insert_chunk(&chunk(a, i, vector(i as usize, 8))).await.unwrap();
        store
            .insert_chunk(&chunk(b, i, vector(i as usize + 4, 8)))
            .await
            .unwrap();
    }

    let hits = store.nearest_chunks(&vector(2, 8), 3, None).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].0.document_id, a);
    assert_eq!(hits[0].0.chunk_index, 2);
    assert!(hits[0].1 < 1e-4);
    assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));
    assert_eq!(hits[0].0.embedding.len(), 8);

    let hits = store
        .nearest_chunks(&vector(2, 8), 10, Some(&[b]))
        .await
        .unwrap();
    assert_eq!(hits.len(), 4);
    assert!(hits.iter().all(|(c, _)| c.document_id == b));

    assert!(store
        .nearest_chunks(&vector(2, 8), 0, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn delete_document_cascades() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let keep = store.insert_document(&new_doc("keep", 1)).await.unwrap();
    let gone = store.insert_document(&new_doc("gone", 2)).await.unwrap();
    store.insert_chunk(&chunk(keep, 0, vector(0, 4))).await.unwrap();
    store.insert_chunk(&chunk(gone, 0, vector(1, 4))).await.unwrap();
    store.insert_chunk(&chunk(gone, 1, vector(2, 4))).await.unwrap();

    // Warm the graph so the delete must update it too.
    assert_eq!(store.nearest_chunks(&vector(1, 4), 5, None).await.unwrap().len(), 3);

    assert!(store.delete_document(gone).await.unwrap());
    assert!(!store.delete_document(gone).await.unwrap());

    let hits = store.nearest_chunks(&vector(1, 4), 5, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0.document_id, keep);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn delete_chunks_keeps_document() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let id = store.insert_document(&new_doc("doc", 1)).await.unwrap();
    store.insert_chunk(&chunk(id, 0, vector(0, 4))).await.unwrap();
    store.insert_chunk(&chunk(id, 1, vector(1, 4))).await.unwrap();

    assert_eq!(store.delete_chunks(id).await.unwrap(), 2);
    assert!(store.get_document(id).await.unwrap().is_some());
    assert!(store
        .nearest_chunks(&vector(0, 4), 5, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn graph_rebuilt_from_existing_rows() {
    let dir = TempDir::new().unwrap();
    let id = {
        let store = open(&dir).await;
        let id = store.insert_document(&new_doc("persisted", 1)).await.unwrap();
        for i in 0..6 {
            store.insert_chunk(&chunk(id, i, vector(i as usize, 6))).await.unwrap();
        }
        store.pool().close().await;
        id
    };

    let store = open(&dir).await;
    assert_eq!(store.vector_dims().await.unwrap(), Some(6));
    let hits = store.nearest_chunks(&vector(4, 6), 1, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0.document_id, id);
    assert_eq!(hits[0].0.chunk_index, 4);
}

#[tokio::test]
async fn stats_count_documents_chunks_and_words() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    assert_eq!(store.vector_dims().await.unwrap(), None);

    let a = store.insert_document(&new_doc("a", 1)).await.unwrap();
    store.insert_document(&new_doc("b", 2)).await.unwrap();
    store.insert_chunk(&chunk(a, 0, vector(0, 4))).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.document_count, 2);
    assert_eq!(stats.chunk_count, 1);
    assert_eq!(stats.word_count, 100);
}

#[tokio::test]
async fn chunk_for_unknown_document_rejected() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    assert!(store.insert_chunk(&chunk(77, 0, vector(0, 4))).await.is_err());
}
