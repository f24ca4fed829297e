//! End-to-end pipeline tests over the in-memory store with mock models.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use docqa::embedding::Embedder;
use docqa::extract::PdfExtractor;
use docqa::generation::{Generator, GeneratorState};
use docqa::pipeline::{Pipeline, PipelineOptions};
use docqa::progress::{NoProgress, ProgressEvent, ProgressReporter};
use docqa_core::embedding::EmbeddingModel;
use docqa_core::extract::{ExtractedText, OcrEngine, TextExtractor};
use docqa_core::generation::{LlmRuntime, SamplingParams};
use docqa_core::models::{CorpusStats, Document, DocumentChunk, NewChunk, NewDocument};
use docqa_core::store::memory::InMemoryStore;
use docqa_core::store::Store;
use docqa_core::{RagError, Result, Stage};

const DIMS: usize = 32;

/// Bag-of-words hashing embedder: texts sharing words land close together.
struct HashModel {
    calls: AtomicUsize,
    cancel_on_call: Option<(usize, CancellationToken)>,
    fail_on_call: Option<usize>,
}

impl HashModel {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            cancel_on_call: None,
            fail_on_call: None,
        }
    }

    fn cancelling_after(calls: usize, token: CancellationToken) -> Self {
        Self {
            cancel_on_call: Some((calls, token)),
            ..Self::new()
        }
    }

    /// Errors on the `call`-th embedding request.
    fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::new()
        }
    }
}

#[async_trait]
impl EmbeddingModel for HashModel {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn load(&self) -> Result<()> {
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, token)) = &self.cancel_on_call {
            if n >= *after {
                token.cancel();
            }
        }
        if self.fail_on_call == Some(n) {
            return Err(RagError::Embedding("model server went away".to_string()));
        }
        let mut v = vec![0.01f32; DIMS];
        for word in text.split(|c: char| !c.is_alphanumeric()) {
            if word.is_empty() {
                continue;
            }
            let mut h: u64 = 0xcbf29ce484222325;
            for b in word.to_lowercase().bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(0x100000001b3);
            }
            v[(h % DIMS as u64) as usize] += 1.0;
        }
        Ok(v)
    }
}

/// LLM runtime that answers from a script and counts calls.
#[derive(Default)]
struct ScriptedRuntime {
    generated: AtomicUsize,
    sessions: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    broken: bool,
}

impl ScriptedRuntime {
    /// Loads and opens sessions fine, but every generation fails.
    fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl LlmRuntime for ScriptedRuntime {
    async fn load_engine(&self, _model: &str, _max_tokens: usize) -> Result<()> {
        Ok(())
    }

    async fn create_session(&self, _params: &SamplingParams) -> Result<()> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn add_input(&self, text: &str) -> Result<()> {
        self.prompts.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn generate(&self) -> Result<String> {
        self.generated.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(RagError::Generation("decoder ran out of memory".to_string()));
        }
        Ok("  The warranty lasts two years.  ".to_string())
    }

    async fn close_session(&self) -> Result<()> {
        Ok(())
    }

    async fn close_engine(&self) -> Result<()> {
        Ok(())
    }
}

/// Reads a text file and claims a fixed page count.
struct PagedText(i64);

#[async_trait]
impl TextExtractor for PagedText {
    async fn extract(&self, path: &Path) -> Result<ExtractedText> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RagError::Extraction(format!("{}: {}", path.display(), e)))?;
        Ok(ExtractedText::new(text, self.0))
    }
}

struct FixedOcr(String);

#[async_trait]
impl OcrEngine for FixedOcr {
    async fn recognize(&self, _image: &Path) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// In-memory store whose `n`-th chunk insert fails.
struct FlakyStore {
    inner: Arc<InMemoryStore>,
    inserts: AtomicUsize,
    fail_on_insert: usize,
}

#[async_trait]
impl Store for FlakyStore {
    async fn insert_document(&self, doc: &NewDocument) -> Result<i64> {
        self.inner.insert_document(doc).await
    }

    async fn mark_processed(&self, id: i64, total_chunks: i64, processed_at: i64) -> Result<()> {
        self.inner.mark_processed(id, total_chunks, processed_at).await
    }

    async fn mark_failed(&self, id: i64, message: &str) -> Result<()> {
        self.inner.mark_failed(id, message).await
    }

    async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        self.inner.get_document(id).await
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        self.inner.list_documents().await
    }

    async fn delete_document(&self, id: i64) -> Result<bool> {
        self.inner.delete_document(id).await
    }

    async fn insert_chunk(&self, chunk: &NewChunk) -> Result<i64> {
        let n = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on_insert {
            return Err(RagError::Index("disk I/O error".to_string()));
        }
        self.inner.insert_chunk(chunk).await
    }

    async fn delete_chunks(&self, document_id: i64) -> Result<u64> {
        self.inner.delete_chunks(document_id).await
    }

    async fn nearest_chunks(
        &self,
        query: &[f32],
        k: usize,
        documents: Option<&[i64]>,
    ) -> Result<Vec<(DocumentChunk, f32)>> {
        self.inner.nearest_chunks(query, k, documents).await
    }

    async fn vector_dims(&self) -> Result<Option<usize>> {
        self.inner.vector_dims().await
    }

    async fn stats(&self) -> Result<CorpusStats> {
        self.inner.stats().await
    }
}

#[derive(Default)]
struct RecordingProgress(Mutex<Vec<ProgressEvent>>);

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        self.0.lock().unwrap().push(event);
    }
}

/// 15 sentences of exactly 80 characters.
fn lorem_1200() -> String {
    let sentence: String = "lorem ipsum dolor sit amet "
        .chars()
        .cycle()
        .take(79)
        .collect();
    format!("{}.", sentence).repeat(15)
}

struct Harness {
    pipeline: Pipeline,
    store: Arc<InMemoryStore>,
    runtime: Arc<ScriptedRuntime>,
    dir: tempfile::TempDir,
}

impl Harness {
    fn with(extractor: Arc<dyn TextExtractor>, model: HashModel) -> Self {
        Self::assemble(extractor, model, ScriptedRuntime::default(), |s| {
            s as Arc<dyn Store>
        })
    }

    /// `wrap` decides what the pipeline sees in front of the in-memory store.
    fn assemble(
        extractor: Arc<dyn TextExtractor>,
        model: HashModel,
        runtime: ScriptedRuntime,
        wrap: impl FnOnce(Arc<InMemoryStore>) -> Arc<dyn Store>,
    ) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let runtime = Arc::new(runtime);
        let generator = Arc::new(Generator::new(
            runtime.clone(),
            "scripted".to_string(),
            2048,
            SamplingParams::default(),
        ));
        let pipeline = Pipeline::new(
            extractor,
            Arc::new(Embedder::new(Arc::new(model))),
            wrap(store.clone()),
            generator,
            PipelineOptions::default(),
        );
        Self {
            pipeline,
            store,
            runtime,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn new() -> Self {
        Self::with(Arc::new(PdfExtractor::new()), HashModel::new())
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    async fn ingest(&self, path: &Path) -> Result<i64> {
        self.pipeline
            .ingest_document(path, None, &NoProgress, &CancellationToken::new())
            .await
    }

    async fn ask(&self, question: &str) -> Result<docqa_core::models::RagAnswer> {
        self.pipeline
            .answer_question(question, None, None, &CancellationToken::new())
            .await
    }
}

fn warranty_text() -> String {
    let mut text = String::new();
    for _ in 0..4 {
        text.push_str(
            "The warranty covers manufacturing defects for two years from the date of purchase. ",
        );
    }
    text.push_str("\n\n");
    for _ in 0..4 {
        text.push_str(
            "Cleaning the filter every month keeps the machine running quietly and efficiently. ",
        );
    }
    text
}

#[tokio::test]
async fn ingest_chunks_embeds_and_marks_processed() {
    let h = Harness::with(Arc::new(PagedText(3)), HashModel::new());
    let path = h.write("lorem.txt", &lorem_1200());
    let progress = RecordingProgress::default();

    let id = h
        .pipeline
        .ingest_document(&path, Some("Lorem"), &progress, &CancellationToken::new())
        .await
        .unwrap();

    let doc = h.store.get_document(id).await.unwrap().unwrap();
    assert_eq!(doc.title, "Lorem");
    assert_eq!(doc.page_count, 3);
    assert_eq!(doc.total_chunks, 3);
    assert!(doc.is_processed);
    assert!(doc.error_message.is_none());
    assert!(doc.processed_at.is_some());

    let hits = h
        .store
        .nearest_chunks(&vec![1.0; DIMS], 10, None)
        .await
        .unwrap();
    let mut chunks: Vec<_> = hits.into_iter().map(|(c, _)| c).collect();
    chunks.sort_by_key(|c| c.chunk_index);
    assert_eq!(
        chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(
        chunks.iter().map(|c| c.page_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    for c in &chunks {
        let norm: f32 = c.embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    let events = progress.0.lock().unwrap();
    assert!(events.windows(2).all(|w| w[0].fraction <= w[1].fraction));
    assert_eq!(events.last().unwrap().fraction, 1.0);
    assert!(events.iter().all(|e| e.document == "Lorem"));
}

#[tokio::test]
async fn title_defaults_to_file_stem() {
    let h = Harness::new();
    let path = h.write("user-manual.txt", &warranty_text());
    let id = h.ingest(&path).await.unwrap();
    let doc = h.pipeline.get_document(id).await.unwrap().unwrap();
    assert_eq!(doc.title, "user-manual");
}

#[tokio::test]
async fn answer_cites_retrieved_chunks() {
    let h = Harness::new();
    let path = h.write("manual.txt", &warranty_text());
    let id = h.ingest(&path).await.unwrap();

    let answer = h.ask("How long does the warranty last?").await.unwrap();
    assert_eq!(answer.answer, "The warranty lasts two years.");
    assert!(!answer.sources.is_empty());
    let top = &answer.sources[0];
    assert_eq!(top.document_id, id);
    assert_eq!(top.document_title, "manual");
    assert_eq!(top.page_number, 1);
    assert!(top.relevance > 0 && top.relevance <= 100);
    assert!(top.excerpt.chars().count() <= 203);
    assert!(answer
        .sources
        .windows(2)
        .all(|w| w[0].relevance >= w[1].relevance));

    let prompts = h.runtime.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("[1] "));
    assert!(prompts[0].ends_with("Question: How long does the warranty last?\nAnswer:"));
}

#[tokio::test]
async fn empty_index_skips_generation() {
    let h = Harness::new();
    let err = h.ask("Anything there?").await.unwrap_err();
    assert!(matches!(err, RagError::NoRelevantContent));
    assert_eq!(h.runtime.generated.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn document_filter_restricts_retrieval() {
    let h = Harness::new();
    let a = h.ingest(&h.write("a.txt", &warranty_text())).await.unwrap();
    let b = h.ingest(&h.write("b.txt", &lorem_1200())).await.unwrap();

    let answer = h
        .pipeline
        .answer_question("warranty", Some(10), Some(&[b]), &CancellationToken::new())
        .await
        .unwrap();
    assert!(answer.sources.iter().all(|s| s.document_id == b));
    assert!(!answer.sources.iter().any(|s| s.document_id == a));

    let err = h
        .pipeline
        .answer_question("warranty", None, Some(&[999]), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::NoRelevantContent));
}

#[tokio::test]
async fn invalid_questions_rejected() {
    let h = Harness::new();
    h.ingest(&h.write("manual.txt", &warranty_text()))
        .await
        .unwrap();

    assert!(matches!(
        h.ask("   ").await.unwrap_err(),
        RagError::InvalidInput(_)
    ));
    let err = h
        .pipeline
        .answer_question("warranty", Some(0), None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));
    assert_eq!(h.runtime.generated.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn delete_cascades_to_chunks() {
    let h = Harness::new();
    let keep = h.ingest(&h.write("keep.txt", &lorem_1200())).await.unwrap();
    let gone = h
        .ingest(&h.write("gone.txt", &warranty_text()))
        .await
        .unwrap();
    let before = h.pipeline.get_stats().await.unwrap();
    assert_eq!(before.document_count, 2);

    h.pipeline.delete_document(gone).await.unwrap();

    let after = h.pipeline.get_stats().await.unwrap();
    assert_eq!(after.document_count, 1);
    assert_eq!(after.chunk_count, 3);
    let docs = h.pipeline.list_documents().await.unwrap();
    assert_eq!(docs.iter().map(|d| d.id).collect::<Vec<_>>(), vec![keep]);

    let hits = h
        .store
        .nearest_chunks(&vec![1.0; DIMS], 50, None)
        .await
        .unwrap();
    assert!(hits.iter().all(|(c, _)| c.document_id == keep));
}

#[tokio::test]
async fn delete_unknown_document_is_not_found() {
    let h = Harness::new();
    assert!(matches!(
        h.pipeline.delete_document(42).await.unwrap_err(),
        RagError::NotFound(42)
    ));
}

#[tokio::test]
async fn extraction_failure_creates_no_document() {
    let h = Harness::new();
    let missing = h.dir.path().join("missing.txt");
    let err = h.ingest(&missing).await.unwrap_err();
    assert!(matches!(err, RagError::Extraction(_)));

    let blank = h.write("blank.txt", "  \n\n  ");
    assert!(matches!(
        h.ingest(&blank).await.unwrap_err(),
        RagError::Extraction(_)
    ));
    assert!(h.pipeline.list_documents().await.unwrap().is_empty());
}

#[tokio::test]
async fn too_short_text_records_error() {
    let h = Harness::new();
    let err = h
        .ingest(&h.write("note.txt", "Just a short note."))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Extraction(_)));

    let docs = h.pipeline.list_documents().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert!(!docs[0].is_processed);
    assert!(docs[0].error_message.is_some());
    assert_eq!(h.pipeline.get_stats().await.unwrap().chunk_count, 0);
}

#[tokio::test]
async fn cancellation_rolls_back_chunks() {
    let token = CancellationToken::new();
    let h = Harness::with(
        Arc::new(PdfExtractor::new()),
        HashModel::cancelling_after(1, token.clone()),
    );
    let path = h.write("lorem.txt", &lorem_1200());

    let err = h
        .pipeline
        .ingest_document(&path, None, &NoProgress, &token)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Cancelled));

    let docs = h.pipeline.list_documents().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert!(!docs[0].is_processed);
    assert_eq!(
        docs[0].error_message.as_deref(),
        Some("operation cancelled")
    );
    assert_eq!(h.pipeline.get_stats().await.unwrap().chunk_count, 0);
}

#[tokio::test]
async fn embedding_failure_mid_ingest_rolls_back() {
    let h = Harness::with(Arc::new(PdfExtractor::new()), HashModel::failing_on(2));
    let path = h.write("lorem.txt", &lorem_1200());

    let err = h.ingest(&path).await.unwrap_err();
    assert!(matches!(err, RagError::Embedding(_)));
    assert_eq!(err.stage(), Stage::Embedding);

    let docs = h.pipeline.list_documents().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert!(!docs[0].is_processed);
    assert_eq!(docs[0].total_chunks, 0);
    assert!(docs[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("model server went away"));
    assert_eq!(h.store.stats().await.unwrap().chunk_count, 0);
}

#[tokio::test]
async fn store_failure_mid_ingest_rolls_back() {
    let h = Harness::assemble(
        Arc::new(PdfExtractor::new()),
        HashModel::new(),
        ScriptedRuntime::default(),
        |inner| {
            Arc::new(FlakyStore {
                inner,
                inserts: AtomicUsize::new(0),
                fail_on_insert: 2,
            })
        },
    );
    let path = h.write("lorem.txt", &lorem_1200());

    let err = h.ingest(&path).await.unwrap_err();
    assert!(matches!(err, RagError::Index(_)));
    assert_eq!(err.stage(), Stage::Storage);

    let doc = &h.store.list_documents().await.unwrap()[0];
    assert!(!doc.is_processed);
    assert!(doc.error_message.as_deref().unwrap().contains("disk I/O error"));
    // The chunk stored before the failure is gone too.
    assert_eq!(h.store.stats().await.unwrap().chunk_count, 0);
    assert!(h
        .store
        .nearest_chunks(&vec![1.0; DIMS], 10, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn generation_failure_reported_as_generation() {
    let h = Harness::assemble(
        Arc::new(PdfExtractor::new()),
        HashModel::new(),
        ScriptedRuntime::broken(),
        |s| s as Arc<dyn Store>,
    );
    h.ingest(&h.write("manual.txt", &warranty_text()))
        .await
        .unwrap();

    let err = h.ask("How long does the warranty last?").await.unwrap_err();
    assert!(matches!(err, RagError::Generation(_)));
    assert_eq!(err.stage(), Stage::Generation);
    assert_eq!(h.runtime.generated.load(Ordering::SeqCst), 1);

    // Ingested content is untouched by a failed answer.
    let docs = h.pipeline.list_documents().await.unwrap();
    assert!(docs[0].is_processed);
}

#[tokio::test]
async fn cancelled_before_generation() {
    let h = Harness::new();
    h.ingest(&h.write("manual.txt", &warranty_text()))
        .await
        .unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let err = h
        .pipeline
        .answer_question("warranty", None, None, &token)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Cancelled));
    assert_eq!(h.runtime.generated.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn image_ingestion_uses_ocr() {
    let mut h = Harness::new();
    let image = h.write("receipt.png", "");
    let err = h
        .pipeline
        .ingest_image(&image, None, &NoProgress, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Ocr(_)));

    h.pipeline = h.pipeline.with_ocr(Arc::new(FixedOcr(warranty_text())));
    let id = h
        .pipeline
        .ingest_image(&image, Some("Receipt"), &NoProgress, &CancellationToken::new())
        .await
        .unwrap();
    let doc = h.pipeline.get_document(id).await.unwrap().unwrap();
    assert_eq!(doc.title, "Receipt");
    assert_eq!(doc.page_count, 1);
    assert!(doc.is_processed);
}

#[tokio::test]
async fn new_conversation_opens_fresh_session() {
    let h = Harness::new();
    h.ingest(&h.write("manual.txt", &warranty_text()))
        .await
        .unwrap();

    h.ask("warranty?").await.unwrap();
    h.ask("filter?").await.unwrap();
    assert_eq!(h.runtime.sessions.load(Ordering::SeqCst), 1);

    h.pipeline.new_conversation().await.unwrap();
    assert_eq!(
        h.pipeline.generator().state().await,
        GeneratorState::EngineLoaded
    );
    h.ask("warranty?").await.unwrap();
    assert_eq!(h.runtime.sessions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn shutdown_closes_generator() {
    let h = Harness::new();
    h.ingest(&h.write("manual.txt", &warranty_text()))
        .await
        .unwrap();
    h.ask("warranty?").await.unwrap();

    h.pipeline.shutdown().await;
    assert_eq!(h.pipeline.generator().state().await, GeneratorState::Closed);
    assert!(matches!(
        h.ask("warranty?").await.unwrap_err(),
        RagError::Generation(_)
    ));
}
