//! RAG orchestration.
//!
//! [`Pipeline`] ties the collaborators together:
//!
//! ```text
//! ingest:  file ─▶ extract ─▶ normalize ─▶ store doc ─▶ chunk ─▶ embed ─▶ index ─▶ mark processed
//! answer:  question ─▶ embed ─▶ top-k query ─▶ prompt ─▶ generate ─▶ answer + citations
//! ```
//!
//! Every step is sequenced with `.await`; chunks are processed in document
//! order. Failures carry their stage in the [`RagError`] kind and nothing is
//! retried. Long operations take a [`CancellationToken`] that is checked
//! between chunks and before generation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use docqa_core::chunk::{chunk_text, estimate_page, normalize_text, ChunkingParams};
use docqa_core::error::{RagError, Result};
use docqa_core::extract::{count_words, OcrEngine, TextExtractor};
use docqa_core::index::VectorIndex;
use docqa_core::models::{
    CorpusStats, Document, NewChunk, NewDocument, RagAnswer, ScoredChunk, SourceCitation,
};
use docqa_core::prompt::{PromptBudget, PromptBuilder};
use docqa_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_model, Embedder};
use crate::extract::PdfExtractor;
use crate::generation::{Generator, OllamaRuntime};
use crate::migrate;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::sqlite_store::SqliteStore;

/// Citation excerpts are cut to this many characters.
pub const EXCERPT_CHARS: usize = 200;

/// Tunables that are not owned by a collaborator.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub chunking: ChunkingParams,
    pub budget: PromptBudget,
    /// Chunks retrieved per question when the caller does not say.
    pub top_k: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingParams::default(),
            budget: PromptBudget::default(),
            top_k: 5,
        }
    }
}

/// The document question-answering pipeline.
pub struct Pipeline {
    extractor: Arc<dyn TextExtractor>,
    ocr: Option<Arc<dyn OcrEngine>>,
    embedder: Arc<Embedder>,
    index: VectorIndex,
    generator: Arc<Generator>,
    prompts: PromptBuilder,
    options: PipelineOptions,
}

/// First [`EXCERPT_CHARS`] characters of `text`, with `...` when cut.
pub fn excerpt(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", cut.trim_end())
}

/// Similarity in `[0, 1]` as a whole percentage.
pub fn relevance_percent(similarity: f32) -> u8 {
    if similarity.is_nan() {
        return 0;
    }
    (similarity.clamp(0.0, 1.0) * 100.0).round() as u8
}

struct Reporter<'a> {
    inner: &'a dyn ProgressReporter,
    document: String,
}

impl Reporter<'_> {
    fn step(&self, fraction: f32, status: impl Into<String>) {
        self.inner.report(ProgressEvent {
            document: self.document.clone(),
            fraction,
            status: status.into(),
        });
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(RagError::Cancelled);
    }
    Ok(())
}

fn display_name(path: &Path, title: Option<&str>) -> String {
    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => t.to_string(),
        None => path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string(),
    }
}

impl Pipeline {
    /// Assemble a pipeline. The index dimension is taken from the embedder.
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<Embedder>,
        store: Arc<dyn Store>,
        generator: Arc<Generator>,
        options: PipelineOptions,
    ) -> Self {
        let index = VectorIndex::new(store, embedder.dims());
        Self {
            extractor,
            ocr: None,
            embedder,
            index,
            generator,
            prompts: PromptBuilder::new(options.budget),
            options,
        }
    }

    /// Enable [`ingest_image`](Self::ingest_image) with an OCR engine.
    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn embedder(&self) -> &Arc<Embedder> {
        &self.embedder
    }

    pub fn generator(&self) -> &Arc<Generator> {
        &self.generator
    }

    fn store(&self) -> &Arc<dyn Store> {
        self.index.store()
    }

    /// Fail if the store holds vectors from a different embedding model.
    pub async fn check_dimensions(&self) -> Result<()> {
        self.index.check_dimensions().await
    }

    /// Extract, chunk, embed, and index a document file. Returns its id.
    ///
    /// Extraction failures create no document. Any later failure removes the
    /// chunks indexed so far and records the error on the document.
    pub async fn ingest_document(
        &self,
        path: &Path,
        title: Option<&str>,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<i64> {
        let reporter = Reporter {
            inner: reporter,
            document: display_name(path, title),
        };
        reporter.step(0.0, "extracting text");
        let extracted = self.extractor.extract(path).await?;
        info!(
            path = %path.display(),
            pages = extracted.page_count,
            words = extracted.word_count,
            "extracted document text"
        );
        self.ingest_text(path, &extracted.text, extracted.page_count, &reporter, cancel)
            .await
    }

    /// OCR an image and index its text as a one-page document.
    pub async fn ingest_image(
        &self,
        path: &Path,
        title: Option<&str>,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<i64> {
        let ocr = self
            .ocr
            .as_ref()
            .ok_or_else(|| RagError::Ocr("no OCR engine configured".to_string()))?;
        let reporter = Reporter {
            inner: reporter,
            document: display_name(path, title),
        };
        reporter.step(0.0, "recognizing text");
        let text = ocr.recognize(path).await?;
        self.ingest_text(path, &text, 1, &reporter, cancel).await
    }

    async fn ingest_text(
        &self,
        path: &Path,
        raw: &str,
        page_count: i64,
        reporter: &Reporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<i64> {
        let text = normalize_text(raw);
        if text.is_empty() {
            return Err(RagError::Extraction(format!(
                "no text could be extracted from {}",
                path.display()
            )));
        }
        check_cancelled(cancel)?;

        let id = self
            .store()
            .insert_document(&NewDocument {
                title: reporter.document.clone(),
                file_path: path.display().to_string(),
                full_text: text.clone(),
                page_count: page_count.max(1),
                word_count: count_words(&text),
                uploaded_at: chrono::Utc::now().timestamp(),
            })
            .await?;
        reporter.step(0.1, "saved document");

        match self.process(id, &text, page_count, reporter, cancel).await {
            Ok(total) => {
                reporter.step(1.0, format!("done ({} chunks)", total));
                info!(document_id = id, chunks = total, "ingested document");
                Ok(id)
            }
            Err(e) => {
                warn!(document_id = id, stage = %e.stage(), error = %e, "ingestion failed");
                if let Err(cleanup) = self.index.delete_by_document(id).await {
                    warn!(document_id = id, error = %cleanup, "failed to remove partial chunks");
                }
                if let Err(mark) = self.store().mark_failed(id, &e.to_string()).await {
                    warn!(document_id = id, error = %mark, "failed to record ingestion error");
                }
                reporter.step(1.0, format!("failed: {}", e));
                Err(e)
            }
        }
    }

    /// Chunk, embed, index, and mark processed. Returns the chunk count.
    async fn process(
        &self,
        id: i64,
        text: &str,
        page_count: i64,
        reporter: &Reporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<i64> {
        let chunks = chunk_text(text, &self.options.chunking);
        if chunks.is_empty() {
            return Err(RagError::Extraction(format!(
                "document text is too short to index (minimum {} characters)",
                self.options.chunking.min_chunk_size
            )));
        }
        reporter.step(0.15, format!("split into {} chunks", chunks.len()));

        let text_len = text.chars().count();
        let total = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            check_cancelled(cancel)?;
            let embedding = self.embedder.embed(&chunk.text).await?;
            self.index
                .insert(NewChunk {
                    document_id: id,
                    chunk_index: chunk.index as i64,
                    page_number: estimate_page(chunk.start, text_len, page_count),
                    start_offset: chunk.start as i64,
                    end_offset: chunk.end as i64,
                    text: chunk.text,
                    embedding,
                    created_at: chrono::Utc::now().timestamp(),
                })
                .await?;
            let done = (i + 1) as f32 / total as f32;
            reporter.step(
                0.15 + 0.8 * done,
                format!("embedding chunk {} / {}", i + 1, total),
            );
        }

        self.store()
            .mark_processed(id, total as i64, chrono::Utc::now().timestamp())
            .await?;
        Ok(total as i64)
    }

    /// Answer a question from the indexed documents.
    ///
    /// `top_k` defaults to the configured value; `documents` restricts
    /// retrieval to the given document ids.
    pub async fn answer_question(
        &self,
        question: &str,
        top_k: Option<usize>,
        documents: Option<&[i64]>,
        cancel: &CancellationToken,
    ) -> Result<RagAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidInput("question is empty".to_string()));
        }
        let k = top_k.unwrap_or(self.options.top_k);
        if k == 0 {
            return Err(RagError::InvalidInput("top_k must be >= 1".to_string()));
        }

        let vector = self.embedder.embed(question).await?;
        let hits = self.index.query(&vector, k, documents).await?;
        if hits.is_empty() {
            info!("no chunks retrieved; skipping generation");
            return Err(RagError::NoRelevantContent);
        }

        let prompt = self.prompts.build(question, &hits)?;
        debug!(
            retrieved = hits.len(),
            used = prompt.chunks_used,
            truncated = prompt.truncated,
            tokens = prompt.estimated_tokens(),
            "built prompt"
        );

        check_cancelled(cancel)?;
        let answer = self.generator.generate(&prompt.text).await?;
        let sources = self.citations(&hits[..prompt.chunks_used]).await?;
        info!(sources = sources.len(), "answered question");
        Ok(RagAnswer { answer, sources })
    }

    async fn citations(&self, hits: &[ScoredChunk]) -> Result<Vec<SourceCitation>> {
        let mut titles: HashMap<i64, String> = HashMap::new();
        let mut sources = Vec::with_capacity(hits.len());
        for hit in hits {
            let document_id = hit.chunk.document_id;
            if !titles.contains_key(&document_id) {
                let title = self
                    .store()
                    .get_document(document_id)
                    .await?
                    .map(|d| d.title)
                    .unwrap_or_else(|| format!("document {}", document_id));
                titles.insert(document_id, title);
            }
            sources.push(SourceCitation {
                document_id,
                document_title: titles.get(&document_id).cloned().unwrap_or_default(),
                page_number: hit.chunk.page_number,
                excerpt: excerpt(&hit.chunk.text),
                relevance: relevance_percent(hit.similarity),
            });
        }
        Ok(sources)
    }

    pub async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        self.store().get_document(id).await
    }

    /// All documents, newest first.
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        self.store().list_documents().await
    }

    /// Remove a document and its chunks.
    pub async fn delete_document(&self, id: i64) -> Result<()> {
        if !self.store().delete_document(id).await? {
            return Err(RagError::NotFound(id));
        }
        info!(document_id = id, "deleted document");
        Ok(())
    }

    pub async fn get_stats(&self) -> Result<CorpusStats> {
        self.store().stats().await
    }

    /// Start a fresh conversation: the next answer opens a new session.
    pub async fn new_conversation(&self) -> Result<()> {
        self.generator.reset_session().await
    }

    /// Release the language model. The pipeline cannot answer afterwards.
    pub async fn shutdown(&self) {
        self.generator.close().await;
    }
}

/// Build the SQLite-backed pipeline described by `config`.
pub async fn open_pipeline(config: &Config) -> anyhow::Result<Pipeline> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

    let model = create_model(&config.embedding)?;
    let embedder = Arc::new(Embedder::new(model));

    let runtime = Arc::new(
        OllamaRuntime::new(&config.generation).context("Failed to create generation runtime")?,
    );
    let generator = Arc::new(Generator::new(
        runtime,
        config.generation.model.clone(),
        config.generation.max_total_tokens,
        config.generation.sampling(),
    ));

    let pipeline = Pipeline::new(
        Arc::new(PdfExtractor::new()),
        embedder,
        store,
        generator,
        PipelineOptions {
            chunking: config.chunking.params(),
            budget: config.generation.budget(),
            top_k: config.retrieval.top_k,
        },
    );
    pipeline
        .check_dimensions()
        .await
        .context("Embedding model does not match the indexed documents")?;
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_short_text_untouched() {
        assert_eq!(excerpt("  short text "), "short text");
    }

    #[test]
    fn excerpt_long_text_cut_with_ellipsis() {
        let text = "é".repeat(250);
        let e = excerpt(&text);
        assert!(e.ends_with("..."));
        assert_eq!(e.chars().count(), EXCERPT_CHARS + 3);
    }

    #[test]
    fn relevance_rounding() {
        assert_eq!(relevance_percent(0.874), 87);
        assert_eq!(relevance_percent(0.875), 88);
        assert_eq!(relevance_percent(1.2), 100);
        assert_eq!(relevance_percent(f32::NAN), 0);
    }

    #[test]
    fn display_name_prefers_title() {
        let path = Path::new("/tmp/annual-report.pdf");
        assert_eq!(display_name(path, Some("Report 2024")), "Report 2024");
        assert_eq!(display_name(path, Some("  ")), "annual-report");
        assert_eq!(display_name(path, None), "annual-report");
    }
}
