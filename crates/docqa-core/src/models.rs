//! Core data models shared across docqa.
//!
//! These types represent the documents, chunks, retrieval hits, and
//! conversation turns that flow through the ingestion and answering pipeline.

use serde::Serialize;

/// An uploaded source document as persisted by a [`Store`](crate::store::Store).
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub file_path: String,
    pub full_text: String,
    pub page_count: i64,
    pub word_count: i64,
    pub total_chunks: i64,
    pub is_processed: bool,
    pub error_message: Option<String>,
    /// Unix seconds.
    pub uploaded_at: i64,
    /// Unix seconds; set once ingestion succeeds.
    pub processed_at: Option<i64>,
}

/// Fields supplied when a document is first recorded, before ingestion.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub file_path: String,
    pub full_text: String,
    pub page_count: i64,
    pub word_count: i64,
    pub uploaded_at: i64,
}

/// A retrievable unit of document text with its embedding.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentChunk {
    pub id: i64,
    pub document_id: i64,
    pub chunk_index: i64,
    pub text: String,
    pub page_number: i64,
    /// Character offset of the chunk window start in the document's `full_text`.
    pub start_offset: i64,
    /// Character offset one past the chunk window end.
    pub end_offset: i64,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub created_at: i64,
}

/// A chunk ready to be written to the vector index.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub document_id: i64,
    pub chunk_index: i64,
    pub text: String,
    pub page_number: i64,
    pub start_offset: i64,
    pub end_offset: i64,
    pub embedding: Vec<f32>,
    pub created_at: i64,
}

/// A retrieved chunk with its similarity to the query, in `[0, 1]`.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub similarity: f32,
}

/// Links an answer back to the chunk that grounded it.
#[derive(Debug, Clone, Serialize)]
pub struct SourceCitation {
    pub document_id: i64,
    pub document_title: String,
    pub page_number: i64,
    pub excerpt: String,
    /// Relevance percentage derived from similarity, `0..=100`.
    pub relevance: u8,
}

/// The result of answering one question.
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
}

/// Corpus-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    pub document_count: i64,
    pub chunk_count: i64,
    pub word_count: i64,
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of a conversation. Held in memory only.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: i64,
    pub sources: Vec<SourceCitation>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp(),
            sources: Vec::new(),
        }
    }

    pub fn assistant(answer: RagAnswer) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: answer.answer,
            timestamp: chrono::Utc::now().timestamp(),
            sources: answer.sources,
        }
    }

    /// An assistant turn carrying an error rendered for the user.
    pub fn assistant_error(message: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: message.into(),
            timestamp: chrono::Utc::now().timestamp(),
            sources: Vec::new(),
        }
    }
}
