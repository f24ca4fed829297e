//! Error taxonomy shared by every pipeline stage.
//!
//! Each collaborator maps its own failures into one [`RagError`] kind, so
//! callers can always tell which stage of ingestion or question answering
//! failed via [`RagError::stage`]. Nothing in the pipeline retries.

use std::fmt;

/// Result alias used throughout docqa.
pub type Result<T> = std::result::Result<T, RagError>;

/// A failure in one stage of the RAG pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// The source file could not be read or parsed.
    #[error("text extraction failed: {0}")]
    Extraction(String),

    /// Optical character recognition failed on an image.
    #[error("OCR failed: {0}")]
    Ocr(String),

    /// The embedding model is not loaded, or inference failed.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The vector store could not be read or written.
    #[error("vector index error: {0}")]
    Index(String),

    /// The nearest-neighbour lookup for a question failed.
    #[error("vector search failed: {0}")]
    Retrieval(String),

    /// The language model engine or session failed.
    #[error("generation failed: {0}")]
    Generation(String),

    /// No document exists with this id.
    #[error("document {0} not found")]
    NotFound(i64),

    /// Retrieval returned zero chunks for the question.
    #[error("no relevant information found in the indexed documents")]
    NoRelevantContent,

    /// The caller supplied input the pipeline cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The operation was cancelled cooperatively.
    #[error("operation cancelled")]
    Cancelled,
}

/// Pipeline stage a [`RagError`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Input,
    Extraction,
    Ocr,
    Embedding,
    Retrieval,
    Storage,
    Generation,
}

impl RagError {
    /// The stage that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            RagError::Extraction(_) => Stage::Extraction,
            RagError::Ocr(_) => Stage::Ocr,
            RagError::Embedding(_) => Stage::Embedding,
            RagError::Index(_) => Stage::Storage,
            RagError::Retrieval(_) => Stage::Retrieval,
            RagError::Generation(_) => Stage::Generation,
            RagError::NotFound(_) => Stage::Storage,
            RagError::NoRelevantContent => Stage::Retrieval,
            RagError::InvalidInput(_) | RagError::Cancelled => Stage::Input,
        }
    }

    /// Shorthand for mapping a foreign error into [`RagError::Index`].
    pub fn index(err: impl fmt::Display) -> Self {
        RagError::Index(err.to_string())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Input => "input",
            Stage::Extraction => "extraction",
            Stage::Ocr => "ocr",
            Stage::Embedding => "embedding",
            Stage::Retrieval => "retrieval",
            Stage::Storage => "storage",
            Stage::Generation => "generation",
        };
        f.write_str(name)
    }
}
