//! Traits for turning source files into plain text.
//!
//! [`TextExtractor`] covers documents with a text layer (PDF, plain text);
//! [`OcrEngine`] covers images. Both are external collaborators: the app
//! crate ships a PDF extractor, and hosts plug in their own OCR.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

/// Plain text pulled out of a source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: i64,
    pub word_count: i64,
}

impl ExtractedText {
    /// Build from text and a page count, counting words.
    pub fn new(text: String, page_count: i64) -> Self {
        let word_count = count_words(&text);
        Self {
            text,
            page_count,
            word_count,
        }
    }
}

/// Extracts the text layer of a document file.
///
/// Failures map to [`RagError::Extraction`](crate::RagError::Extraction).
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<ExtractedText>;
}

/// Recognizes text in an image.
///
/// Failures map to [`RagError::Ocr`](crate::RagError::Ocr).
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &Path) -> Result<String>;
}

/// Approximate word count: whitespace-separated tokens.
pub fn count_words(text: &str) -> i64 {
    text.split_whitespace().count() as i64
}
