//! Text extraction for uploaded files.
//!
//! [`PdfExtractor`] reads PDFs page by page with `pdf-extract` and plain
//! text/Markdown files as UTF-8. The extension decides the format; anything
//! else is an extraction error. No panic escapes: `pdf-extract` runs on a
//! blocking thread and a panic there surfaces as an error.

use std::path::Path;

use async_trait::async_trait;

use docqa_core::error::{RagError, Result};
use docqa_core::extract::{ExtractedText, TextExtractor};

/// File formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    PlainText,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(FileKind::Pdf),
            "txt" | "md" | "markdown" => Some(FileKind::PlainText),
            _ => None,
        }
    }
}

/// Extracts text from `.pdf`, `.txt`, and `.md` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

/// Extract text from PDF bytes. Pages are joined with blank lines.
pub fn extract_pdf(bytes: &[u8]) -> Result<ExtractedText> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| RagError::Extraction(format!("PDF extraction failed: {}", e)))?;
    let page_count = pages.len() as i64;
    let text = pages
        .iter()
        .map(|p| p.trim())
        .collect::<Vec<_>>()
        .join("\n\n");
    Ok(ExtractedText::new(text, page_count))
}

#[async_trait]
impl TextExtractor for PdfExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedText> {
        let kind = FileKind::from_path(path).ok_or_else(|| {
            RagError::Extraction(format!("unsupported file type: {}", path.display()))
        })?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RagError::Extraction(format!("{}: {}", path.display(), e)))?;

        match kind {
            FileKind::PlainText => {
                let text = String::from_utf8(bytes).map_err(|_| {
                    RagError::Extraction(format!("{} is not valid UTF-8", path.display()))
                })?;
                Ok(ExtractedText::new(text, 1))
            }
            FileKind::Pdf => tokio::task::spawn_blocking(move || extract_pdf(&bytes))
                .await
                .map_err(|e| RagError::Extraction(format!("PDF parser crashed: {}", e)))?,
        }
    }
}
