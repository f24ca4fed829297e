//! `docqa list` and `docqa delete`: manage indexed documents.

use anyhow::{Context, Result};

use docqa_core::models::Document;

use crate::config::Config;
use crate::pipeline::open_pipeline;
use crate::stats::format_ts_relative;

fn status(doc: &Document) -> String {
    match (&doc.error_message, doc.is_processed) {
        (_, true) => "ready".to_string(),
        (Some(err), false) => format!("failed: {}", err),
        (None, false) => "processing".to_string(),
    }
}

/// Render the document table printed by `docqa list`.
pub fn render_documents(docs: &[Document]) -> String {
    if docs.is_empty() {
        return "No documents. Add one with `docqa ingest <file>`.\n".to_string();
    }
    let mut out = format!(
        "{:>5}  {:<32} {:>5} {:>7} {:>7}  {:<14} {}\n",
        "ID", "TITLE", "PAGES", "WORDS", "CHUNKS", "UPLOADED", "STATUS"
    );
    for d in docs {
        out.push_str(&format!(
            "{:>5}  {:<32} {:>5} {:>7} {:>7}  {:<14} {}\n",
            d.id,
            d.title,
            d.page_count,
            d.word_count,
            d.total_chunks,
            format_ts_relative(d.uploaded_at),
            status(d)
        ));
    }
    out
}

pub async fn run_list(config: &Config) -> Result<()> {
    let pipeline = open_pipeline(config).await?;
    let docs = pipeline.list_documents().await?;
    print!("{}", render_documents(&docs));
    Ok(())
}

pub async fn run_delete(config: &Config, id: i64) -> Result<()> {
    let pipeline = open_pipeline(config).await?;
    pipeline
        .delete_document(id)
        .await
        .with_context(|| format!("Failed to delete document {}", id))?;
    println!("Deleted document {}.", id);
    Ok(())
}
