//! `docqa ingest`: index one document file.
//!
//! Ctrl-C cancels cooperatively: the pipeline stops between chunks, removes
//! what it already indexed, and records the cancellation on the document.

use std::path::Path;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::pipeline::open_pipeline;
use crate::progress::ProgressMode;

pub async fn run_ingest(
    config: &Config,
    path: &Path,
    title: Option<&str>,
    progress: ProgressMode,
) -> Result<()> {
    let pipeline = open_pipeline(config).await?;
    let reporter = progress.reporter();

    let cancel = CancellationToken::new();
    let on_interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = pipeline
        .ingest_document(path, title, reporter.as_ref(), &cancel)
        .await;
    on_interrupt.abort();

    let id = result.with_context(|| format!("Failed to ingest {}", path.display()))?;
    let doc = pipeline.get_document(id).await?;
    pipeline.shutdown().await;

    match doc {
        Some(doc) => println!(
            "Ingested \"{}\" (id {}): {} pages, {} words, {} chunks",
            doc.title, doc.id, doc.page_count, doc.word_count, doc.total_chunks
        ),
        None => println!("Ingested document {}", id),
    }
    Ok(())
}
