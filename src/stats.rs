//! Corpus statistics and health overview.
//!
//! Provides a quick summary of what's indexed: document, chunk, and word
//! counts, plus a per-document breakdown showing which documents failed to
//! ingest. Used by `docqa stats`.

use anyhow::Result;

use docqa_core::models::{CorpusStats, Document};

use crate::config::Config;
use crate::pipeline::open_pipeline;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pipeline = open_pipeline(config).await?;
    let stats = pipeline.get_stats().await?;
    let docs = pipeline.list_documents().await?;
    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    print!(
        "{}",
        render_stats(&config.db.path.display().to_string(), db_size, &stats, &docs)
    );
    Ok(())
}

/// Render the stats report.
pub fn render_stats(db_path: &str, db_size: u64, stats: &CorpusStats, docs: &[Document]) -> String {
    let mut out = String::new();
    out.push_str("docqa: Corpus Stats\n");
    out.push_str("===================\n\n");
    out.push_str(&format!("  Database:    {}\n", db_path));
    out.push_str(&format!("  Size:        {}\n\n", format_bytes(db_size)));
    out.push_str(&format!("  Documents:   {}\n", stats.document_count));
    out.push_str(&format!("  Chunks:      {}\n", stats.chunk_count));
    out.push_str(&format!("  Words:       {}\n", stats.word_count));

    let failed = docs.iter().filter(|d| d.error_message.is_some()).count();
    if failed > 0 {
        out.push_str(&format!("  Failed:      {}\n", failed));
    }

    if !docs.is_empty() {
        out.push_str("\n  By document:\n");
        out.push_str(&format!(
            "  {:>5}  {:<32} {:>6} {:>7}   {}\n",
            "ID", "TITLE", "PAGES", "CHUNKS", "UPLOADED"
        ));
        out.push_str(&format!("  {}\n", "-".repeat(72)));
        for d in docs {
            let chunks = if d.is_processed {
                d.total_chunks.to_string()
            } else if d.error_message.is_some() {
                "failed".to_string()
            } else {
                "-".to_string()
            };
            out.push_str(&format!(
                "  {:>5}  {:<32} {:>6} {:>7}   {}\n",
                d.id,
                truncate(&d.title, 32),
                d.page_count,
                chunks,
                format_ts_relative(d.uploaded_at)
            ));
        }
    }
    out.push('\n');
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut)
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
pub fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: i64, title: &str, processed: bool, error: Option<&str>) -> Document {
        Document {
            id,
            title: title.to_string(),
            file_path: format!("{}.pdf", title),
            full_text: String::new(),
            page_count: 2,
            word_count: 100,
            total_chunks: if processed { 4 } else { 0 },
            is_processed: processed,
            error_message: error.map(str::to_string),
            uploaded_at: chrono::Utc::now().timestamp(),
            processed_at: None,
        }
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(12), "12 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn relative_timestamps() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 120), "2 mins ago");
        assert_eq!(format_ts_relative(now - 3600), "1 hour ago");
    }

    #[test]
    fn report_marks_failed_documents() {
        let stats = CorpusStats {
            document_count: 2,
            chunk_count: 4,
            word_count: 200,
        };
        let docs = vec![
            doc(2, "broken", false, Some("embedding failed")),
            doc(1, "manual", true, None),
        ];
        let out = render_stats("db.sqlite", 4096, &stats, &docs);
        assert!(out.contains("Documents:   2"));
        assert!(out.contains("Failed:      1"));
        assert!(out.contains("failed"));
        assert!(out.contains("manual"));
    }

    #[test]
    fn long_titles_truncated() {
        let t = truncate(&"x".repeat(40), 32);
        assert_eq!(t.chars().count(), 32);
        assert!(t.ends_with('…'));
    }
}
