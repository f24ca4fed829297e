//! Sentence-aware, overlapping text chunker.
//!
//! Splits normalized document text into [`TextChunk`]s of bounded size.
//! Each chunk remembers the character window it was cut from so callers
//! can estimate the source page and reason about overlap.
//!
//! # Algorithm
//!
//! 1. Open a window of `chunk_size` characters at the current start.
//! 2. If the window reaches the end of the text, it becomes the last chunk.
//! 3. Otherwise look backward from the window end for the last `.` or `\n`.
//!    If the break after it lies past half the window, cut there; else hard
//!    cut at `chunk_size`.
//! 4. Trim the piece; pieces shorter than `min_chunk_size` are dropped.
//! 5. Start the next window `overlap` characters before the cut.
//!
//! All lengths and offsets count Unicode scalar values, never bytes.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::{chunk_text, ChunkingParams};
//!
//! let text = "A sentence that is long enough to keep around. ".repeat(30);
//! let chunks = chunk_text(&text, &ChunkingParams::default());
//! assert!(chunks.len() > 1);
//! assert_eq!(chunks[0].index, 0);
//! assert!(chunks.iter().all(|c| c.text.chars().count() <= 500));
//! ```

/// Target chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Characters shared between consecutive windows.
pub const DEFAULT_OVERLAP: usize = 75;
/// Pieces shorter than this are discarded.
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 100;

/// Chunking policy. Chunking is a pure function of the text and these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub chunk_size: usize,
    pub overlap: usize,
    pub min_chunk_size: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
        }
    }
}

/// One chunk of text and the window of the source it was cut from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Ordinal position among the kept chunks, starting at 0.
    pub index: usize,
    /// Trimmed chunk text.
    pub text: String,
    /// Character offset of the window start.
    pub start: usize,
    /// Character offset one past the window end.
    pub end: usize,
}

/// Split `text` into overlapping, sentence-aware chunks.
///
/// Returns an empty vector when the text is empty or every piece falls
/// below `min_chunk_size`.
///
/// # Guarantees
///
/// - Chunk indices are contiguous: `0, 1, 2, …, N-1`.
/// - Every chunk is non-empty and at least `min_chunk_size` characters.
/// - No chunk exceeds `chunk_size` characters.
/// - Window starts strictly increase.
pub fn chunk_text(text: &str, params: &ChunkingParams) -> Vec<TextChunk> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let size = params.chunk_size.max(1);

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < len {
        let mut end = (start + size).min(len);
        if end < len {
            end = sentence_break(&chars, start, end, size).unwrap_or(end);
        }

        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() && trimmed.chars().count() >= params.min_chunk_size {
            chunks.push(TextChunk {
                index: chunks.len(),
                text: trimmed.to_string(),
                start,
                end,
            });
        }

        if end >= len {
            break;
        }
        start = end.saturating_sub(params.overlap).max(start + 1);
    }

    chunks
}

/// Absolute position just after the last `.` or `\n` in the window, if that
/// position lies past the window midpoint.
fn sentence_break(chars: &[char], start: usize, end: usize, size: usize) -> Option<usize> {
    let pos = chars[start..end]
        .iter()
        .rposition(|&c| c == '.' || c == '\n')?;
    let brk = pos + 1;
    (brk > size / 2).then_some(start + brk)
}

/// Canonicalize extracted text before chunking.
///
/// Line endings become `\n`, runs of other whitespace become a single
/// space, three or more consecutive newlines collapse to a paragraph break,
/// and leading/trailing whitespace is removed.
pub fn normalize_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;
    let mut space = false;

    for c in text.chars() {
        if c == '\n' {
            newlines += 1;
            space = false;
            continue;
        }
        if c.is_whitespace() {
            space = true;
            continue;
        }
        if !out.is_empty() {
            if newlines >= 2 {
                out.push_str("\n\n");
            } else if newlines == 1 {
                out.push('\n');
            } else if space {
                out.push(' ');
            }
        }
        newlines = 0;
        space = false;
        out.push(c);
    }

    out
}

/// Estimate the 1-based page a character offset falls on, assuming text is
/// spread evenly across `page_count` pages.
pub fn estimate_page(start_offset: usize, text_len: usize, page_count: i64) -> i64 {
    if page_count <= 1 || text_len == 0 {
        return 1;
    }
    let page = (start_offset as u128 * page_count as u128 / text_len as u128) as i64 + 1;
    page.clamp(1, page_count)
}
