//! Prompt assembly under a hard token budget.
//!
//! A prompt is laid out as:
//!
//! ```text
//! <preamble>
//! Context:
//! [1] <chunk text>
//!
//! [2] <chunk text>
//!
//! Question: <question>
//! Answer:
//! ```
//!
//! Tokens are estimated as `ceil(chars / 4)`. Only chunk text is ever cut;
//! the preamble and the question are kept whole or the build fails.

use crate::error::{RagError, Result};
use crate::models::ScoredChunk;

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// A partially fitting chunk is kept only if at least this many characters
/// of it fit.
const MIN_PARTIAL_CHARS: usize = 40;

const PREAMBLE: &str = "You are a helpful assistant that answers questions about the user's \
documents. Answer using only the numbered context passages below. If the context does not \
contain the answer, say that you could not find it in the documents.\n\nContext:\n";

/// Estimated token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Total context window split between prompt input and generated output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptBudget {
    pub max_total_tokens: usize,
    pub reserved_output_tokens: usize,
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self {
            max_total_tokens: 2048,
            reserved_output_tokens: 512,
        }
    }
}

impl PromptBudget {
    /// Tokens available to the prompt itself.
    pub fn input_tokens(&self) -> usize {
        self.max_total_tokens
            .saturating_sub(self.reserved_output_tokens)
    }
}

/// An assembled prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    /// Chunks included in full or in part, counted from the first.
    pub chunks_used: usize,
    /// Whether the last included chunk was cut short.
    pub truncated: bool,
}

impl Prompt {
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.text)
    }
}

/// Builds prompts that never exceed the input allowance of a [`PromptBudget`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder {
    budget: PromptBudget,
}

impl PromptBuilder {
    pub fn new(budget: PromptBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> PromptBudget {
        self.budget
    }

    /// Assemble a prompt from a question and retrieved chunks, in retrieval order.
    pub fn build(&self, question: &str, chunks: &[ScoredChunk]) -> Result<Prompt> {
        let question = question.trim();
        let tail = format!("Question: {}\nAnswer:", question);
        let fixed_chars = PREAMBLE.chars().count() + tail.chars().count();
        let allowance_chars = self.budget.input_tokens() * CHARS_PER_TOKEN;

        if fixed_chars > allowance_chars {
            return Err(RagError::InvalidInput(format!(
                "question is too long for the prompt budget ({} tokens needed, {} available)",
                fixed_chars.div_ceil(CHARS_PER_TOKEN),
                self.budget.input_tokens()
            )));
        }

        let mut remaining = allowance_chars - fixed_chars;
        let mut text = String::from(PREAMBLE);
        let mut chunks_used = 0;
        let mut truncated = false;

        for (i, scored) in chunks.iter().enumerate() {
            let body = scored.chunk.text.trim();
            let header = format!("[{}] ", i + 1);
            let overhead = header.chars().count() + 2;
            let body_chars = body.chars().count();

            if overhead + body_chars <= remaining {
                text.push_str(&header);
                text.push_str(body);
                text.push_str("\n\n");
                remaining -= overhead + body_chars;
                chunks_used += 1;
                continue;
            }

            let fit = remaining.saturating_sub(overhead);
            if fit >= MIN_PARTIAL_CHARS {
                let partial: String = body.chars().take(fit).collect();
                text.push_str(&header);
                text.push_str(partial.trim_end());
                text.push_str("\n\n");
                chunks_used += 1;
                truncated = true;
            }
            break;
        }

        text.push_str(&tail);
        Ok(Prompt {
            text,
            chunks_used,
            truncated,
        })
    }
}
