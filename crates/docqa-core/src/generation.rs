//! Language model runtime trait and sampling parameters.
//!
//! [`LlmRuntime`] mirrors the lifecycle of an on-device LLM runtime: an
//! engine is loaded once, then sessions are opened, fed input, asked to
//! generate, and closed. The app crate's `Generator` drives this trait
//! through an explicit state machine.

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// Per-session sampling configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    /// Softmax temperature. Low values favour factual consistency.
    pub temperature: f32,
    /// Sample from the `top_k` most likely tokens.
    pub top_k: u32,
    /// Nucleus sampling mass.
    pub top_p: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            top_k: 40,
            top_p: 0.9,
        }
    }
}

impl SamplingParams {
    /// Reject values the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::InvalidInput(format!(
                "temperature must be in [0, 2], got {}",
                self.temperature
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::InvalidInput("top_k must be >= 1".to_string()));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(RagError::InvalidInput(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        Ok(())
    }
}

/// An external generative model runtime.
///
/// Implementations hold at most one engine and one session. Failures map to
/// [`RagError::Generation`].
#[async_trait]
pub trait LlmRuntime: Send + Sync {
    /// Load the model into memory with a total token allowance.
    async fn load_engine(&self, model: &str, max_tokens: usize) -> Result<()>;
    /// Open a conversation session with the given sampling parameters.
    async fn create_session(&self, params: &SamplingParams) -> Result<()>;
    /// Append input text to the session context.
    async fn add_input(&self, text: &str) -> Result<()>;
    /// Produce a response for the accumulated context.
    async fn generate(&self) -> Result<String>;
    /// Release the current session.
    async fn close_session(&self) -> Result<()>;
    /// Release the engine.
    async fn close_engine(&self) -> Result<()>;
}
