//! Generation adapter: an explicit engine/session state machine over an
//! [`LlmRuntime`].
//!
//! ```text
//!                initialize            create_session
//! Uninitialized ───────────▶ EngineLoaded ───────────▶ SessionActive
//!                                 ▲                        │
//!                                 └──── reset_session ─────┘
//!
//! close(): any state ──▶ Closed (terminal)
//! ```
//!
//! [`Generator::generate`] heals itself: called before initialization it
//! loads the engine and opens a session with the configured sampling
//! parameters first. The engine is one long-lived handle; the session is
//! exclusive, guarded by an async mutex.

mod ollama;

pub use ollama::OllamaRuntime;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use docqa_core::error::{RagError, Result};
use docqa_core::generation::{LlmRuntime, SamplingParams};

/// Lifecycle state of a [`Generator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Uninitialized,
    EngineLoaded,
    SessionActive,
    Closed,
}

/// Owns the engine and the active session of an [`LlmRuntime`].
pub struct Generator {
    runtime: Arc<dyn LlmRuntime>,
    model: String,
    max_tokens: usize,
    sampling: SamplingParams,
    state: Mutex<GeneratorState>,
}

fn closed() -> RagError {
    RagError::Generation("generator is closed".to_string())
}

impl Generator {
    /// `max_tokens` is the engine's total context allowance (prompt + output).
    pub fn new(
        runtime: Arc<dyn LlmRuntime>,
        model: impl Into<String>,
        max_tokens: usize,
        sampling: SamplingParams,
    ) -> Self {
        Self {
            runtime,
            model: model.into(),
            max_tokens,
            sampling,
            state: Mutex::new(GeneratorState::Uninitialized),
        }
    }

    pub async fn state(&self) -> GeneratorState {
        *self.state.lock().await
    }

    pub fn sampling(&self) -> SamplingParams {
        self.sampling
    }

    async fn load_engine(&self, state: &mut GeneratorState) -> Result<()> {
        info!(model = %self.model, max_tokens = self.max_tokens, "loading language model");
        self.runtime.load_engine(&self.model, self.max_tokens).await?;
        *state = GeneratorState::EngineLoaded;
        Ok(())
    }

    async fn open_session(&self, state: &mut GeneratorState, params: &SamplingParams) -> Result<()> {
        params.validate()?;
        self.runtime.create_session(params).await?;
        *state = GeneratorState::SessionActive;
        debug!(
            temperature = params.temperature,
            top_k = params.top_k,
            top_p = params.top_p,
            "opened generation session"
        );
        Ok(())
    }

    /// Load the engine once. On failure the state stays `Uninitialized`.
    pub async fn initialize(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            GeneratorState::Closed => Err(closed()),
            GeneratorState::Uninitialized => self.load_engine(&mut state).await,
            GeneratorState::EngineLoaded | GeneratorState::SessionActive => Ok(()),
        }
    }

    /// Open a session. Only valid once the engine is loaded and no session
    /// is active.
    pub async fn create_session(&self, params: SamplingParams) -> Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            GeneratorState::EngineLoaded => self.open_session(&mut state, &params).await,
            other => Err(RagError::Generation(format!(
                "cannot create a session in state {:?}",
                other
            ))),
        }
    }

    /// Feed `prompt` to the session and return the trimmed response.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        if *state == GeneratorState::Closed {
            return Err(closed());
        }
        if *state == GeneratorState::Uninitialized {
            self.load_engine(&mut state).await?;
        }
        if *state == GeneratorState::EngineLoaded {
            let params = self.sampling;
            self.open_session(&mut state, &params).await?;
        }

        self.runtime.add_input(prompt).await?;
        let output = self.runtime.generate().await?;
        let answer = output.trim();
        if answer.is_empty() {
            return Err(RagError::Generation(
                "model returned an empty response".to_string(),
            ));
        }
        debug!(chars = answer.chars().count(), "generated response");
        Ok(answer.to_string())
    }

    /// Close the active session, keeping the engine loaded.
    pub async fn reset_session(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            GeneratorState::Closed => Err(closed()),
            GeneratorState::SessionActive => {
                self.runtime.close_session().await?;
                *state = GeneratorState::EngineLoaded;
                debug!("generation session reset");
                Ok(())
            }
            GeneratorState::Uninitialized | GeneratorState::EngineLoaded => Ok(()),
        }
    }

    /// Release the session and the engine. Every later call fails.
    ///
    /// Release failures are logged; the generator ends `Closed` regardless.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if *state == GeneratorState::SessionActive {
            if let Err(e) = self.runtime.close_session().await {
                warn!(error = %e, "failed to close generation session");
            }
        }
        if matches!(
            *state,
            GeneratorState::SessionActive | GeneratorState::EngineLoaded
        ) {
            if let Err(e) = self.runtime.close_engine().await {
                warn!(error = %e, "failed to release language model");
            }
        }
        *state = GeneratorState::Closed;
    }
}
