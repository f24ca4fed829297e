//! [`LlmRuntime`] backed by a local Ollama instance.
//!
//! The engine maps to a model kept resident with `keep_alive`
//! (`POST /api/generate` with no prompt loads it; `keep_alive: 0` unloads
//! it). A session is an in-memory chat history replayed to `POST /api/chat`
//! on every turn with the session's sampling options. The oldest turns are
//! dropped from each request so history plus the new prompt stays within
//! the input allowance (`max_total_tokens - reserved_output_tokens`).

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use docqa_core::error::{RagError, Result};
use docqa_core::generation::{LlmRuntime, SamplingParams};
use docqa_core::prompt::estimate_tokens;

use crate::config::GenerationConfig;

/// How long Ollama keeps the model resident between requests.
const KEEP_ALIVE: &str = "30m";

#[derive(Debug, Clone, Serialize)]
struct ChatTurn {
    role: &'static str,
    content: String,
}

#[derive(Debug)]
struct Session {
    params: SamplingParams,
    history: Vec<ChatTurn>,
    pending: String,
}

#[derive(Debug, Default)]
struct RuntimeState {
    model: Option<String>,
    num_ctx: usize,
    session: Option<Session>,
}

pub struct OllamaRuntime {
    url: String,
    client: reqwest::Client,
    reserved_output: usize,
    state: Mutex<RuntimeState>,
}

impl OllamaRuntime {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            url: config.url.trim_end_matches('/').to_string(),
            client,
            reserved_output: config.reserved_output_tokens,
            state: Mutex::new(RuntimeState::default()),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, RuntimeState>> {
        self.state
            .lock()
            .map_err(|_| RagError::Generation("runtime state lock poisoned".to_string()))
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(format!("{}{}", self.url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                RagError::Generation(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "Ollama API error {}: {}",
                status, body_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RagError::Generation(format!("Invalid Ollama response: {}", e)))
    }
}

/// Build the `/api/chat` request body.
fn chat_request(
    model: &str,
    num_ctx: usize,
    params: &SamplingParams,
    messages: &[ChatTurn],
) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": messages,
        "stream": false,
        "keep_alive": KEEP_ALIVE,
        "options": {
            "temperature": params.temperature,
            "top_k": params.top_k,
            "top_p": params.top_p,
            "num_ctx": num_ctx,
        },
    })
}

/// The most recent history turns that fit `allowance` estimated tokens
/// together with `prompt`. Turns are dropped oldest first, one user and
/// assistant pair at a time.
fn fit_history(history: &[ChatTurn], prompt: &ChatTurn, allowance: usize) -> Vec<ChatTurn> {
    let mut used = estimate_tokens(&prompt.content);
    let mut keep = 0;
    for pair in history.rchunks(2) {
        let cost: usize = pair.iter().map(|t| estimate_tokens(&t.content)).sum();
        if used + cost > allowance {
            break;
        }
        used += cost;
        keep += pair.len();
    }
    history[history.len() - keep..].to_vec()
}

/// Commit a finished turn. Empty responses leave the session untouched.
fn record_turn(session: &mut Session, kept: Vec<ChatTurn>, user: ChatTurn, content: &str) {
    if content.trim().is_empty() {
        return;
    }
    session.history = kept;
    session.history.push(user);
    session.history.push(ChatTurn {
        role: "assistant",
        content: content.to_string(),
    });
}

/// Extract `message.content` from a non-streaming `/api/chat` response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            RagError::Generation("Invalid Ollama response: missing message content".to_string())
        })
}

#[async_trait]
impl LlmRuntime for OllamaRuntime {
    async fn load_engine(&self, model: &str, max_tokens: usize) -> Result<()> {
        let body = serde_json::json!({
            "model": model,
            "keep_alive": KEEP_ALIVE,
        });
        self.post("/api/generate", &body).await?;

        let mut state = self.lock()?;
        state.model = Some(model.to_string());
        state.num_ctx = max_tokens;
        debug!(model, "ollama model loaded");
        Ok(())
    }

    async fn create_session(&self, params: &SamplingParams) -> Result<()> {
        let mut state = self.lock()?;
        if state.model.is_none() {
            return Err(RagError::Generation("no model loaded".to_string()));
        }
        state.session = Some(Session {
            params: *params,
            history: Vec::new(),
            pending: String::new(),
        });
        Ok(())
    }

    async fn add_input(&self, text: &str) -> Result<()> {
        let mut state = self.lock()?;
        let session = state
            .session
            .as_mut()
            .ok_or_else(|| RagError::Generation("no active session".to_string()))?;
        session.pending.push_str(text);
        Ok(())
    }

    async fn generate(&self) -> Result<String> {
        let (body, kept, user_turn) = {
            let mut guard = self.lock()?;
            let state = &mut *guard;
            let model = state
                .model
                .as_deref()
                .ok_or_else(|| RagError::Generation("no model loaded".to_string()))?;
            let session = state
                .session
                .as_mut()
                .ok_or_else(|| RagError::Generation("no active session".to_string()))?;

            // Input is consumed whether or not the request succeeds.
            let user_turn = ChatTurn {
                role: "user",
                content: std::mem::take(&mut session.pending),
            };
            let allowance = state.num_ctx.saturating_sub(self.reserved_output);
            let kept = fit_history(&session.history, &user_turn, allowance);
            if kept.len() < session.history.len() {
                debug!(
                    dropped = session.history.len() - kept.len(),
                    "trimmed chat history to fit the context window"
                );
            }
            let mut messages = kept.clone();
            messages.push(user_turn.clone());
            (
                chat_request(model, state.num_ctx, &session.params, &messages),
                kept,
                user_turn,
            )
        };

        let json = self.post("/api/chat", &body).await?;
        let content = parse_chat_response(&json)?;

        if let Some(session) = self.lock()?.session.as_mut() {
            record_turn(session, kept, user_turn, &content);
        }
        Ok(content)
    }

    async fn close_session(&self) -> Result<()> {
        self.lock()?.session = None;
        Ok(())
    }

    async fn close_engine(&self) -> Result<()> {
        let model = {
            let mut state = self.lock()?;
            state.session = None;
            state.model.take()
        };
        if let Some(model) = model {
            let body = serde_json::json!({ "model": model, "keep_alive": 0 });
            self.post("/api/generate", &body).await?;
            debug!(model = %model, "ollama model unloaded");
        }
        Ok(())
    }
}
