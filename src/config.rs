//! TOML configuration.
//!
//! Loaded from `./config/docqa.toml` by default. Every section except `[db]`
//! has defaults, so the smallest valid file is:
//!
//! ```toml
//! [db]
//! path = "./data/docqa.sqlite"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use docqa_core::chunk::ChunkingParams;
use docqa_core::generation::SamplingParams;
use docqa_core::prompt::PromptBudget;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            min_chunk_size: default_min_chunk_size(),
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkingParams {
        ChunkingParams {
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            min_chunk_size: self.min_chunk_size,
        }
    }
}

fn default_chunk_size() -> usize {
    docqa_core::chunk::DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    docqa_core::chunk::DEFAULT_OVERLAP
}
fn default_min_chunk_size() -> usize {
    docqa_core::chunk::DEFAULT_MIN_CHUNK_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            url: default_ollama_url(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_dims() -> usize {
    768
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_max_total_tokens")]
    pub max_total_tokens: usize,
    #[serde(default = "default_reserved_output_tokens")]
    pub reserved_output_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_generation_model(),
            url: default_ollama_url(),
            max_total_tokens: default_max_total_tokens(),
            reserved_output_tokens: default_reserved_output_tokens(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
        }
    }

    pub fn budget(&self) -> PromptBudget {
        PromptBudget {
            max_total_tokens: self.max_total_tokens,
            reserved_output_tokens: self.reserved_output_tokens,
        }
    }
}

fn default_generation_model() -> String {
    "gemma2:2b".to_string()
}
fn default_max_total_tokens() -> usize {
    2048
}
fn default_reserved_output_tokens() -> usize {
    512
}
fn default_temperature() -> f32 {
    0.4
}
fn default_top_k() -> u32 {
    40
}
fn default_top_p() -> f32 {
    0.9
}
fn default_generation_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_retrieval_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_retrieval_top_k(),
        }
    }
}

fn default_retrieval_top_k() -> usize {
    5
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    let chunking = &config.chunking;
    if chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if chunking.overlap >= chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be < chunking.chunk_size");
    }
    if chunking.min_chunk_size > chunking.chunk_size {
        anyhow::bail!("chunking.min_chunk_size must be <= chunking.chunk_size");
    }

    // Validate embedding
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.model.trim().is_empty() {
        anyhow::bail!("embedding.model must not be empty");
    }
    match config.embedding.provider.as_str() {
        "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be ollama or local.",
            other
        ),
    }

    // Validate generation
    let generation = &config.generation;
    if generation.reserved_output_tokens >= generation.max_total_tokens {
        anyhow::bail!("generation.reserved_output_tokens must be < generation.max_total_tokens");
    }
    generation
        .sampling()
        .validate()
        .with_context(|| "Invalid generation sampling parameters")?;
    match generation.provider.as_str() {
        "ollama" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be ollama.",
            other
        ),
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    Ok(config)
}
