//! # docqa
//!
//! On-device retrieval-augmented generation over your own documents.
//!
//! Documents (PDF or plain text) are extracted, split into overlapping
//! sentence-aware chunks, embedded, and stored in SQLite alongside an
//! in-memory HNSW graph. Questions are embedded the same way, the nearest
//! chunks are packed into a token-budgeted prompt, and a local language
//! model answers with citations back to the source pages.
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────────┐
//! │ Extract  │──▶│  Chunk   │──▶│  Embed   │──▶│ SQLite+HNSW  │
//! │ PDF/text │   │          │   │          │   │ VectorIndex  │
//! └──────────┘   └──────────┘   └──────────┘   └──────┬───────┘
//!                                                     │ top-k
//!                 ┌──────────┐   ┌──────────┐         │
//!    answer ◀─────│Generator │◀──│  Prompt  │◀────────┘
//!   + sources     │          │   │ Builder  │
//!                 └──────────┘   └──────────┘
//! ```
//!
//! Runtime-agnostic pieces (models, chunker, HNSW, prompt assembly, and the
//! collaborator traits) live in [`docqa_core`]; this crate supplies SQLite
//! storage, HTTP model backends, text extraction, and the [`pipeline`]
//! orchestrator.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite-backed [`Store`](docqa_core::store::Store) |
//! | [`extract`] | PDF and plain-text extraction |
//! | [`embedding`] | Embedding backends and the [`Embedder`](embedding::Embedder) adapter |
//! | [`generation`] | LLM runtimes and the [`Generator`](generation::Generator) state machine |
//! | [`pipeline`] | Ingestion and question answering orchestration |
//! | [`progress`] | Ingestion progress reporting |
//! | [`ingest`], [`ask`], [`documents`], [`stats`] | CLI commands |

pub mod ask;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod migrate;
pub mod pipeline;
pub mod progress;
pub mod sqlite_store;
pub mod stats;

pub use docqa_core;
