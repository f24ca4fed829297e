//! # docqa core
//!
//! Runtime-agnostic logic for docqa: data models, the sentence-aware
//! chunker, vector math, the HNSW approximate nearest-neighbour graph,
//! the store abstraction and its vector index adapter, prompt assembly,
//! and the traits for every external collaborator (text extraction, OCR,
//! embedding model, language model runtime).
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. The `docqa`
//! app crate supplies concrete collaborators and the orchestration layer.

pub mod ann;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod index;
pub mod models;
pub mod prompt;
pub mod store;

pub use error::{RagError, Result, Stage};
