//! # conexus-core
//!
//! Indexing and hybrid-retrieval engine for Conexus: a project-local
//! retrieval service that indexes a source repository into a combined
//! lexical (BM25) and dense (vector) store.
//!
//! ## Architecture
//!
//! The engine is split into decoupled subsystems, composed leaves-first:
//!
//! - **`config`** -- layered configuration loading and validation
//! - **`walker`** -- deterministic directory traversal with ignore rules
//! - **`merkle`** -- content-hash change detection between index runs
//! - **`parser`** -- tree-sitter AST parsing with per-language analyzers
//! - **`chunker`** -- language-family-aware chunking into retrievable units
//! - **`embedder`** -- pluggable text-to-vector provider registry
//! - **`store`** -- the document/vector/FTS/connector persistence layer
//! - **`fusion`** -- Reciprocal Rank Fusion and lexical reranking
//! - **`indexer`** -- orchestrates walker → merkle → chunker → embedder → store
//! - **`watcher`** -- ambient live filesystem watch feeding incremental reindex
//!
//! Each module exposes a public trait or struct that `indexer` wires
//! together. Modules communicate via the shared types in `types`.
//!
//! This crate has no CLI or wire-protocol concerns; it is injected with its
//! capabilities (config, embedding provider) by its callers rather than
//! reading process-wide state itself.

// Workspace lints are inherited from Cargo.toml

pub mod config;
pub mod error;
pub mod types;

pub mod walker;
pub mod merkle;
pub mod parser;
pub mod chunker;
pub mod embedder;
pub mod store;
pub mod fusion;
pub mod indexer;
pub mod watcher;

/// Re-export the primary engine interface.
pub use indexer::Indexer;
pub use config::Config;
pub use error::{ConexusError, ConexusResult};
