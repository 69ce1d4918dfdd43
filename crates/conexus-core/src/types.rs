//! Core domain types shared across all conexus-core subsystems.
//!
//! These types form the API contract between modules. Changing them
//! requires updating all consumers, so they should be stable and minimal.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Detected language or document format of an indexed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python (.py)
    Python,
    /// TypeScript (.ts, .tsx)
    TypeScript,
    /// JavaScript (.js, .jsx)
    JavaScript,
    /// Rust (.rs)
    Rust,
    /// Go (.go)
    Go,
    /// C (.c, .h)
    C,
    /// C++ (.cpp, .cc, .cxx, .hpp, .hxx)
    Cpp,
    /// C# (.cs)
    CSharp,
    /// Markdown (.md, .mdx)
    Markdown,
    /// TOML configuration (.toml)
    Toml,
    /// YAML configuration (.yml, .yaml)
    Yaml,
    /// JSON data (.json, .jsonc)
    Json,
    /// Unknown / unsupported -- chunked with the fallback sliding window.
    Unknown,
}

impl Language {
    /// Detect language from a file extension (without the leading dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "py" => Self::Python,
            "ts" | "tsx" => Self::TypeScript,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "rs" => Self::Rust,
            "go" => Self::Go,
            "c" | "h" => Self::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Self::Cpp,
            "cs" => Self::CSharp,
            "md" | "mdx" => Self::Markdown,
            "toml" => Self::Toml,
            "yml" | "yaml" => Self::Yaml,
            "json" | "jsonc" => Self::Json,
            _ => Self::Unknown,
        }
    }

    /// Returns the language identifier string persisted in `Document::metadata`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Markdown => "markdown",
            Self::Toml => "toml",
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true for the "Code" language family: chunked via tree-sitter
    /// structural extraction on top-level declarations.
    pub fn is_code(&self) -> bool {
        matches!(
            self,
            Self::Python
                | Self::TypeScript
                | Self::JavaScript
                | Self::Rust
                | Self::Go
                | Self::C
                | Self::Cpp
                | Self::CSharp
        )
    }

    /// Returns true for the structured-data family: chunked by top-level key.
    pub fn is_structured_data(&self) -> bool {
        matches!(self, Self::Toml | Self::Yaml | Self::Json)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// The kind of retrievable unit a chunk represents, and the chunking rule
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// A top-level function or method definition (Code family).
    Function,
    /// A top-level type definition: struct, class, interface, type alias
    /// (Code family).
    Struct,
    /// A Markdown section split at a heading of depth ≤ 2.
    Section,
    /// A top-level key split out of a structured-data document (JSON/YAML/TOML).
    TopLevelValue,
    /// A window produced by the fallback fixed-size sliding-window splitter.
    GenericWindow,
}

impl ChunkKind {
    /// Convert to the string stored in `Document::metadata`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Struct => "struct",
            Self::Section => "section",
            Self::TopLevelValue => "top_level_value",
            Self::GenericWindow => "generic_window",
        }
    }

    /// Parse from the string stored in `Document::metadata`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "function" => Self::Function,
            "struct" => Self::Struct,
            "section" => Self::Section,
            "top_level_value" => Self::TopLevelValue,
            _ => Self::GenericWindow,
        }
    }
}

/// A semantically meaningful, atomic retrievable unit extracted from a file.
///
/// Chunks exist only in transit from the `chunker` to the `store`; once
/// persisted they become `Document` rows and the `Chunk` value is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic id: lowercase hex SHA-256 of
    /// `(canonical_file_path, start_line, end_line, content_hash)`.
    pub id: String,
    /// Path relative to the repository root, using `/` separators.
    pub file_path: String,
    /// Starting line number (1-indexed).
    pub line_start: u32,
    /// Ending line number (1-indexed, inclusive).
    pub line_end: u32,
    /// Starting byte offset into the file (0-indexed).
    pub byte_start: usize,
    /// Ending byte offset into the file (exclusive).
    pub byte_end: usize,
    /// What rule produced this chunk.
    pub kind: ChunkKind,
    /// The chunk's source text.
    pub content: String,
    /// Language tag of the owning file.
    pub language: Language,
    /// SHA-256 hex digest of `content`'s bytes.
    pub content_hash: String,
}

impl Chunk {
    /// Compute the deterministic chunk id from its identity tuple.
    pub fn compute_id(file_path: &str, line_start: u32, line_end: u32, content_hash: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(file_path.as_bytes());
        hasher.update(b"\0");
        hasher.update(line_start.to_le_bytes());
        hasher.update(line_end.to_le_bytes());
        hasher.update(b"\0");
        hasher.update(content_hash.as_bytes());
        hex::encode(hasher.finalize())
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// The persisted representation of a `Chunk` in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Same id as the source chunk.
    pub id: String,
    /// The chunk's source text (also indexed by FTS).
    pub content: String,
    /// Dense embedding vector, L2-normalized, fixed dimension `D`.
    pub vector: Vec<f32>,
    /// Free-form metadata: `file_path`, `language`, `kind`, `source_type`,
    /// and (when known) `commit_hash`.
    pub metadata: HashMap<String, Value>,
    /// Unix timestamp (seconds) of first insertion; preserved across updates.
    pub created_at: i64,
    /// Unix timestamp (seconds) of the most recent upsert.
    pub updated_at: i64,
}

impl Document {
    /// Build a `Document` from a `Chunk` and its embedding, stamping both
    /// timestamps to `now`. `created_at` is overwritten by the store on
    /// update to preserve the original insertion time.
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>, now: i64) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("file_path".to_string(), Value::String(chunk.file_path.clone()));
        metadata.insert("language".to_string(), Value::String(chunk.language.as_str().to_string()));
        metadata.insert("kind".to_string(), Value::String(chunk.kind.as_str().to_string()));
        metadata.insert("line_start".to_string(), Value::from(chunk.line_start));
        metadata.insert("line_end".to_string(), Value::from(chunk.line_end));
        metadata.insert("source_type".to_string(), Value::String("file".to_string()));

        Self {
            id: chunk.id.clone(),
            content: chunk.content.clone(),
            vector,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Convenience accessor for the `file_path` metadata field.
    pub fn file_path(&self) -> Option<&str> {
        self.metadata.get("file_path").and_then(Value::as_str)
    }

    /// Convenience accessor for the `language` metadata field.
    pub fn language(&self) -> Option<&str> {
        self.metadata.get("language").and_then(Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// Search types
// ---------------------------------------------------------------------------

/// A single ranked search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matched document.
    pub document: Document,
    /// Final fused (and possibly reranked) relevance score.
    pub score: f64,
    /// Retains the BM25 and vector component scores for observability.
    pub debug_scores: ScoreBreakdown,
}

/// Per-signal score breakdown retained for observability/debugging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// 1-based rank from BM25 full-text search (`None` if absent from that list).
    pub bm25_rank: Option<u32>,
    /// BM25 raw score, when available.
    pub bm25_score: Option<f64>,
    /// 1-based rank from vector search (`None` if absent from that list).
    pub vector_rank: Option<u32>,
    /// Cosine similarity score, when available.
    pub vector_score: Option<f64>,
    /// Reciprocal Rank Fusion score (pre-rerank).
    pub rrf_score: f64,
    /// Lexical reranker score, when reranking was applied.
    pub rerank_score: Option<f64>,
}

/// Options accepted by `search_bm25`/`search_vector`/`search_hybrid`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Maximum number of results to return. Default 20.
    pub limit: usize,
    /// Metadata equality/IN filters, applied before scoring.
    pub filters: HashMap<String, Value>,
    /// Optional post-fusion score cutoff.
    pub score_threshold: Option<f64>,
}

impl SearchOptions {
    /// Construct options with the given limit and no filters.
    pub fn with_limit(limit: usize) -> Self {
        Self { limit, ..Default::default() }
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Configuration for an external connector (e.g. a GitHub or Jira
/// integration) registered alongside the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Unique connector id.
    pub id: String,
    /// Connector kind, drawn from a known set (e.g. `"github"`, `"jira"`).
    pub kind: String,
    /// Human-readable display name.
    pub name: String,
    /// Opaque, kind-specific configuration blob.
    pub config: Value,
    /// Whether the connector is active.
    pub enabled: bool,
    /// Unix timestamp (seconds) of creation.
    pub created_at: i64,
    /// Unix timestamp (seconds) of the most recent update.
    pub updated_at: i64,
}

// ---------------------------------------------------------------------------
// Session (optional conversational state for tool responses)
// ---------------------------------------------------------------------------

/// Conversational state associated with a sequence of tool calls.
///
/// Created lazily on the first qualifying request; expired after an
/// inactivity threshold enforced by the caller (the MCP server does not
/// currently create these automatically -- the type exists so tool
/// handlers that need cross-call memory have somewhere to put it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session id.
    pub id: String,
    /// Ordered history of prior tool calls in this session.
    pub history: Vec<String>,
    /// Free-form scratch state.
    pub scratch_map: HashMap<String, Value>,
    /// Unix timestamp (seconds) of the last activity on this session.
    pub last_activity: i64,
}

// ---------------------------------------------------------------------------
// Merkle types
// ---------------------------------------------------------------------------

/// A single entry in the Merkle index: the content hash and last-seen
/// timestamp recorded for one file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleEntry {
    /// SHA-256 hex digest of the file's bytes at last observation.
    pub hash: String,
    /// ISO-8601 timestamp of last observation.
    pub last_seen: String,
}

// ---------------------------------------------------------------------------
// Pipeline events
// ---------------------------------------------------------------------------

/// Events flowing from the walker/watcher into the indexer.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A file was created or modified and needs (re-)indexing.
    FileChanged {
        /// Path relative to the repository root.
        path: PathBuf,
    },
    /// A file was deleted and should be removed from the index.
    FileDeleted {
        /// Path relative to the repository root.
        path: PathBuf,
    },
    /// A full repository scan is requested.
    FullScan,
    /// Shutdown the pipeline gracefully.
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_deterministic() {
        let a = Chunk::compute_id("src/lib.rs", 1, 10, "abc");
        let b = Chunk::compute_id("src/lib.rs", 1, 10, "abc");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn chunk_id_changes_with_content_hash() {
        let a = Chunk::compute_id("src/lib.rs", 1, 10, "abc");
        let b = Chunk::compute_id("src/lib.rs", 1, 10, "def");
        assert_ne!(a, b);
    }

    #[test]
    fn language_from_extension_covers_code_family() {
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("rs"), Language::Rust);
        assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
        assert_eq!(Language::from_extension("xyz"), Language::Unknown);
        assert!(Language::Rust.is_code());
        assert!(!Language::Json.is_code());
        assert!(Language::Json.is_structured_data());
    }

    #[test]
    fn chunk_kind_round_trips_through_string() {
        for kind in [
            ChunkKind::Function,
            ChunkKind::Struct,
            ChunkKind::Section,
            ChunkKind::TopLevelValue,
            ChunkKind::GenericWindow,
        ] {
            assert_eq!(ChunkKind::from_str_lossy(kind.as_str()), kind);
        }
    }
}
