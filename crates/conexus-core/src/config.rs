//! Configuration loading and validation.
//!
//! Configuration is resolved with the following precedence (highest wins):
//!
//! 1. Environment variables (`CONEXUS_*`)
//! 2. Project config (`<repo>/.conexus/config.toml`)
//! 3. User config (`dirs::config_dir()/conexus/config.toml`)
//! 4. Compiled-in defaults
//!
//! This module only loads and validates configuration; it never installs
//! process-wide state (e.g. initializing `tracing`) -- that is the
//! responsibility of the binary entry point that constructs a `Config`
//! and passes it down.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConexusError, ConexusResult};

/// Top-level configuration for Conexus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Repository root path to index.
    pub repo_path: PathBuf,

    /// Override for the database file path. When set, `data_dir()` uses
    /// its parent directory instead of the default derived location.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Indexing configuration.
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Search configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Watcher configuration.
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Indexing-specific settings, doubling as the Walker's recognized option set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Glob patterns; any match excludes the path.
    #[serde(default = "IndexingConfig::default_excludes")]
    pub ignore_patterns: Vec<String>,

    /// Files exceeding this are skipped (not errored).
    #[serde(default = "IndexingConfig::default_max_file_size")]
    pub max_file_size: u64,

    /// When false (default), symlinks are skipped entirely.
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Optional allowlist of extensions (without the leading dot). Empty
    /// means accept all text-like extensions.
    #[serde(default)]
    pub allowed_extensions: Vec<String>,

    /// Maximum number of concurrent parse tasks during a full index run.
    #[serde(default = "IndexingConfig::default_parse_concurrency")]
    pub parse_concurrency: usize,

    /// Maximum chunk size in tokens before a Code-family element is
    /// considered oversized and routed to the fallback sliding window.
    #[serde(default = "IndexingConfig::default_max_chunk_tokens")]
    pub max_chunk_tokens: u32,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: Self::default_excludes(),
            max_file_size: Self::default_max_file_size(),
            follow_symlinks: false,
            allowed_extensions: Vec::new(),
            parse_concurrency: Self::default_parse_concurrency(),
            max_chunk_tokens: Self::default_max_chunk_tokens(),
        }
    }
}

impl IndexingConfig {
    fn default_excludes() -> Vec<String> {
        vec![
            ".git".into(),
            ".conexus".into(),
            "node_modules".into(),
            "target".into(),
            "__pycache__".into(),
            ".venv".into(),
            "venv".into(),
            "dist".into(),
            "build".into(),
            ".next".into(),
            "*.lock".into(),
            "*.min.js".into(),
            "*.min.css".into(),
            "*.map".into(),
        ]
    }

    fn default_max_file_size() -> u64 {
        5 * 1024 * 1024 // 5MB
    }

    fn default_parse_concurrency() -> usize {
        4
    }

    fn default_max_chunk_tokens() -> u32 {
        512
    }
}

/// Search-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of results to return.
    #[serde(default = "SearchConfig::default_limit")]
    pub default_limit: usize,

    /// Maximum number of results a caller may request.
    #[serde(default = "SearchConfig::default_max_limit")]
    pub max_limit: usize,

    /// RRF constant (k parameter).
    #[serde(default = "SearchConfig::default_rrf_k")]
    pub rrf_k: u32,

    /// Candidate over-fetch factor: BM25 and vector search each return up
    /// to `limit * k_over` candidates before fusion.
    #[serde(default = "SearchConfig::default_k_over")]
    pub k_over: usize,

    /// Whether `search_hybrid` applies the lexical reranker after fusion.
    #[serde(default = "SearchConfig::default_enable_rerank")]
    pub enable_rerank: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: Self::default_limit(),
            max_limit: Self::default_max_limit(),
            rrf_k: Self::default_rrf_k(),
            k_over: Self::default_k_over(),
            enable_rerank: Self::default_enable_rerank(),
        }
    }
}

impl SearchConfig {
    fn default_limit() -> usize {
        20
    }
    fn default_max_limit() -> usize {
        200
    }
    fn default_rrf_k() -> u32 {
        60
    }
    fn default_k_over() -> usize {
        3
    }
    fn default_enable_rerank() -> bool {
        true
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Registry key of the provider to use: `mock`, `local`, `openai`,
    /// `voyage`, or `cohere`.
    #[serde(default = "EmbeddingConfig::default_provider")]
    pub provider: String,

    /// Output embedding dimension `D`.
    #[serde(default = "EmbeddingConfig::default_dimensions")]
    pub dimensions: usize,

    /// Batch size for embedding inference/requests.
    #[serde(default = "EmbeddingConfig::default_batch_size")]
    pub batch_size: usize,

    /// Provider-specific options (model name, API base URL, local model
    /// path, etc). Credentials are read from `CONEXUS_EMBEDDING_API_KEY`
    /// rather than stored here.
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: Self::default_provider(),
            dimensions: Self::default_dimensions(),
            batch_size: Self::default_batch_size(),
            options: HashMap::new(),
        }
    }
}

impl EmbeddingConfig {
    fn default_provider() -> String {
        // The mock provider is deterministic and network-free; it is what
        // the core runs against until a real provider is configured.
        "mock".into()
    }
    fn default_dimensions() -> usize {
        384
    }
    fn default_batch_size() -> usize {
        32
    }
}

/// File watcher configuration (ambient live-reindex feature).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Debounce interval in milliseconds.
    #[serde(default = "WatcherConfig::default_debounce_ms")]
    pub debounce_ms: u64,

    /// Interval between full scans (in seconds) for catching missed events.
    #[serde(default = "WatcherConfig::default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: Self::default_debounce_ms(),
            poll_interval_secs: Self::default_poll_interval_secs(),
        }
    }
}

impl WatcherConfig {
    fn default_debounce_ms() -> u64 {
        100
    }
    fn default_poll_interval_secs() -> u64 {
        300
    }
}

/// Logging configuration. This is ambient, not read by conexus-core itself
/// -- it lives here only so `conexus-cli` has one place to load it from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// `"text"` (default, human-readable) or `"json"`.
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: Self::default_format(),
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".into()
    }
    fn default_format() -> String {
        "text".into()
    }
}

impl Config {
    /// Load configuration from defaults, then overlay user config, then
    /// project config, then environment variables.
    pub fn load(repo_path: &Path) -> ConexusResult<Self> {
        let mut config = Self::defaults(repo_path);

        if let Some(user_config_dir) = dirs::config_dir() {
            let user_config_path = user_config_dir.join("conexus").join("config.toml");
            if user_config_path.exists() {
                config.merge_from_file(&user_config_path)?;
            }
        }

        let project_config_path = repo_path.join(".conexus").join("config.toml");
        if project_config_path.exists() {
            config.merge_from_file(&project_config_path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Create a default configuration for the given repo path.
    pub fn defaults(repo_path: &Path) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            db_path: None,
            indexing: IndexingConfig::default(),
            search: SearchConfig::default(),
            embedding: EmbeddingConfig::default(),
            watcher: WatcherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Returns the data directory for this repo's index files.
    pub fn data_dir(&self) -> PathBuf {
        if let Some(db_path) = &self.db_path {
            if let Some(parent) = db_path.parent() {
                return parent.to_path_buf();
            }
        }
        let hash = self.repo_hash();
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("conexus")
            .join("repos")
            .join(&hash)
    }

    /// Path to the embedded SQL database file.
    pub fn db_file(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| self.data_dir().join("conexus.db"))
    }

    /// Path to the serialized Merkle state file.
    pub fn merkle_state_file(&self) -> PathBuf {
        self.data_dir().join("merkle_state.json")
    }

    /// Ensure the data directory exists, applying `0700` permissions (a
    /// no-op on non-Unix targets).
    pub fn ensure_data_dir(&self) -> ConexusResult<PathBuf> {
        let dir = self.data_dir();
        std::fs::create_dir_all(&dir)?;
        set_restrictive_dir_permissions(&dir)?;
        Ok(dir)
    }

    /// Merge values from a TOML config file (non-destructive overlay).
    fn merge_from_file(&mut self, path: &Path) -> ConexusResult<()> {
        let content = std::fs::read_to_string(path)?;
        let overlay: toml::Value = toml::from_str(&content).map_err(|e| {
            ConexusError::InvalidParams {
                message: format!("invalid TOML in {}: {e}", path.display()),
            }
        })?;

        if let Some(indexing) = overlay.get("indexing") {
            if let Ok(parsed) = indexing.clone().try_into::<IndexingConfig>() {
                self.indexing = parsed;
            }
        }
        if let Some(search) = overlay.get("search") {
            if let Ok(parsed) = search.clone().try_into::<SearchConfig>() {
                self.search = parsed;
            }
        }
        if let Some(embedding) = overlay.get("embedding") {
            if let Ok(parsed) = embedding.clone().try_into::<EmbeddingConfig>() {
                self.embedding = parsed;
            }
        }
        if let Some(watcher) = overlay.get("watcher") {
            if let Ok(parsed) = watcher.clone().try_into::<WatcherConfig>() {
                self.watcher = parsed;
            }
        }
        if let Some(logging) = overlay.get("logging") {
            if let Ok(parsed) = logging.clone().try_into::<LoggingConfig>() {
                self.logging = parsed;
            }
        }

        Ok(())
    }

    /// Apply `CONEXUS_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("CONEXUS_DB_PATH") {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Ok(root) = std::env::var("CONEXUS_ROOT_PATH") {
            self.repo_path = PathBuf::from(root);
        }
        if let Ok(level) = std::env::var("CONEXUS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("CONEXUS_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(provider) = std::env::var("CONEXUS_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }
        if let Ok(model) = std::env::var("CONEXUS_EMBEDDING_MODEL") {
            self.embedding.options.insert("model".to_string(), model);
        }
    }

    /// Compute a short hash of the repo path for the data directory name.
    ///
    /// Normalizes the path to avoid Windows `\\?\` extended path prefix
    /// causing different hashes for the same physical directory.
    fn repo_hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let path_str = self.repo_path.to_string_lossy();
        let normalized = path_str.strip_prefix(r"\\?\").unwrap_or(&path_str);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..4])
    }
}

/// Apply `0700` permissions to a directory. No-op on non-Unix targets.
#[cfg(unix)]
pub fn set_restrictive_dir_permissions(path: &Path) -> ConexusResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o700);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

/// Apply `0700` permissions to a directory. No-op on non-Unix targets.
#[cfg(not(unix))]
pub fn set_restrictive_dir_permissions(_path: &Path) -> ConexusResult<()> {
    Ok(())
}

/// Apply `0600` permissions to a file. No-op on non-Unix targets.
#[cfg(unix)]
pub fn set_restrictive_file_permissions(path: &Path) -> ConexusResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

/// Apply `0600` permissions to a file. No-op on non-Unix targets.
#[cfg(not(unix))]
pub fn set_restrictive_file_permissions(_path: &Path) -> ConexusResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::defaults(Path::new("/tmp/test-repo"));
        assert_eq!(config.indexing.max_file_size, 5 * 1024 * 1024);
        assert_eq!(config.search.default_limit, 20);
        assert_eq!(config.embedding.dimensions, 384);
        assert_eq!(config.embedding.provider, "mock");
        assert_eq!(config.watcher.debounce_ms, 100);
    }

    #[test]
    fn test_language_from_extension() {
        use crate::types::Language;
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("rs"), Language::Rust);
        assert_eq!(Language::from_extension("ts"), Language::TypeScript);
        assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
        assert_eq!(Language::from_extension("go"), Language::Go);
        assert_eq!(Language::from_extension("xyz"), Language::Unknown);
    }

    #[test]
    fn test_db_path_override_changes_data_dir() {
        let mut config = Config::defaults(Path::new("/tmp/test-repo"));
        config.db_path = Some(PathBuf::from("/tmp/custom/conexus.db"));
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/custom"));
    }

    #[test]
    fn test_env_overrides_apply_conexus_prefix() {
        std::env::set_var("CONEXUS_LOG_LEVEL", "debug");
        let mut config = Config::defaults(Path::new("/tmp/test-repo"));
        config.apply_env_overrides();
        assert_eq!(config.logging.level, "debug");
        std::env::remove_var("CONEXUS_LOG_LEVEL");
    }
}
