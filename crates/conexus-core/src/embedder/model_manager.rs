//! Automatic embedding model management for the `local` provider.
//!
//! Downloads and caches the ONNX embedding model and tokenizer on first
//! use. Models are stored in `~/.local/share/conexus/models/<model-name>/`
//! (platform-appropriate via `dirs::data_local_dir`).
//!
//! ## Model Selection
//!
//! Default model: `jinaai/jina-embeddings-v2-base-code`
//! - Trained on code-to-text and code-to-code retrieval
//! - 768 dimensions, 8192 max sequence length
//! - ONNX-compatible, ~550MB download
//!
//! The model auto-downloads on first use so operators never manually
//! fetch it; after download the path is stable and cached for future runs.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{ConexusError, ConexusResult};

/// Metadata for a supported embedding model.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    /// Human-readable model name.
    pub name: &'static str,
    /// HuggingFace model ID (e.g., "jinaai/jina-embeddings-v2-base-code").
    pub hf_repo: &'static str,
    /// URL to the ONNX model file.
    pub model_url: &'static str,
    /// URL to the tokenizer.json file.
    pub tokenizer_url: &'static str,
    /// Output embedding dimensions.
    pub dimensions: usize,
    /// Maximum sequence length the model supports.
    pub max_seq_length: usize,
    /// Approximate download size in bytes (for progress display).
    pub approx_size_bytes: u64,
}

/// Default model: Jina Code v2, trained for code retrieval.
pub const DEFAULT_MODEL: ModelSpec = ModelSpec {
    name: "jina-embeddings-v2-base-code",
    hf_repo: "jinaai/jina-embeddings-v2-base-code",
    model_url: "https://huggingface.co/jinaai/jina-embeddings-v2-base-code/resolve/main/onnx/model.onnx",
    tokenizer_url: "https://huggingface.co/jinaai/jina-embeddings-v2-base-code/resolve/main/tokenizer.json",
    dimensions: 768,
    max_seq_length: 8192,
    approx_size_bytes: 550_000_000,
};

/// Fallback model: BGE Small, for constrained environments or fast indexing.
pub const FALLBACK_MODEL: ModelSpec = ModelSpec {
    name: "bge-small-en-v1.5",
    hf_repo: "BAAI/bge-small-en-v1.5",
    model_url: "https://huggingface.co/BAAI/bge-small-en-v1.5/resolve/main/onnx/model.onnx",
    tokenizer_url: "https://huggingface.co/BAAI/bge-small-en-v1.5/resolve/main/tokenizer.json",
    dimensions: 384,
    max_seq_length: 512,
    approx_size_bytes: 130_000_000,
};

fn models_base_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("conexus").join("models")
}

/// Directory for a specific model's cached files.
pub fn model_dir(spec: &ModelSpec) -> PathBuf {
    models_base_dir().join(spec.name)
}

/// Path to the cached ONNX model file for `spec`.
pub fn model_path(spec: &ModelSpec) -> PathBuf {
    model_dir(spec).join("model.onnx")
}

/// Path to the cached tokenizer file for `spec`.
pub fn tokenizer_path(spec: &ModelSpec) -> PathBuf {
    model_dir(spec).join("tokenizer.json")
}

/// Whether the model and tokenizer are already cached and look intact.
pub fn is_model_ready(spec: &ModelSpec) -> bool {
    let model = model_path(spec);
    let tokenizer = tokenizer_path(spec);

    if !model.exists() || !tokenizer.exists() {
        return false;
    }

    if let Ok(meta) = std::fs::metadata(&model) {
        if meta.len() < 1_000_000 {
            return false;
        }
    }

    true
}

/// Ensure the model is available locally, downloading it if necessary.
/// Returns the paths to `(model.onnx, tokenizer.json)`.
pub fn ensure_model(spec: &ModelSpec) -> ConexusResult<(PathBuf, PathBuf)> {
    let model = model_path(spec);
    let tokenizer = tokenizer_path(spec);

    if is_model_ready(spec) {
        tracing::debug!(model = spec.name, path = %model.display(), "embedding model already cached");
        return Ok((model, tokenizer));
    }

    let dir = model_dir(spec);
    std::fs::create_dir_all(&dir)?;

    tracing::info!(model = spec.name, repo = spec.hf_repo, "downloading embedding model (first-time setup)");

    if !model.exists() || std::fs::metadata(&model).map(|m| m.len() < 1_000_000).unwrap_or(true) {
        download_file(spec.model_url, &model, &format!("Downloading {} model", spec.name), Some(spec.approx_size_bytes))?;
    }

    if !tokenizer.exists() {
        download_file(spec.tokenizer_url, &tokenizer, &format!("Downloading {} tokenizer", spec.name), None)?;
    }

    let meta_path = dir.join("meta.json");
    let meta = serde_json::json!({
        "model": spec.name,
        "hf_repo": spec.hf_repo,
        "dimensions": spec.dimensions,
        "max_seq_length": spec.max_seq_length,
    });
    if let Ok(content) = serde_json::to_string_pretty(&meta) {
        let _ = std::fs::write(&meta_path, content);
    }

    tracing::info!(model = spec.name, path = %model.display(), "embedding model ready");
    Ok((model, tokenizer))
}

fn download_file(url: &str, dest: &Path, message: &str, expected_size: Option<u64>) -> ConexusResult<()> {
    let temp_path = dest.with_extension("downloading");

    let response = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(600))
        .build()
        .map_err(|e| ConexusError::internal(format!("HTTP client error: {e}")))?
        .get(url)
        .send()
        .map_err(|e| {
            ConexusError::ProviderUnavailable {
                provider: "local".into(),
                message: format!(
                    "failed to download model from {url}: {e}. Check your internet connection, \
                     or set options.model_path to a pre-downloaded model."
                ),
            }
        })?;

    if !response.status().is_success() {
        return Err(ConexusError::ProviderUnavailable {
            provider: "local".into(),
            message: format!("model download failed: HTTP {} from {url}", response.status()),
        });
    }

    let total_size = response.content_length().or(expected_size).unwrap_or(0);

    let pb = if total_size > 0 {
        let pb = indicatif::ProgressBar::new(total_size);
        pb.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("{msg}\n  [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message(message.to_string());
        pb
    } else {
        let pb = indicatif::ProgressBar::new_spinner();
        pb.set_message(message.to_string());
        pb
    };

    let mut file = std::fs::File::create(&temp_path)?;
    let mut downloaded: u64 = 0;

    let bytes = response.bytes().map_err(|e| ConexusError::internal(format!("download stream error: {e}")))?;

    for chunk in bytes.chunks(8192) {
        file.write_all(chunk)?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }

    file.flush()?;
    drop(file);

    pb.finish_with_message(format!("{message} -- done"));

    std::fs::rename(&temp_path, dest)?;
    Ok(())
}

/// Resolve the model spec to use, honoring `CONEXUS_EMBEDDING_MODEL`:
/// `"small"`/`"bge-small"`/`"lite"` select the fallback model; anything
/// else (including unset) selects the default.
pub fn resolve_model_spec() -> &'static ModelSpec {
    if let Ok(model_name) = std::env::var("CONEXUS_EMBEDDING_MODEL") {
        match model_name.to_lowercase().as_str() {
            "small" | "bge-small" | "bge-small-en" | "lite" => {
                tracing::info!("using lightweight embedding model (bge-small-en-v1.5)");
                return &FALLBACK_MODEL;
            }
            _ => {}
        }
    }
    &DEFAULT_MODEL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_dir_structure() {
        let dir = model_dir(&DEFAULT_MODEL);
        assert!(dir.ends_with("jina-embeddings-v2-base-code"));
        assert!(model_path(&DEFAULT_MODEL).ends_with("model.onnx"));
        assert!(tokenizer_path(&DEFAULT_MODEL).ends_with("tokenizer.json"));
    }

    #[test]
    fn fallback_model_has_distinct_path() {
        assert_ne!(model_dir(&DEFAULT_MODEL), model_dir(&FALLBACK_MODEL));
    }

    #[test]
    fn model_not_ready_when_missing() {
        let dummy = ModelSpec {
            name: "non-existent-model-xyz-123",
            hf_repo: "fake/repo",
            model_url: "http://fake.invalid",
            tokenizer_url: "http://fake.invalid",
            dimensions: 10,
            max_seq_length: 10,
            approx_size_bytes: 10,
        };
        assert!(!is_model_ready(&dummy));
    }

    #[test]
    fn default_model_constants() {
        assert_eq!(DEFAULT_MODEL.dimensions, 768);
        assert_eq!(DEFAULT_MODEL.max_seq_length, 8192);
        assert!(DEFAULT_MODEL.model_url.starts_with("https://"));
    }

    #[test]
    fn fallback_model_constants() {
        assert_eq!(FALLBACK_MODEL.dimensions, 384);
        assert_eq!(FALLBACK_MODEL.max_seq_length, 512);
    }
}
