//! ONNX-based local embedding provider with automatic model management.
//!
//! Runs embedding inference locally using ONNX Runtime. No network calls
//! during inference, no API key. The model file is downloaded on first
//! use (unless already cached) and cached permanently under
//! `dirs::data_local_dir()/conexus/models/<model-name>/`.
//!
//! ## First-Run Behavior
//!
//! On the first invocation, the provider will:
//! 1. Detect that the model is not cached
//! 2. Download `model.onnx` and `tokenizer.json` from HuggingFace
//! 3. Cache them locally
//! 4. Proceed with indexing
//!
//! If the model or tokenizer fails to load, construction fails with
//! `ProviderUnavailable` -- callers (the indexer) choose whether to fall
//! back to the `mock` provider or surface the failure.

use ort::session::Session;

use crate::config::EmbeddingConfig;
use crate::embedder::{l2_normalize, model_manager, EmbeddingProvider};
use crate::error::{ConexusError, ConexusResult};

/// Embedding provider that runs ONNX Runtime inference locally.
pub struct LocalProvider {
    dimensions: usize,
    batch_size: usize,
    max_seq_length: usize,
    /// `Session::run` requires `&mut self`, so the session is behind a mutex.
    session: std::sync::Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
}

impl LocalProvider {
    /// Load (auto-downloading if needed) and construct the local provider.
    pub fn new(config: &EmbeddingConfig) -> ConexusResult<Self> {
        let (model_path, tokenizer_path, spec_dims, spec_max_len) = Self::resolve_model_files(config)?;

        let session = Session::builder()
            .map_err(|e| ConexusError::ProviderUnavailable { provider: "local".into(), message: format!("ONNX session builder error: {e}") })?
            .commit_from_file(&model_path)
            .map_err(|e| ConexusError::ProviderUnavailable {
                provider: "local".into(),
                message: format!("failed to load model at {}: {e}", model_path.display()),
            })?;

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path).map_err(|e| ConexusError::ProviderUnavailable {
            provider: "local".into(),
            message: format!("failed to load tokenizer at {}: {e}", tokenizer_path.display()),
        })?;

        let dimensions = if config.dimensions > 0 { config.dimensions } else { spec_dims };
        let max_seq_length = config
            .options
            .get("max_seq_length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(spec_max_len);

        Ok(Self { dimensions, batch_size: config.batch_size.max(1), max_seq_length, session: std::sync::Mutex::new(session), tokenizer })
    }

    /// Resolve model and tokenizer file paths, auto-downloading if needed.
    ///
    /// 1. `options.model_path` pointing at an existing file wins (manual override).
    /// 2. Otherwise resolve the registry `ModelSpec` (honors `CONEXUS_EMBEDDING_MODEL`)
    ///    and auto-download it if not already cached.
    fn resolve_model_files(config: &EmbeddingConfig) -> ConexusResult<(std::path::PathBuf, std::path::PathBuf, usize, usize)> {
        if let Some(path) = config.options.get("model_path") {
            let model_path = std::path::PathBuf::from(path);
            if model_path.exists() {
                let tokenizer_path = model_path.with_file_name("tokenizer.json");
                tracing::debug!(model = %model_path.display(), "using user-specified local model path");
                return Ok((model_path, tokenizer_path, config.dimensions, 512));
            }
        }

        let spec = model_manager::resolve_model_spec();

        if model_manager::is_model_ready(spec) {
            return Ok((model_manager::model_path(spec), model_manager::tokenizer_path(spec), spec.dimensions, spec.max_seq_length));
        }

        if std::env::var("CONEXUS_SKIP_MODEL_DOWNLOAD").is_ok() {
            return Err(ConexusError::ProviderUnavailable {
                provider: "local".into(),
                message: "model not cached and CONEXUS_SKIP_MODEL_DOWNLOAD is set".into(),
            });
        }

        let (model, tokenizer) = model_manager::ensure_model(spec).map_err(|e| ConexusError::ProviderUnavailable {
            provider: "local".into(),
            message: format!("model auto-download failed: {e}"),
        })?;
        Ok((model, tokenizer, spec.dimensions, spec.max_seq_length))
    }

    fn run_inference(&self, session: &mut Session, texts: &[&str]) -> ConexusResult<Vec<Vec<f32>>> {
        let batch_size = texts.len();
        let max_len = self.max_seq_length;

        let (input_ids, attention_mask, token_type_ids) = self.tokenize_batch(texts, max_len)?;
        let shape = vec![batch_size as i64, max_len as i64];

        let ids_value = ort::value::Tensor::from_array((shape.clone(), input_ids))
            .map_err(|e| ConexusError::internal(format!("ONNX tensor error: {e}")))?;
        let mask_value = ort::value::Tensor::from_array((shape.clone(), attention_mask.clone()))
            .map_err(|e| ConexusError::internal(format!("ONNX tensor error: {e}")))?;

        use std::borrow::Cow;
        let mut inputs: Vec<(Cow<'_, str>, ort::session::SessionInputValue<'_>)> = vec![
            (Cow::Borrowed("input_ids"), ort::session::SessionInputValue::from(ids_value)),
            (Cow::Borrowed("attention_mask"), ort::session::SessionInputValue::from(mask_value)),
        ];

        let expects_token_type = session.inputs().iter().any(|i| i.name() == "token_type_ids");
        if expects_token_type {
            let type_value = ort::value::Tensor::from_array((shape.clone(), token_type_ids))
                .map_err(|e| ConexusError::internal(format!("ONNX tensor error (token_type_ids): {e}")))?;
            inputs.push((Cow::Borrowed("token_type_ids"), ort::session::SessionInputValue::from(type_value)));
        }

        let output_name = session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| ConexusError::internal("model has no outputs"))?;

        let outputs = session.run(inputs).map_err(|e| ConexusError::ProviderUnavailable {
            provider: "local".into(),
            message: format!("ONNX inference error: {e}"),
        })?;

        let output_value = outputs.get(&output_name).ok_or_else(|| ConexusError::internal("no output tensor found"))?;
        let (output_shape, output_data) =
            output_value.try_extract_tensor::<f32>().map_err(|e| ConexusError::internal(format!("output extraction error: {e}")))?;

        let dims: Vec<usize> = output_shape.iter().map(|&d| d as usize).collect();
        let mut embeddings = Vec::with_capacity(batch_size);

        if dims.len() == 3 {
            let seq_len = dims[1];
            let hidden_dim = dims[2];
            for b in 0..batch_size {
                let mut pooled = vec![0.0f32; hidden_dim];
                let mut mask_sum = 0.0f32;
                for s in 0..seq_len {
                    let mask_val = attention_mask[b * max_len + s] as f32;
                    mask_sum += mask_val;
                    let offset = b * seq_len * hidden_dim + s * hidden_dim;
                    for d in 0..hidden_dim {
                        pooled[d] += output_data[offset + d] * mask_val;
                    }
                }
                if mask_sum > 0.0 {
                    for d in &mut pooled {
                        *d /= mask_sum;
                    }
                }
                l2_normalize(&mut pooled);
                embeddings.push(pooled);
            }
        } else if dims.len() == 2 {
            let hidden_dim = dims[1];
            for b in 0..batch_size {
                let offset = b * hidden_dim;
                let mut v = output_data[offset..offset + hidden_dim].to_vec();
                l2_normalize(&mut v);
                embeddings.push(v);
            }
        } else {
            return Err(ConexusError::internal(format!("unexpected output tensor shape: {dims:?}")));
        }

        Ok(embeddings)
    }

    fn tokenize_batch(&self, texts: &[&str], max_len: usize) -> ConexusResult<(Vec<i64>, Vec<i64>, Vec<i64>)> {
        let mut all_input_ids = Vec::with_capacity(texts.len() * max_len);
        let mut all_attention_mask = Vec::with_capacity(texts.len() * max_len);
        let mut all_token_type_ids = Vec::with_capacity(texts.len() * max_len);

        for text in texts {
            let encoding = self.tokenizer.encode(*text, true).map_err(|e| ConexusError::internal(format!("tokenization error: {e}")))?;
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let type_ids = encoding.get_type_ids();
            let actual_len = ids.len().min(max_len);

            for i in 0..actual_len {
                all_input_ids.push(i64::from(ids[i]));
                all_attention_mask.push(i64::from(mask[i]));
                all_token_type_ids.push(i64::from(type_ids[i]));
            }
            for _ in actual_len..max_len {
                all_input_ids.push(0);
                all_attention_mask.push(0);
                all_token_type_ids.push(0);
            }
        }

        Ok((all_input_ids, all_attention_mask, all_token_type_ids))
    }
}

impl EmbeddingProvider for LocalProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[&str]) -> ConexusResult<Vec<Vec<f32>>> {
        let mut session = self.session.lock().map_err(|_| ConexusError::internal("ONNX session mutex poisoned"))?;

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let batch_embeddings = self.run_inference(&mut session, batch)?;
            all_embeddings.extend(batch_embeddings);
        }
        Ok(all_embeddings)
    }
}
