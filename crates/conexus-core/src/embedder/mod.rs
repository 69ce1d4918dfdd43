//! Pluggable text-to-vector provider registry (`spec.md` §4.4).
//!
//! `create_provider` resolves an `EmbeddingConfig` into a boxed
//! `EmbeddingProvider`. Five providers are registered: `mock` (the
//! default -- deterministic, network-free, used until a real provider is
//! configured), `local` (ONNX Runtime inference against an
//! auto-downloaded HuggingFace model), and `openai`/`voyage`/`cohere`
//! (thin HTTP clients against each vendor's embeddings endpoint).
//!
//! Every provider returns L2-normalized vectors so the store's vector
//! search can compare them with a plain dot product.

pub mod cohere;
pub mod local;
pub mod mock;
pub mod model_manager;
pub mod openai;
pub mod voyage;

use crate::config::EmbeddingConfig;
use crate::error::{ConexusError, ConexusResult};

/// A text-to-vector embedding backend.
///
/// Implementations batch internally (respecting `EmbeddingConfig::batch_size`
/// where relevant) and must return one vector per input, in input order.
/// A provider that cannot embed a given input at all should fail the whole
/// batch with `ProviderUnavailable`/`RateLimited` rather than silently
/// dropping entries -- callers (the indexer) decide how to degrade.
pub trait EmbeddingProvider: Send + Sync {
    /// Registry key this provider was constructed from (e.g. `"mock"`).
    fn name(&self) -> &'static str;

    /// Output vector dimension `D`. Constant for the lifetime of the provider.
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts, returning one L2-normalized vector per input.
    fn embed_batch(&self, texts: &[&str]) -> ConexusResult<Vec<Vec<f32>>>;

    /// Embed a single text. Default implementation delegates to `embed_batch`.
    fn embed_single(&self, text: &str) -> ConexusResult<Vec<f32>> {
        let mut batch = self.embed_batch(&[text])?;
        batch.pop().ok_or_else(|| ConexusError::internal("embed_batch returned no vectors for a single input"))
    }
}

/// Construct the provider named in `config.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> ConexusResult<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "mock" => Ok(Box::new(mock::MockProvider::new(config.dimensions))),
        "local" => Ok(Box::new(local::LocalProvider::new(config)?)),
        "openai" => Ok(Box::new(openai::OpenAiProvider::new(config)?)),
        "voyage" => Ok(Box::new(voyage::VoyageProvider::new(config)?)),
        "cohere" => Ok(Box::new(cohere::CohereProvider::new(config)?)),
        other => Err(ConexusError::InvalidParams { message: format!("unknown embedding provider: {other}") }),
    }
}

/// Read the shared credential env var providers authenticate with.
/// Kept out of `EmbeddingConfig` itself so config files and `status`
/// output never carry a secret.
pub(crate) fn api_key_from_env(provider: &str) -> ConexusResult<String> {
    std::env::var("CONEXUS_EMBEDDING_API_KEY").map_err(|_| ConexusError::ProviderUnavailable {
        provider: provider.to_string(),
        message: "CONEXUS_EMBEDDING_API_KEY is not set".to_string(),
    })
}

/// Normalize `vector` to unit length in place. A zero vector is left as-is.
pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(provider: &str) -> EmbeddingConfig {
        EmbeddingConfig { provider: provider.to_string(), dimensions: 8, batch_size: 4, options: HashMap::new() }
    }

    #[test]
    fn create_provider_defaults_to_mock() {
        let provider = create_provider(&config("mock")).expect("mock should always construct");
        assert_eq!(provider.name(), "mock");
        assert_eq!(provider.dimensions(), 8);
    }

    #[test]
    fn create_provider_rejects_unknown_name() {
        let err = create_provider(&config("not-a-real-provider")).unwrap_err();
        assert!(matches!(err, ConexusError::InvalidParams { .. }));
    }

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_leaves_zero_vector_untouched() {
        let mut v = vec![0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }
}
