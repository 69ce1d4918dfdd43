//! Cohere embeddings API provider.
//!
//! POSTs to `{base_url}/embed` with `{model, texts, input_type, embedding_types}`
//! and expects `{embeddings: {float: [[f32], ...]}}`. Responses preserve
//! input order, unlike OpenAI/Voyage which echo back an `index`. The API
//! key is read from `CONEXUS_EMBEDDING_API_KEY`.

use serde::Deserialize;

use crate::config::EmbeddingConfig;
use crate::embedder::{api_key_from_env, l2_normalize, EmbeddingProvider};
use crate::error::{ConexusError, ConexusResult};

const DEFAULT_BASE_URL: &str = "https://api.cohere.com/v2";
const DEFAULT_MODEL: &str = "embed-english-v3.0";

/// Embedding provider backed by the Cohere embeddings endpoint.
pub struct CohereProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: String,
    dimensions: usize,
    batch_size: usize,
}

impl CohereProvider {
    /// Construct a provider from config. Fails fast if the API key is missing.
    pub fn new(config: &EmbeddingConfig) -> ConexusResult<Self> {
        let api_key = api_key_from_env("cohere")?;
        let base_url = config.options.get("base_url").cloned().unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = config.options.get("model").cloned().unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| ConexusError::internal(format!("HTTP client error: {e}")))?;

        Ok(Self { client, base_url, model, api_key, dimensions: config.dimensions, batch_size: config.batch_size.max(1) })
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: EmbeddingsByType,
}

#[derive(Deserialize)]
struct EmbeddingsByType {
    float: Vec<Vec<f32>>,
}

impl EmbeddingProvider for CohereProvider {
    fn name(&self) -> &'static str {
        "cohere"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[&str]) -> ConexusResult<Vec<Vec<f32>>> {
        let mut all = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "texts": batch,
                "input_type": "search_document",
                "embedding_types": ["float"],
            });

            let response = self
                .client
                .post(format!("{}/embed", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .map_err(|e| ConexusError::ProviderUnavailable { provider: "cohere".into(), message: format!("request failed: {e}") })?;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(ConexusError::RateLimited { provider: "cohere".into() });
            }
            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().unwrap_or_default();
                return Err(ConexusError::ProviderUnavailable { provider: "cohere".into(), message: format!("HTTP {status}: {text}") });
            }

            let parsed: EmbeddingResponse = response
                .json()
                .map_err(|e| ConexusError::ProviderUnavailable { provider: "cohere".into(), message: format!("invalid response body: {e}") })?;

            for mut embedding in parsed.embeddings.float {
                l2_normalize(&mut embedding);
                all.push(embedding);
            }
        }

        Ok(all)
    }
}
