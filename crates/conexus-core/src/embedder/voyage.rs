//! Voyage AI embeddings API provider.
//!
//! POSTs to `{base_url}/embeddings` with `{model, input, input_type}` and
//! expects `{data: [{embedding, index}, ...]}`, the same response shape
//! as OpenAI's endpoint. The API key is read from
//! `CONEXUS_EMBEDDING_API_KEY`.

use serde::Deserialize;

use crate::config::EmbeddingConfig;
use crate::embedder::{api_key_from_env, l2_normalize, EmbeddingProvider};
use crate::error::{ConexusError, ConexusResult};

const DEFAULT_BASE_URL: &str = "https://api.voyageai.com/v1";
const DEFAULT_MODEL: &str = "voyage-code-3";

/// Embedding provider backed by the Voyage AI embeddings endpoint.
pub struct VoyageProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: String,
    dimensions: usize,
    batch_size: usize,
}

impl VoyageProvider {
    /// Construct a provider from config. Fails fast if the API key is missing.
    pub fn new(config: &EmbeddingConfig) -> ConexusResult<Self> {
        let api_key = api_key_from_env("voyage")?;
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
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
    index: usize,
}

impl EmbeddingProvider for VoyageProvider {
    fn name(&self) -> &'static str {
        "voyage"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[&str]) -> ConexusResult<Vec<Vec<f32>>> {
        let mut all = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({ "model": self.model, "input": batch, "input_type": "document" });

            let response = self
                .client
                .post(format!("{}/embeddings", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .map_err(|e| ConexusError::ProviderUnavailable { provider: "voyage".into(), message: format!("request failed: {e}") })?;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(ConexusError::RateLimited { provider: "voyage".into() });
            }
            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().unwrap_or_default();
                return Err(ConexusError::ProviderUnavailable { provider: "voyage".into(), message: format!("HTTP {status}: {text}") });
            }

            let mut parsed: EmbeddingResponse = response
                .json()
                .map_err(|e| ConexusError::ProviderUnavailable { provider: "voyage".into(), message: format!("invalid response body: {e}") })?;

            parsed.data.sort_by_key(|e| e.index);
            for mut entry in parsed.data {
                l2_normalize(&mut entry.embedding);
                all.push(entry.embedding);
            }
        }

        Ok(all)
    }
}
