//! Deterministic, network-free embedding provider.
//!
//! `mock` is the default `embedding.provider` (`spec.md` §4.4): every text
//! maps to the same vector across runs (hash-seeded), so indexing and
//! search are fully reproducible without a model, API key, or network
//! access. It is not intended to produce semantically meaningful vectors --
//! only to exercise the vector-search code path deterministically.

use sha2::{Digest, Sha256};

use crate::embedder::{l2_normalize, EmbeddingProvider};
use crate::error::ConexusResult;

/// Hash-seeded deterministic embedding provider.
pub struct MockProvider {
    dimensions: usize,
}

impl MockProvider {
    /// Construct a mock provider producing `dimensions`-length vectors.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();

        // Seed a small xorshift64 PRNG from the first 8 hash bytes so the
        // same text always yields the same vector, with no external state.
        let mut state = u64::from_le_bytes(digest[0..8].try_into().unwrap_or([1; 8]));
        if state == 0 {
            state = 0x9E3779B97F4A7C15;
        }

        let mut vector = Vec::with_capacity(self.dimensions);
        for _ in 0..self.dimensions {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            // Map the top 24 bits onto [-1.0, 1.0).
            let scaled = ((state >> 40) & 0x00FF_FFFF) as f32 / 0x0080_0000 as f32 - 1.0;
            vector.push(scaled);
        }

        l2_normalize(&mut vector);
        vector
    }
}

impl EmbeddingProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[&str]) -> ConexusResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_yields_same_vector() {
        let provider = MockProvider::new(16);
        let a = provider.embed_single("fn add(a, b) { a + b }").expect("embed");
        let b = provider.embed_single("fn add(a, b) { a + b }").expect("embed");
        assert_eq!(a, b);
    }

    #[test]
    fn different_text_yields_different_vector() {
        let provider = MockProvider::new(16);
        let a = provider.embed_single("alpha").expect("embed");
        let b = provider.embed_single("beta").expect("embed");
        assert_ne!(a, b);
    }

    #[test]
    fn vectors_are_unit_length() {
        let provider = MockProvider::new(32);
        let v = provider.embed_single("some text").expect("embed");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn respects_requested_dimensions() {
        let provider = MockProvider::new(384);
        let v = provider.embed_single("x").expect("embed");
        assert_eq!(v.len(), 384);
        assert_eq!(provider.dimensions(), 384);
    }

    #[test]
    fn batch_matches_single_embeddings() {
        let provider = MockProvider::new(8);
        let batch = provider.embed_batch(&["one", "two"]).expect("batch");
        assert_eq!(batch[0], provider.embed_single("one").expect("embed"));
        assert_eq!(batch[1], provider.embed_single("two").expect("embed"));
    }
}
