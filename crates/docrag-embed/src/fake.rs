//! Hash-based embedder for tests and offline runs.
//!
//! Each lowercased alphanumeric token is hashed into one of `dim` buckets and
//! the result is L2-normalized, so texts that share words have a positive
//! cosine similarity. Passage and query modes produce the same vector.

use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use docrag_core::{Embedder, EmbeddingMode, EmbeddingServiceError, EmbeddingVector};
use twox_hash::XxHash64;

pub struct FakeEmbedder {
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }

    pub fn embed_sync(&self, text: &str) -> EmbeddingVector {
        let mut v = vec![0f32; self.dim];
        let tokens = text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty());
        for token in tokens {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            v[idx] += 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_id(&self) -> &str { "fake-xxhash" }

    fn dim(&self) -> usize { self.dim }

    async fn embed(&self, text: &str, _mode: EmbeddingMode) -> Result<EmbeddingVector, EmbeddingServiceError> {
        Ok(self.embed_sync(text))
    }
}
