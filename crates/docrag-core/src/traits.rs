use async_trait::async_trait;

use crate::error::{EmbeddingServiceError, ProvisioningError, StoreError, SynthesisError};
use crate::filter::MetadataFilter;
use crate::types::{EmbeddingMode, EmbeddingVector, IndexSpec, ScoredMatch, VectorRecord};

/// Text to vector. Implementations are stateless and issue one remote call per
/// invocation; batching, concurrency and retries belong to the caller.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier of the model behind this embedder.
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<EmbeddingVector, EmbeddingServiceError>;
}

/// A single named vector index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn spec(&self) -> &IndexSpec;

    /// Create the index if it does not exist yet. Safe to call on every start.
    async fn ensure_index(&self) -> Result<(), ProvisioningError>;

    /// Write or overwrite records by id. Callers bound the batch size.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), StoreError>;

    /// At most `top_k` nearest records, most similar first.
    async fn query(&self, vector: &[f32], top_k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<ScoredMatch>, StoreError>;
}

pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// A generative language model endpoint.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    fn model_id(&self) -> &str;
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, SynthesisError>;
}
