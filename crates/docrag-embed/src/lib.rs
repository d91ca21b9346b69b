//! docrag-embed
//!
//! Text embedders: a client for OpenAI-compatible `embeddings` endpoints (the
//! NVIDIA retrieval models by default) and a deterministic offline fake.

use std::sync::Arc;

use anyhow::Result;
use docrag_core::config::{EmbeddingProvider, EmbeddingSettings};
pub use docrag_core::config::fake_embeddings_forced;
use docrag_core::Embedder;

pub mod fake;
pub mod remote;

pub use fake::FakeEmbedder;
pub use remote::RemoteEmbedder;

pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if fake_embeddings_forced() || settings.provider == EmbeddingProvider::Fake {
        tracing::info!(dimension = settings.dimension, "using fake embedder");
        return Ok(Arc::new(FakeEmbedder::new(settings.dimension)));
    }
    let embedder = RemoteEmbedder::from_settings(settings)?;
    tracing::info!(model = %settings.model, dimension = settings.dimension, "using remote embedder");
    Ok(Arc::new(embedder))
}
