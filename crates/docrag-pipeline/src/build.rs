//! Wiring of concrete backends from settings.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use docrag_core::config::{Settings, StoreBackend};
use docrag_core::{CompletionModel, CompletionRequest, SynthesisError, VectorStore};
use docrag_embed::get_default_embedder;
use docrag_llm::ChatCompletionClient;
use docrag_vector::{LanceDbStore, MemoryStore, PineconeStore};

use crate::RagPipeline;

/// Stands in for the completion endpoint when no credential is configured, so
/// that provisioning, ingestion and search still work. Every answer fails.
pub struct UnconfiguredModel {
    reason: String,
}

impl UnconfiguredModel {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl CompletionModel for UnconfiguredModel {
    fn model_id(&self) -> &str { "unconfigured" }

    async fn complete(&self, _request: &CompletionRequest<'_>) -> Result<String, SynthesisError> {
        Err(SynthesisError::Transport(format!("completion endpoint is not configured: {}", self.reason)))
    }
}

pub async fn build_store(settings: &Settings) -> Result<Arc<dyn VectorStore>> {
    let spec = settings.index_spec();
    let store: Arc<dyn VectorStore> = match settings.vector_store.backend {
        StoreBackend::Pinecone => Arc::new(PineconeStore::from_settings(spec, &settings.vector_store)?),
        StoreBackend::Lancedb => {
            let uri = settings.vector_store.lancedb.resolved_uri();
            let timeout = Duration::from_secs(settings.vector_store.timeout_secs);
            let store = LanceDbStore::connect(&uri.to_string_lossy(), spec, timeout)
                .await
                .with_context(|| format!("failed to open LanceDB at {}", uri.display()))?;
            Arc::new(store)
        }
        StoreBackend::Memory => Arc::new(MemoryStore::new(spec)),
    };
    info!(backend = ?settings.vector_store.backend, index = %store.spec().name, "vector store ready");
    Ok(store)
}

pub fn build_completion(settings: &Settings) -> Result<Arc<dyn CompletionModel>> {
    match settings.completion.api_key() {
        Ok(_) => Ok(Arc::new(ChatCompletionClient::from_settings(&settings.completion)?)),
        Err(e) => {
            warn!(error = %e, "answer synthesis disabled");
            Ok(Arc::new(UnconfiguredModel::new(e.to_string())))
        }
    }
}

/// Assemble a pipeline from validated settings: the configured store backend,
/// the default embedder and the chat completion client.
pub async fn build_from_settings(settings: &Settings) -> Result<RagPipeline> {
    settings.validate()?;
    let embedder = get_default_embedder(&settings.embedding)?;
    let store = build_store(settings).await?;
    let completion = build_completion(settings)?;
    Ok(RagPipeline::new(settings, embedder, store, completion)?)
}
