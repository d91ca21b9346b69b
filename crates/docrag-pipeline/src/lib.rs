//! docrag-pipeline
//!
//! Indexing and query orchestration over the core seams, and the
//! [`RagPipeline`] facade the application layer talks to.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use docrag_core::config::{QuerySettings, Settings};
use docrag_core::{
    Answer, AnswerError, Chunker, CompletionModel, ConfigError, DocumentNode, Embedder, IndexingError, MetadataFilter,
    ProvisioningError, QueryError, SearchResult, VectorStore,
};

pub mod build;
pub mod indexing;
pub mod query;
pub mod rate_limit;
pub mod retry;
pub mod synthesis;

pub use build::{build_from_settings, UnconfiguredModel};
pub use indexing::{IndexReport, IndexingOrchestrator};
pub use query::QueryOrchestrator;
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use synthesis::AnswerSynthesizer;

pub struct RagPipeline {
    store: Arc<dyn VectorStore>,
    indexer: IndexingOrchestrator,
    query: QueryOrchestrator,
    synthesizer: AnswerSynthesizer,
    limits: QuerySettings,
    max_tokens: usize,
    in_flight: Mutex<HashSet<String>>,
}

impl RagPipeline {
    pub fn new(
        settings: &Settings,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        completion: Arc<dyn CompletionModel>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        if embedder.dim() != store.spec().dimension {
            return Err(ConfigError::Invalid(format!(
                "embedder '{}' produces {} dimensions but index '{}' expects {}",
                embedder.model_id(),
                embedder.dim(),
                store.spec().name,
                store.spec().dimension
            )));
        }
        let chunker = Chunker::new(settings.chunking.clone())?;
        let retry = RetryPolicy {
            max_retries: settings.embedding.max_retries,
            base_delay: Duration::from_millis(settings.embedding.retry_base_delay_ms),
        };
        let limiter = RateLimiter::new(settings.vector_store.upserts_per_second, settings.vector_store.upsert_burst);
        let indexer = IndexingOrchestrator::new(
            chunker,
            embedder.clone(),
            store.clone(),
            limiter,
            settings.vector_store.batch_size,
            settings.embedding.concurrency,
            retry,
        );
        let query = QueryOrchestrator::new(embedder, store.clone(), retry);
        let synthesizer =
            AnswerSynthesizer::new(completion, settings.completion.temperature, settings.completion.max_context_chars);
        Ok(Self {
            store,
            indexer,
            query,
            synthesizer,
            limits: settings.query,
            max_tokens: settings.completion.max_tokens,
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> { &self.store }

    pub fn default_top_k(&self) -> usize { self.limits.default_top_k }

    /// Create the index if needed. Call once at startup; failure is fatal.
    pub async fn provision(&self) -> Result<(), ProvisioningError> {
        self.store.ensure_index().await?;
        info!(index = %self.store.spec().name, dimension = self.store.spec().dimension, "index provisioned");
        Ok(())
    }

    pub async fn index_document(&self, nodes: &[DocumentNode], document_id: &str) -> Result<IndexReport, IndexingError> {
        self.index_document_with_cancel(nodes, document_id, &CancellationToken::new()).await
    }

    /// Index one document. Only one run per document id may be in flight;
    /// a second concurrent run fails with `AlreadyRunning`.
    pub async fn index_document_with_cancel(
        &self,
        nodes: &[DocumentNode],
        document_id: &str,
        cancel: &CancellationToken,
    ) -> Result<IndexReport, IndexingError> {
        let _guard = InFlight::claim(&self.in_flight, document_id)?;
        self.indexer.index_document(nodes, document_id, cancel).await
    }

    /// Nearest chunks for `query`. `top_k` is clamped to the configured maximum.
    pub async fn search(&self, query: &str, top_k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<SearchResult>, QueryError> {
        if top_k == 0 {
            return Err(QueryError::InvalidTopK);
        }
        self.query.search(query, top_k.min(self.limits.max_top_k), filter).await
    }

    pub async fn answer(&self, query: &str, top_k: usize) -> Result<Answer, AnswerError> {
        self.answer_filtered(query, top_k, None).await
    }

    pub async fn answer_for_document(&self, query: &str, top_k: usize, document_id: &str) -> Result<Answer, AnswerError> {
        self.answer_filtered(query, top_k, Some(&MetadataFilter::document(document_id))).await
    }

    async fn answer_filtered(&self, query: &str, top_k: usize, filter: Option<&MetadataFilter>) -> Result<Answer, AnswerError> {
        let chunks = self.search(query, top_k, filter).await?;
        let text = self.synthesizer.synthesize(query, &chunks, self.max_tokens).await?;
        Ok(Answer::new(query, text, chunks))
    }

    /// Retrieval plus the prompt that would be sent to the model, without
    /// calling it. The prompt is `None` when nothing relevant was found.
    pub async fn preview_prompt(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<(Vec<SearchResult>, Option<String>), QueryError> {
        let chunks = self.search(query, top_k, filter).await?;
        let prompt = self.synthesizer.build_prompt(query, &chunks);
        Ok((chunks, prompt))
    }
}

/// Registration of a running indexing job, released on drop.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    document_id: String,
}

impl<'a> InFlight<'a> {
    fn claim(set: &'a Mutex<HashSet<String>>, document_id: &str) -> Result<Self, IndexingError> {
        let mut running = set.lock().unwrap_or_else(PoisonError::into_inner);
        if !running.insert(document_id.to_string()) {
            return Err(IndexingError::AlreadyRunning { document_id: document_id.to_string() });
        }
        Ok(Self { set, document_id: document_id.to_string() })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.document_id);
    }
}
