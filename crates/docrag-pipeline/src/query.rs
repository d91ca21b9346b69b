//! Read path: query embedding, nearest-neighbour search and reconstruction of
//! search results from stored metadata.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use docrag_core::metadata::{decode_node_info, document_id_of, index_of, raw_node_info, CHUNK_INDEX};
use docrag_core::{Embedder, EmbeddingMode, MetadataFilter, QueryError, ScoredMatch, SearchResult, VectorStore};

use crate::retry::RetryPolicy;

pub struct QueryOrchestrator {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    retry: RetryPolicy,
}

impl QueryOrchestrator {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, retry: RetryPolicy) -> Self {
        Self { embedder, store, retry }
    }

    /// At most `top_k` results in the store's similarity order. An empty vector
    /// means nothing matched; failures are errors.
    pub async fn search(&self, query: &str, top_k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<SearchResult>, QueryError> {
        if top_k == 0 {
            return Err(QueryError::InvalidTopK);
        }
        let started = Instant::now();
        let embedder = &self.embedder;
        let vector = self
            .retry
            .run("embed_query", || embedder.embed(query, EmbeddingMode::Query))
            .await
            .map_err(QueryError::Embedding)?;
        let matches = self.store.query(&vector, top_k, filter).await.map_err(QueryError::Store)?;
        let results: Vec<SearchResult> = matches.into_iter().take(top_k).map(reconstruct).collect();
        debug!(
            index = %self.store.spec().name,
            top_k,
            filtered = filter.is_some(),
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search finished"
        );
        Ok(results)
    }
}

/// Rebuild a search result from a raw match. A match whose `node_info` cannot
/// be decoded is kept, with no page or image and the raw stored text as content.
pub fn reconstruct(m: ScoredMatch) -> SearchResult {
    let document_id = document_id_of(&m.metadata).unwrap_or_default().to_string();
    let chunk_index = index_of(&m.metadata, CHUNK_INDEX);
    match decode_node_info(&m.metadata) {
        Ok(info) => SearchResult {
            id: m.id,
            score: m.score,
            document_id,
            chunk_index,
            page_num: info.page_num,
            image_path: info.image_path,
            content: info.content,
        },
        Err(e) => {
            warn!(id = %m.id, error = %e, "undecodable node_info, using raw metadata");
            let content = raw_node_info(&m.metadata).unwrap_or_default().to_string();
            SearchResult { id: m.id, score: m.score, document_id, chunk_index, page_num: None, image_path: None, content }
        }
    }
}
