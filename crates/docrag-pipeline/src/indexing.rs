//! Write path: nodes -> chunks -> passage embeddings -> batched upserts.
//!
//! Embedding calls for a document run concurrently (bounded by
//! `concurrency`) but results are consumed in chunk order, so batches are
//! formed and upserted in the same order as a sequential run would produce.
//! Each flush first takes a token from the rate limiter.

use std::pin::pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use docrag_core::{
    ChunkMetadata, Chunker, DocumentNode, Embedder, EmbeddingMode, IndexingError, UpsertError, VectorRecord, VectorStore,
};

use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;

/// Summary of a completed indexing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub document_id: String,
    pub nodes: usize,
    pub chunks: usize,
    pub records: usize,
    pub batches: usize,
    pub elapsed: Duration,
}

pub struct IndexingOrchestrator {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    limiter: RateLimiter,
    batch_size: usize,
    concurrency: usize,
    retry: RetryPolicy,
}

impl IndexingOrchestrator {
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        limiter: RateLimiter,
        batch_size: usize,
        concurrency: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self { chunker, embedder, store, limiter, batch_size: batch_size.max(1), concurrency: concurrency.max(1), retry }
    }

    /// Metadata for every chunk of every node, in indexing order.
    pub fn plan(&self, nodes: &[DocumentNode], document_id: &str) -> Vec<ChunkMetadata> {
        nodes
            .iter()
            .enumerate()
            .flat_map(|(node_index, node)| {
                self.chunker
                    .chunk(&node.content)
                    .into_iter()
                    .map(move |chunk| ChunkMetadata::new(document_id, node_index, node, &chunk))
            })
            .collect()
    }

    pub async fn index_document(
        &self,
        nodes: &[DocumentNode],
        document_id: &str,
        cancel: &CancellationToken,
    ) -> Result<IndexReport, IndexingError> {
        let started = Instant::now();
        let planned = self.plan(nodes, document_id);
        let chunks = planned.len();
        info!(document_id, nodes = nodes.len(), chunks, batch_size = self.batch_size, "indexing document");

        let embedder = &self.embedder;
        let retry = self.retry;
        let mut embedded = pin!(stream::iter(planned.into_iter().map(|meta| async move {
            let result = retry
                .run("embed_passage", || embedder.embed(&meta.node_info.content, EmbeddingMode::Passage))
                .await;
            (meta, result)
        }))
        .buffered(self.concurrency));

        let mut buffer: Vec<VectorRecord> = Vec::with_capacity(self.batch_size);
        let mut batches = 0usize;
        let mut records = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(document_id, batches)),
                next = embedded.next() => next,
            };
            let Some((meta, result)) = next else { break };
            let vector = result.map_err(|source| IndexingError::Embedding {
                document_id: document_id.to_string(),
                node_index: meta.node_index,
                chunk_index: meta.chunk_index,
                source,
            })?;
            buffer.push(VectorRecord { id: meta.record_id(), vector, metadata: meta.to_metadata() });
            if buffer.len() >= self.batch_size {
                records += self.flush(document_id, &mut buffer, batches, cancel).await?;
                batches += 1;
            }
        }
        if !buffer.is_empty() {
            records += self.flush(document_id, &mut buffer, batches, cancel).await?;
            batches += 1;
        }

        let report = IndexReport { document_id: document_id.to_string(), nodes: nodes.len(), chunks, records, batches, elapsed: started.elapsed() };
        info!(document_id, records, batches, elapsed_ms = report.elapsed.as_millis() as u64, "indexed document");
        Ok(report)
    }

    async fn flush(
        &self,
        document_id: &str,
        buffer: &mut Vec<VectorRecord>,
        batch_index: usize,
        cancel: &CancellationToken,
    ) -> Result<usize, IndexingError> {
        if cancel.is_cancelled() {
            return Err(cancelled(document_id, batch_index));
        }
        let waited = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(document_id, batch_index)),
            waited = self.limiter.acquire() => waited,
        };

        let batch = std::mem::take(buffer);
        let first_id = batch.first().map(|r| r.id.clone()).unwrap_or_default();
        let last_id = batch.last().map(|r| r.id.clone()).unwrap_or_default();
        let started = Instant::now();
        let store = &self.store;
        self.retry.run("upsert", || store.upsert(&batch)).await.map_err(|source| IndexingError::Upsert {
            document_id: document_id.to_string(),
            source: UpsertError { batch_index, record_count: batch.len(), first_id: first_id.clone(), last_id: last_id.clone(), source },
        })?;
        debug!(
            document_id,
            batch_index,
            records = batch.len(),
            first_id = %first_id,
            last_id = %last_id,
            waited_ms = waited.as_millis() as u64,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "upserted batch"
        );
        Ok(batch.len())
    }
}

fn cancelled(document_id: &str, batches_written: usize) -> IndexingError {
    info!(document_id, batches_written, "indexing cancelled");
    IndexingError::Cancelled { document_id: document_id.to_string(), batches_written }
}
