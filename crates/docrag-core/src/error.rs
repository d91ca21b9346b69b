use std::time::Duration;

use thiserror::Error;

/// Invalid or incomplete configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing credential: set `{key}` or the `{env}` environment variable")]
    MissingCredential { key: String, env: String },
}

/// The vector index could not be created or verified. Fatal at startup.
#[derive(Debug, Error)]
#[error("failed to provision index '{index}': {message}")]
pub struct ProvisioningError {
    pub index: String,
    pub message: String,
}

impl ProvisioningError {
    pub fn new(index: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self { index: index.into(), message: message.to_string() }
    }
}

/// A call to the remote embedding service failed.
#[derive(Debug, Error)]
pub enum EmbeddingServiceError {
    #[error("embedding request failed: {0}")]
    Transport(String),

    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),

    #[error("embedding service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed embedding response: {0}")]
    Malformed(String),
}

impl EmbeddingServiceError {
    /// Rate limits, server errors, timeouts and connection failures may succeed
    /// on a later attempt; everything else will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed(_) => false,
        }
    }
}

/// A single call against a vector store backend failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("vector store request failed: {0}")]
    Backend(String),

    #[error("vector store request timed out after {0:?}")]
    Timeout(Duration),

    #[error("vector store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("vector dimension mismatch: index expects {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("invalid filter: {0}")]
    Filter(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backend(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Dimension { .. } | Self::Filter(_) => false,
        }
    }
}

/// A batch write failed. Earlier batches of the same run stay in the store.
#[derive(Debug, Error)]
#[error("upsert of batch {batch_index} ({record_count} records, {first_id}..{last_id}) failed: {source}")]
pub struct UpsertError {
    pub batch_index: usize,
    pub record_count: usize,
    pub first_id: String,
    pub last_id: String,
    #[source]
    pub source: StoreError,
}

/// Indexing of a document stopped before all of its chunks were stored.
#[derive(Debug, Error)]
pub enum IndexingError {
    #[error("document '{document_id}': embedding node {node_index} chunk {chunk_index} failed: {source}")]
    Embedding {
        document_id: String,
        node_index: usize,
        chunk_index: usize,
        #[source]
        source: EmbeddingServiceError,
    },

    #[error("document '{document_id}': {source}")]
    Upsert {
        document_id: String,
        #[source]
        source: UpsertError,
    },

    #[error("document '{document_id}': indexing cancelled after {batches_written} batches")]
    Cancelled { document_id: String, batches_written: usize },

    #[error("document '{document_id}' is already being indexed")]
    AlreadyRunning { document_id: String },
}

/// Search could not be performed. Distinct from an empty result set.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unable to search: query embedding failed: {0}")]
    Embedding(#[source] EmbeddingServiceError),

    #[error("unable to search: {0}")]
    Store(#[source] StoreError),

    #[error("top_k must be at least 1")]
    InvalidTopK,
}

/// The completion call failed, or there was nothing to ground an answer on.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("no relevant context found for the question")]
    NoContext,

    #[error("unable to generate answer: {0}")]
    Transport(String),

    #[error("unable to generate answer: completion timed out after {0:?}")]
    Timeout(Duration),

    #[error("unable to generate answer: completion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unable to generate answer: {0}")]
    Malformed(String),
}

/// Failure of the search-then-synthesize path.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

impl AnswerError {
    pub fn is_no_context(&self) -> bool {
        matches!(self, Self::Synthesis(SynthesisError::NoContext))
    }
}
