//! docrag-core
//!
//! Domain types, metadata schema, error taxonomy and the seams (traits) shared by
//! the embedding, vector-store, completion and pipeline crates.

#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod chunker;
pub mod config;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod nodes;
pub mod traits;
pub mod types;

pub use chunker::{Chunker, ChunkerConfig};
pub use error::{
    AnswerError, ConfigError, EmbeddingServiceError, IndexingError, ProvisioningError, QueryError,
    StoreError, SynthesisError, UpsertError,
};
pub use filter::{Condition, MetadataFilter};
pub use metadata::{record_id, ChunkMetadata, NodeInfo};
pub use traits::{CompletionModel, CompletionRequest, Embedder, VectorStore};
pub use types::{
    Answer, Chunk, DocumentNode, EmbeddingMode, EmbeddingVector, IndexSpec, Metadata, Metric,
    ScoredMatch, SearchResult, VectorRecord,
};
