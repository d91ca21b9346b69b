//! Domain types passed between the chunker, embedder, vector stores and the
//! orchestrators.

use serde::{Deserialize, Serialize};

pub type RecordId = String;
pub type EmbeddingVector = Vec<f32>;
/// Flat metadata map stored next to every vector.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// One unit of extracted content, as produced by the document extraction service.
///
/// - `content`: text of the region (may be empty; empty nodes produce no chunks)
/// - `page_num`: page the region was taken from, when known
/// - `image_path`: path of an image extracted for this region, when any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentNode {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub page_num: Option<u32>,
    #[serde(default)]
    pub image_path: Option<String>,
}

impl DocumentNode {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), page_num: None, image_path: None }
    }

    pub fn with_page(mut self, page_num: u32) -> Self {
        self.page_num = Some(page_num);
        self
    }

    pub fn with_image(mut self, image_path: impl Into<String>) -> Self {
        self.image_path = Some(image_path.into());
        self
    }
}

/// A bounded-length segment of a node's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

impl Chunk {
    /// Length in characters, the unit the chunker bounds.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Which side of the retrieval problem an embedding is produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    Passage,
    Query,
}

impl EmbeddingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passage => "passage",
            Self::Query => "query",
        }
    }
}

/// Similarity metric of a vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Euclidean,
    #[serde(alias = "dot_product")]
    Dotproduct,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::Dotproduct => "dotproduct",
        }
    }
}

/// Name, width and metric of the index a store owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, dimension: usize, metric: Metric) -> Self {
        Self { name: name.into(), dimension, metric }
    }
}

/// `(id, vector, metadata)` triple written to a vector index. Writing a record
/// whose id already exists replaces the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: RecordId,
    pub vector: EmbeddingVector,
    pub metadata: Metadata,
}

/// A raw nearest-neighbour match as returned by a store, before the metadata
/// is decoded. Higher `score` is always more similar.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatch {
    pub id: RecordId,
    pub score: f32,
    pub metadata: Metadata,
}

/// A retrieved passage reconstructed from stored metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: RecordId,
    pub score: f32,
    pub document_id: String,
    pub chunk_index: Option<usize>,
    pub page_num: Option<u32>,
    pub image_path: Option<String>,
    pub content: String,
}

/// The synthesized response to a question together with the passages it was
/// grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub query: String,
    pub answer: String,
    pub supporting_chunks: Vec<SearchResult>,
    pub total_chunks: usize,
}

impl Answer {
    pub fn new(query: impl Into<String>, answer: impl Into<String>, supporting_chunks: Vec<SearchResult>) -> Self {
        let total_chunks = supporting_chunks.len();
        Self { query: query.into(), answer: answer.into(), supporting_chunks, total_chunks }
    }

    /// Distinct image paths referenced by the supporting chunks, in result order.
    pub fn image_paths(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for path in self.supporting_chunks.iter().filter_map(|c| c.image_path.as_deref()) {
            if !seen.contains(&path) { seen.push(path); }
        }
        seen
    }
}
