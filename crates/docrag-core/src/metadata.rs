//! Metadata stored next to every vector, and its decoding.
//!
//! Records carry flat routing fields (`document_id`, `node_index`,
//! `chunk_index`) that backends can filter on, plus `node_info`: a JSON string
//! with the page number, image path and chunk text needed to rebuild a search
//! result without touching the source document.
//!
//! Decoding also accepts records written by the earlier service, which used
//! `pdf_id` for the document id, `text` for the node info, empty strings for
//! absent page/image values, and got numbers back from the index as floats.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{Chunk, DocumentNode, Metadata};

pub const DOCUMENT_ID: &str = "document_id";
pub const NODE_INDEX: &str = "node_index";
pub const CHUNK_INDEX: &str = "chunk_index";
pub const NODE_INFO: &str = "node_info";

const LEGACY_DOCUMENT_ID: &str = "pdf_id";
const LEGACY_NODE_INFO: &str = "text";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata field '{0}' is missing")]
    Missing(&'static str),

    #[error("metadata field '{field}' is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("node_info is not valid JSON: {0}")]
    NodeInfo(#[from] serde_json::Error),
}

/// Deterministic record id for a chunk. Re-indexing the same chunk overwrites
/// the previous record instead of adding a new one.
pub fn record_id(document_id: &str, node_index: usize, chunk_index: usize) -> String {
    format!("{}_node{}_chunk{}", document_id, node_index, chunk_index)
}

/// Per-chunk payload serialized into `node_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    #[serde(default, deserialize_with = "lenient_page_num")]
    pub page_num: Option<u32>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub image_path: Option<String>,
    pub content: String,
}

impl NodeInfo {
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "page_num": self.page_num,
            "image_path": self.image_path,
            "content": self.content,
        })
        .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub node_index: usize,
    pub chunk_index: usize,
    pub node_info: NodeInfo,
}

impl ChunkMetadata {
    pub fn new(document_id: &str, node_index: usize, node: &DocumentNode, chunk: &Chunk) -> Self {
        Self {
            document_id: document_id.to_string(),
            node_index,
            chunk_index: chunk.index,
            node_info: NodeInfo { page_num: node.page_num, image_path: node.image_path.clone(), content: chunk.text.clone() },
        }
    }

    pub fn record_id(&self) -> String {
        record_id(&self.document_id, self.node_index, self.chunk_index)
    }

    pub fn to_metadata(&self) -> Metadata {
        let mut m = Metadata::new();
        m.insert(DOCUMENT_ID.into(), Value::from(self.document_id.clone()));
        m.insert(NODE_INDEX.into(), Value::from(self.node_index as u64));
        m.insert(CHUNK_INDEX.into(), Value::from(self.chunk_index as u64));
        m.insert(NODE_INFO.into(), Value::from(self.node_info.to_json()));
        m
    }

    pub fn decode(metadata: &Metadata) -> Result<Self, MetadataError> {
        let document_id = document_id_of(metadata).ok_or(MetadataError::Missing(DOCUMENT_ID))?.to_string();
        let node_index = index_field(metadata, NODE_INDEX)?;
        let chunk_index = index_field(metadata, CHUNK_INDEX)?;
        let node_info = decode_node_info(metadata)?;
        Ok(Self { document_id, node_index, chunk_index, node_info })
    }
}

pub fn document_id_of(metadata: &Metadata) -> Option<&str> {
    metadata
        .get(DOCUMENT_ID)
        .or_else(|| metadata.get(LEGACY_DOCUMENT_ID))
        .and_then(Value::as_str)
}

/// Raw `node_info` text as stored, used as a fallback when it cannot be parsed.
pub fn raw_node_info(metadata: &Metadata) -> Option<&str> {
    metadata
        .get(NODE_INFO)
        .or_else(|| metadata.get(LEGACY_NODE_INFO))
        .and_then(Value::as_str)
}

pub fn decode_node_info(metadata: &Metadata) -> Result<NodeInfo, MetadataError> {
    let raw = raw_node_info(metadata).ok_or(MetadataError::Missing(NODE_INFO))?;
    Ok(serde_json::from_str(raw)?)
}

/// Reads a non-negative integer field, tolerating integral floats.
pub fn index_of(metadata: &Metadata, key: &str) -> Option<usize> {
    metadata.get(key).and_then(value_as_index)
}

fn index_field(metadata: &Metadata, key: &'static str) -> Result<usize, MetadataError> {
    let value = metadata.get(key).ok_or(MetadataError::Missing(key))?;
    value_as_index(value).ok_or_else(|| MetadataError::Invalid { field: key, reason: format!("expected a non-negative integer, got {}", value) })
}

fn value_as_index(value: &Value) -> Option<usize> {
    if let Some(n) = value.as_u64() { return usize::try_from(n).ok(); }
    let f = value.as_f64()?;
    if f >= 0.0 && f.fract() == 0.0 && f <= usize::MAX as f64 { Some(f as usize) } else { None }
}

fn lenient_page_num<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    use serde::de::Error;
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse().map(Some).map_err(D::Error::custom),
        v @ Value::Number(_) => value_as_index(&v)
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid page number {}", v))),
        other => Err(D::Error::custom(format!("invalid page number {}", other))),
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(v: Value) -> Metadata {
        match v { Value::Object(m) => m, _ => panic!("expected object") }
    }

    #[test]
    fn record_id_is_stable() {
        assert_eq!(record_id("report-7", 2, 0), "report-7_node2_chunk0");
        assert_eq!(record_id("report-7", 2, 0), record_id("report-7", 2, 0));
    }

    #[test]
    fn encode_then_decode_keeps_every_field() {
        let node = DocumentNode::text("ignored").with_page(4).with_image("figures/p4.png");
        let chunk = Chunk { index: 3, text: "Revenue grew 12%.".into() };
        let meta = ChunkMetadata::new("q3", 1, &node, &chunk);
        let decoded = ChunkMetadata::decode(&meta.to_metadata()).expect("decode");
        assert_eq!(decoded, meta);
        assert_eq!(decoded.record_id(), "q3_node1_chunk3");
    }

    #[test]
    fn decodes_legacy_records_with_float_indices_and_empty_strings() {
        let m = map(serde_json::json!({
            "pdf_id": "annual",
            "node_index": 2.0,
            "chunk_index": 5.0,
            "text": "{\"page_num\": \"\", \"image_path\": \"\", \"content\": \"hello\"}"
        }));
        let decoded = ChunkMetadata::decode(&m).expect("decode");
        assert_eq!(decoded.document_id, "annual");
        assert_eq!(decoded.node_index, 2);
        assert_eq!(decoded.chunk_index, 5);
        assert_eq!(decoded.node_info.page_num, None);
        assert_eq!(decoded.node_info.image_path, None);
        assert_eq!(decoded.node_info.content, "hello");
    }

    #[test]
    fn malformed_node_info_is_an_error_not_a_panic() {
        let m = map(serde_json::json!({ "document_id": "d", "node_index": 0, "chunk_index": 0, "node_info": "{not json" }));
        assert!(matches!(ChunkMetadata::decode(&m), Err(MetadataError::NodeInfo(_))));
        assert_eq!(raw_node_info(&m), Some("{not json"));
    }

    #[test]
    fn negative_index_is_invalid() {
        let m = map(serde_json::json!({ "document_id": "d", "node_index": -1, "chunk_index": 0, "node_info": "{}" }));
        assert!(matches!(ChunkMetadata::decode(&m), Err(MetadataError::Invalid { field: NODE_INDEX, .. })));
    }
}
