use docrag_core::{ChunkMetadata, Chunk, DocumentNode, IndexSpec, Metric, MetadataFilter, StoreError, VectorRecord, VectorStore};
use docrag_vector::MemoryStore;

fn record(doc: &str, node: usize, chunk: usize, vector: Vec<f32>) -> VectorRecord {
    let meta = ChunkMetadata::new(doc, node, &DocumentNode::text("n"), &Chunk { index: chunk, text: format!("{} {}", doc, chunk) });
    VectorRecord { id: meta.record_id(), vector, metadata: meta.to_metadata() }
}

fn store() -> MemoryStore {
    MemoryStore::new(IndexSpec::new("test", 3, Metric::Cosine))
}

#[tokio::test]
async fn upsert_overwrites_by_id() {
    let s = store();
    s.ensure_index().await.expect("ensure");
    s.upsert(&[record("doc1", 0, 0, vec![1.0, 0.0, 0.0])]).await.unwrap();
    s.upsert(&[record("doc1", 0, 0, vec![0.0, 1.0, 0.0])]).await.unwrap();
    assert_eq!(s.len().await, 1);
    assert_eq!(s.get("doc1_node0_chunk0").await.unwrap().vector, vec![0.0, 1.0, 0.0]);
}

#[tokio::test]
async fn query_orders_by_similarity_and_respects_top_k() {
    let s = store();
    s.upsert(&[
        record("doc1", 0, 0, vec![0.0, 1.0, 0.0]),
        record("doc1", 0, 1, vec![1.0, 0.0, 0.0]),
        record("doc1", 0, 2, vec![0.7, 0.7, 0.0]),
    ])
    .await
    .unwrap();

    let hits = s.query(&[1.0, 0.0, 0.0], 2, None).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "doc1_node0_chunk1");
    assert_eq!(hits[1].id, "doc1_node0_chunk2");
    assert!(hits[0].score >= hits[1].score);
}

#[tokio::test]
async fn filter_restricts_to_one_document() {
    let s = store();
    s.upsert(&[
        record("doc1", 0, 0, vec![1.0, 0.0, 0.0]),
        record("doc2", 0, 0, vec![1.0, 0.0, 0.0]),
        record("doc1", 1, 0, vec![0.5, 0.5, 0.0]),
    ])
    .await
    .unwrap();

    let hits = s.query(&[1.0, 0.0, 0.0], 5, Some(&MetadataFilter::document("doc1"))).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.metadata["document_id"] == "doc1"));
}

#[tokio::test]
async fn wrong_dimension_is_rejected() {
    let s = store();
    let err = s.upsert(&[record("doc1", 0, 0, vec![1.0, 0.0])]).await.unwrap_err();
    assert!(matches!(err, StoreError::Dimension { expected: 3, actual: 2 }));
    assert!(s.is_empty().await);
}
