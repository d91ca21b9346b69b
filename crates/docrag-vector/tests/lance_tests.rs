use std::time::Duration;

use docrag_core::{Chunk, ChunkMetadata, DocumentNode, IndexSpec, Metric, MetadataFilter, VectorRecord, VectorStore};
use docrag_vector::LanceDbStore;

fn record(doc: &str, node: usize, chunk: usize, vector: Vec<f32>) -> VectorRecord {
    let node_data = DocumentNode::text("n").with_page(node as u32 + 1);
    let meta = ChunkMetadata::new(doc, node, &node_data, &Chunk { index: chunk, text: format!("{} chunk {}", doc, chunk) });
    VectorRecord { id: meta.record_id(), vector, metadata: meta.to_metadata() }
}

async fn open(uri: &str, dim: usize) -> LanceDbStore {
    LanceDbStore::connect(uri, IndexSpec::new("pdf_embeddings", dim, Metric::Cosine), Duration::from_secs(30))
        .await
        .expect("connect")
}

#[tokio::test]
async fn upsert_search_and_filter_on_disk() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let uri = tmp.path().to_string_lossy().to_string();
    let store = open(&uri, 4).await;
    store.ensure_index().await?;
    store.ensure_index().await?;

    store
        .upsert(&[
            record("doc1", 0, 0, vec![1.0, 0.0, 0.0, 0.0]),
            record("doc1", 0, 1, vec![0.0, 1.0, 0.0, 0.0]),
            record("doc2", 0, 0, vec![0.9, 0.1, 0.0, 0.0]),
        ])
        .await?;
    // same ids again: overwrite, not append
    store.upsert(&[record("doc1", 0, 1, vec![0.0, 1.0, 0.0, 0.0])]).await?;

    let all = store.query(&[1.0, 0.0, 0.0, 0.0], 10, None).await?;
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, "doc1_node0_chunk0");
    assert!(all.windows(2).all(|w| w[0].score >= w[1].score));

    let scoped = store.query(&[1.0, 0.0, 0.0, 0.0], 10, Some(&MetadataFilter::document("doc1"))).await?;
    assert_eq!(scoped.len(), 2);
    assert!(scoped.iter().all(|m| m.metadata["document_id"] == "doc1"));
    assert!(scoped[0].metadata.contains_key("node_info"));

    let top1 = store.query(&[0.0, 1.0, 0.0, 0.0], 1, None).await?;
    assert_eq!(top1.len(), 1);
    assert_eq!(top1[0].id, "doc1_node0_chunk1");
    Ok(())
}

#[tokio::test]
async fn existing_table_with_other_width_fails_provisioning() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let uri = tmp.path().to_string_lossy().to_string();
    open(&uri, 4).await.ensure_index().await?;

    let err = open(&uri, 8).await.ensure_index().await.unwrap_err();
    assert_eq!(err.index, "pdf_embeddings");
    assert!(err.message.contains("width"));
    Ok(())
}
