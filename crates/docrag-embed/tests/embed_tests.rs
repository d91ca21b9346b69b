use std::time::Duration;

use docrag_testkit::{embedding_body, serve, Reply};
use docrag_core::config::{EmbeddingProvider, EmbeddingSettings, TruncatePolicy};
use docrag_core::{Embedder, EmbeddingMode, EmbeddingServiceError};
use docrag_embed::{get_default_embedder, FakeEmbedder, RemoteEmbedder};

fn remote(url: &str, dim: usize, timeout: Duration) -> RemoteEmbedder {
    RemoteEmbedder::new("test-key", url, "nvidia/nv-embedqa-e5-v5", dim, TruncatePolicy::None, timeout).expect("client")
}

#[tokio::test]
async fn fake_embedder_shapes_and_determinism() {
    let embedder = FakeEmbedder::new(1024);
    let v1 = embedder.embed("hello world", EmbeddingMode::Passage).await.expect("embed");
    let v2 = embedder.embed("hello world", EmbeddingMode::Query).await.expect("embed");

    assert_eq!(v1.len(), 1024, "embedding dim is 1024");
    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[tokio::test]
async fn fake_embedder_prefers_shared_words() {
    let embedder = FakeEmbedder::new(256);
    let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
    let query = embedder.embed_sync("What was the revenue growth?");
    let related = embedder.embed_sync("Revenue growth was 12% this quarter.");
    let unrelated = embedder.embed_sync("The cafeteria menu changes weekly.");
    assert!(dot(&query, &related) > dot(&query, &unrelated));
}

#[tokio::test]
async fn settings_select_the_fake_provider() {
    let settings = EmbeddingSettings { provider: EmbeddingProvider::Fake, dimension: 32, ..EmbeddingSettings::default() };
    let embedder = get_default_embedder(&settings).expect("embedder");
    assert_eq!(embedder.dim(), 32);
    assert_eq!(embedder.embed("abc", EmbeddingMode::Query).await.expect("embed").len(), 32);
}

#[tokio::test]
async fn remote_embedder_sends_mode_and_parses_vector() {
    let server = serve(vec![Reply::Json(200, embedding_body(&[0.1, 0.2, 0.3]))]).await;
    let embedder = remote(&server.url, 3, Duration::from_secs(5));

    let v = embedder.embed("what is X?", EmbeddingMode::Query).await.expect("embed");
    assert_eq!(v, vec![0.1, 0.2, 0.3]);

    let requests = server.recorded();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].head.starts_with("post /embeddings"));
    assert!(requests[0].head.contains("authorization: bearer test-key"));
    let body: serde_json::Value = serde_json::from_str(&requests[0].body).expect("json body");
    assert_eq!(body["input_type"], "query");
    assert_eq!(body["truncate"], "NONE");
    assert_eq!(body["model"], "nvidia/nv-embedqa-e5-v5");
}

#[tokio::test]
async fn remote_embedder_reports_status_and_retryability() {
    let server = serve(vec![
        Reply::Json(429, r#"{"error":"rate limited"}"#.into()),
        Reply::Json(400, r#"{"error":"bad input"}"#.into()),
    ])
    .await;
    let embedder = remote(&server.url, 3, Duration::from_secs(5));

    let err = embedder.embed("a", EmbeddingMode::Passage).await.unwrap_err();
    assert!(matches!(err, EmbeddingServiceError::Status { status: 429, .. }));
    assert!(err.is_retryable());

    let err = embedder.embed("a", EmbeddingMode::Passage).await.unwrap_err();
    assert!(matches!(err, EmbeddingServiceError::Status { status: 400, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn remote_embedder_rejects_wrong_width() {
    let server = serve(vec![Reply::Json(200, embedding_body(&[0.1, 0.2]))]).await;
    let err = remote(&server.url, 1024, Duration::from_secs(5)).embed("a", EmbeddingMode::Passage).await.unwrap_err();
    assert!(matches!(err, EmbeddingServiceError::Malformed(_)));
}

#[tokio::test]
async fn remote_embedder_times_out() {
    let server = serve(vec![Reply::Stall(Duration::from_secs(3))]).await;
    let err = remote(&server.url, 3, Duration::from_millis(200)).embed("a", EmbeddingMode::Passage).await.unwrap_err();
    assert!(matches!(err, EmbeddingServiceError::Timeout(_)));
    assert!(err.is_retryable());
}
