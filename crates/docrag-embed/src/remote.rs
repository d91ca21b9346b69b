//! Client for OpenAI-compatible `embeddings` endpoints.
//!
//! Sends one text per request with the retrieval extensions the NVIDIA models
//! understand (`input_type`, `truncate`). Every call is bounded by a timeout;
//! retries are left to the caller.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use docrag_core::config::{EmbeddingSettings, TruncatePolicy};
use docrag_core::{Embedder, EmbeddingMode, EmbeddingServiceError, EmbeddingVector};

const MAX_ERROR_BODY: usize = 512;

#[derive(Clone)]
pub struct RemoteEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimension: usize,
    truncate: TruncatePolicy,
    timeout: Duration,
}

impl RemoteEmbedder {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        dimension: usize,
        truncate: TruncatePolicy,
        timeout: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing embedding API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&auth).context("invalid embedding API key")?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to build embedding HTTP client")?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        Ok(Self { client, endpoint, model: model.to_string(), dimension, truncate, timeout })
    }

    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let api_key = settings.api_key()?;
        Self::new(
            &api_key,
            &settings.base_url,
            &settings.model,
            settings.dimension,
            settings.truncate,
            Duration::from_secs(settings.timeout_secs),
        )
    }

    async fn send(&self, text: &str, mode: EmbeddingMode) -> Result<EmbeddingVector, EmbeddingServiceError> {
        let request = EmbeddingRequest {
            input: [text],
            model: &self.model,
            input_type: mode.as_str(),
            encoding_format: "float",
            truncate: self.truncate.as_api_str(),
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingServiceError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| EmbeddingServiceError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(EmbeddingServiceError::Status { status: status.as_u16(), body: clip(body) });
        }
        parse_embedding_response(&body, self.dimension)
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn model_id(&self) -> &str { &self.model }

    fn dim(&self) -> usize { self.dimension }

    async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<EmbeddingVector, EmbeddingServiceError> {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.send(text, mode)).await {
            Ok(result) => result,
            Err(_) => Err(EmbeddingServiceError::Timeout(self.timeout)),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => debug!(model = %self.model, mode = mode.as_str(), input_chars = text.chars().count(), elapsed_ms, "embedded text"),
            Err(e) => warn!(model = %self.model, mode = mode.as_str(), elapsed_ms, error = %e, "embedding request failed"),
        }
        result
    }
}

/// Extract the single embedding from an `embeddings` response body, checking
/// that it is present, non-empty and `expected_dim` wide.
pub fn parse_embedding_response(body: &str, expected_dim: usize) -> Result<EmbeddingVector, EmbeddingServiceError> {
    let mut parsed: EmbeddingResponse =
        serde_json::from_str(body).map_err(|e| EmbeddingServiceError::Malformed(format!("invalid JSON: {}", e)))?;
    parsed.data.sort_by_key(|entry| entry.index);
    let entry = parsed
        .data
        .into_iter()
        .next()
        .ok_or_else(|| EmbeddingServiceError::Malformed("response contained no embeddings".into()))?;
    if entry.embedding.is_empty() {
        return Err(EmbeddingServiceError::Malformed("empty embedding vector".into()));
    }
    if entry.embedding.len() != expected_dim {
        return Err(EmbeddingServiceError::Malformed(format!(
            "expected {} dimensions, got {}",
            expected_dim,
            entry.embedding.len()
        )));
    }
    Ok(entry.embedding)
}

fn clip(mut body: String) -> String {
    if let Some((idx, _)) = body.char_indices().nth(MAX_ERROR_BODY) {
        body.truncate(idx);
        body.push_str("...");
    }
    body
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: [&'a str; 1],
    model: &'a str,
    input_type: &'static str,
    encoding_format: &'static str,
    truncate: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}
