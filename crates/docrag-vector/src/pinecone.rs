//! Pinecone REST backend.
//!
//! The control plane (`/indexes`) lists, creates and describes the index; the
//! data-plane host it reports is resolved once and cached. Every request is
//! bounded by the configured timeout.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use docrag_core::config::{PineconeSettings, VectorStoreSettings};
use docrag_core::{Condition, IndexSpec, Metadata, MetadataFilter, ProvisioningError, ScoredMatch, StoreError, VectorRecord, VectorStore};

const API_VERSION: &str = "2024-07";
const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Where a newly created index lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deployment {
    Pod { environment: String, pod_type: String },
    Serverless { cloud: String, region: String },
}

impl Deployment {
    fn from_settings(settings: &PineconeSettings) -> Self {
        match (&settings.cloud, &settings.region) {
            (Some(cloud), Some(region)) => Self::Serverless { cloud: cloud.clone(), region: region.clone() },
            _ => Self::Pod { environment: settings.environment.clone(), pod_type: settings.pod_type.clone() },
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Pod { environment, pod_type } => json!({ "pod": { "environment": environment, "pod_type": pod_type, "pods": 1 } }),
            Self::Serverless { cloud, region } => json!({ "serverless": { "cloud": cloud, "region": region } }),
        }
    }
}

pub struct PineconeStore {
    client: Client,
    spec: IndexSpec,
    controller_url: String,
    namespace: String,
    deployment: Deployment,
    timeout: Duration,
    ready_timeout: Duration,
    host: OnceCell<String>,
}

impl PineconeStore {
    pub fn new(
        api_key: &str,
        spec: IndexSpec,
        controller_url: &str,
        namespace: &str,
        deployment: Deployment,
        timeout: Duration,
        ready_timeout: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Pinecone API key");
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("api-key"), HeaderValue::from_str(api_key.trim()).context("invalid Pinecone API key")?);
        headers.insert(HeaderName::from_static("x-pinecone-api-version"), HeaderValue::from_static(API_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder().default_headers(headers).build().context("failed to build Pinecone HTTP client")?;
        Ok(Self {
            client,
            spec,
            controller_url: controller_url.trim_end_matches('/').to_string(),
            namespace: namespace.to_string(),
            deployment,
            timeout,
            ready_timeout,
            host: OnceCell::new(),
        })
    }

    pub fn from_settings(spec: IndexSpec, settings: &VectorStoreSettings) -> Result<Self> {
        let pc = &settings.pinecone;
        let api_key = pc.api_key()?;
        Self::new(
            &api_key,
            spec,
            &pc.controller_url,
            &pc.namespace,
            Deployment::from_settings(pc),
            Duration::from_secs(settings.timeout_secs),
            Duration::from_secs(pc.ready_timeout_secs),
        )
    }

    async fn call(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value, StoreError> {
        let send = async {
            let mut req = self.client.request(method, url);
            if let Some(b) = body { req = req.json(b); }
            let resp = req.send().await.map_err(|e| StoreError::Backend(e.to_string()))?;
            let status = resp.status();
            let text = resp.text().await.map_err(|e| StoreError::Backend(e.to_string()))?;
            if !status.is_success() {
                return Err(StoreError::Status { status: status.as_u16(), body: text.chars().take(512).collect() });
            }
            if text.trim().is_empty() { return Ok(Value::Null); }
            serde_json::from_str(&text).map_err(|e| StoreError::Backend(format!("invalid JSON from Pinecone: {}", e)))
        };
        match tokio::time::timeout(self.timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    pub async fn list_indexes(&self) -> Result<Vec<String>, StoreError> {
        let v = self.call(Method::GET, &format!("{}/indexes", self.controller_url), None).await?;
        let list: IndexList = serde_json::from_value(v).map_err(|e| StoreError::Backend(format!("unexpected index list: {}", e)))?;
        Ok(list.indexes.into_iter().map(|i| i.name).collect())
    }

    pub async fn describe_index(&self) -> Result<IndexDescription, StoreError> {
        let v = self.call(Method::GET, &format!("{}/indexes/{}", self.controller_url, self.spec.name), None).await?;
        serde_json::from_value(v).map_err(|e| StoreError::Backend(format!("unexpected index description: {}", e)))
    }

    async fn create_index(&self) -> Result<(), StoreError> {
        let body = json!({
            "name": self.spec.name,
            "dimension": self.spec.dimension,
            "metric": self.spec.metric.as_str(),
            "spec": self.deployment.to_json(),
        });
        match self.call(Method::POST, &format!("{}/indexes", self.controller_url), Some(&body)).await {
            Ok(_) => Ok(()),
            // created concurrently by another process
            Err(StoreError::Status { status: 409, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn wait_until_ready(&self) -> Result<IndexDescription, StoreError> {
        let deadline = Instant::now() + self.ready_timeout;
        loop {
            let desc = self.describe_index().await?;
            if desc.status.ready { return Ok(desc); }
            if Instant::now() >= deadline {
                return Err(StoreError::Backend(format!("index not ready after {:?} (state {})", self.ready_timeout, desc.status.state)));
            }
            debug!(index = %self.spec.name, state = %desc.status.state, "waiting for index");
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn host(&self) -> Result<&str, StoreError> {
        let host = self
            .host
            .get_or_try_init(|| async {
                let desc = self.describe_index().await?;
                Ok::<_, StoreError>(data_plane_url(&desc.host))
            })
            .await?;
        Ok(host.as_str())
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    fn spec(&self) -> &IndexSpec { &self.spec }

    async fn ensure_index(&self) -> Result<(), ProvisioningError> {
        let fail = |e: StoreError| ProvisioningError::new(&self.spec.name, e);
        let existing = self.list_indexes().await.map_err(fail)?;
        if existing.iter().any(|n| n == &self.spec.name) {
            debug!(index = %self.spec.name, "index already exists");
        } else {
            info!(index = %self.spec.name, dimension = self.spec.dimension, metric = self.spec.metric.as_str(), "creating index");
            self.create_index().await.map_err(fail)?;
        }
        let desc = self.wait_until_ready().await.map_err(fail)?;
        if desc.dimension != self.spec.dimension {
            return Err(ProvisioningError::new(
                &self.spec.name,
                format!("existing index has dimension {}, expected {}", desc.dimension, self.spec.dimension),
            ));
        }
        // OnceCell::set fails only if the host was already resolved
        let _ = self.host.set(data_plane_url(&desc.host));
        Ok(())
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), StoreError> {
        if records.is_empty() { return Ok(()); }
        if let Some(r) = records.iter().find(|r| r.vector.len() != self.spec.dimension) {
            return Err(StoreError::Dimension { expected: self.spec.dimension, actual: r.vector.len() });
        }
        let vectors: Vec<Value> = records.iter().map(|r| json!({ "id": r.id, "values": r.vector, "metadata": r.metadata })).collect();
        let body = json!({ "vectors": vectors, "namespace": self.namespace });
        let url = format!("{}/vectors/upsert", self.host().await?);
        let resp = self.call(Method::POST, &url, Some(&body)).await?;
        // a batch is all or nothing
        if let Some(n) = resp.get("upsertedCount").and_then(Value::as_u64) {
            if n as usize != records.len() {
                warn!(index = %self.spec.name, sent = records.len(), upserted = n, "partial upsert");
                return Err(StoreError::Backend(format!("upserted {} of {} records", n, records.len())));
            }
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<ScoredMatch>, StoreError> {
        if vector.len() != self.spec.dimension {
            return Err(StoreError::Dimension { expected: self.spec.dimension, actual: vector.len() });
        }
        let mut body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
            "namespace": self.namespace,
        });
        if let Some(f) = filter.filter(|f| !f.is_empty()) {
            body["filter"] = pinecone_filter(f);
        }
        let url = format!("{}/query", self.host().await?);
        let resp = self.call(Method::POST, &url, Some(&body)).await?;
        let parsed: QueryResponse = serde_json::from_value(resp).map_err(|e| StoreError::Backend(format!("unexpected query response: {}", e)))?;
        let mut matches: Vec<ScoredMatch> = parsed
            .matches
            .into_iter()
            .map(|m| ScoredMatch { id: m.id, score: m.score, metadata: m.metadata.unwrap_or_default() })
            .collect();
        matches.truncate(top_k);
        Ok(matches)
    }
}

/// Pinecone's filter language: one `{field: {$op: value}}` object per
/// condition, combined with `$and` when there is more than one.
pub fn pinecone_filter(filter: &MetadataFilter) -> Value {
    let mut clauses: Vec<Value> = filter
        .conditions()
        .iter()
        .map(|(field, condition)| {
            let (op, value) = match condition {
                Condition::Eq(v) => ("$eq", v.clone()),
                Condition::Ne(v) => ("$ne", v.clone()),
                Condition::In(vs) => ("$in", Value::Array(vs.clone())),
                Condition::Gt(n) => ("$gt", json!(n)),
                Condition::Gte(n) => ("$gte", json!(n)),
                Condition::Lt(n) => ("$lt", json!(n)),
                Condition::Lte(n) => ("$lte", json!(n)),
            };
            let mut inner = Map::new();
            inner.insert(op.to_string(), value);
            let mut outer = Map::new();
            outer.insert(field.clone(), Value::Object(inner));
            Value::Object(outer)
        })
        .collect();
    match clauses.len() {
        1 => clauses.remove(0),
        _ => json!({ "$and": clauses }),
    }
}

fn data_plane_url(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", host.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexName>,
}

#[derive(Debug, Deserialize)]
struct IndexName {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    pub dimension: usize,
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub status: IndexStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Metadata>,
}
