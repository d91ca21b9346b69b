//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (nested keys separated by `__`, e.g.
//! `APP_VECTOR_STORE__BATCH_SIZE=25`). Provides a helper to expand `~` and
//! `${VAR}` in configured paths.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::chunker::ChunkerConfig;
use crate::error::ConfigError;
use crate::types::{IndexSpec, Metric};

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name };
        config.validate_for_env()?;
        Ok(config)
    }

    /// Build from an explicit figment, on top of the built-in defaults.
    pub fn from_figment(figment: Figment) -> Self {
        let figment = Figment::from(Serialized::defaults(Settings::default())).merge(figment);
        Self { figment, env_name: "dev".to_string() }
    }

    pub fn env_name(&self) -> &str { &self.env_name }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The full typed settings tree, validated.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self) -> anyhow::Result<()> {
        let settings = self.settings()?;
        check_environment(&self.env_name, &settings, fake_embeddings_forced())
    }
}

/// `APP_USE_FAKE_EMBEDDINGS=1` forces the fake embedder regardless of settings.
pub fn fake_embeddings_forced() -> bool {
    env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Production runs only on the remote embedder and a durable store, whether
/// the fake is selected in settings or forced through the environment.
pub fn check_environment(env_name: &str, settings: &Settings, fake_forced: bool) -> anyhow::Result<()> {
    if let "prod" | "production" = env_name {
        if fake_forced {
            anyhow::bail!("APP_USE_FAKE_EMBEDDINGS is set but fake embeddings are not allowed in production");
        }
        if settings.embedding.provider == EmbeddingProvider::Fake {
            anyhow::bail!("fake embeddings are not allowed in production");
        }
        if settings.vector_store.backend == StoreBackend::Memory {
            anyhow::bail!("the in-memory vector store is not allowed in production");
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkerConfig,
    pub embedding: EmbeddingSettings,
    pub vector_store: VectorStoreSettings,
    pub completion: CompletionSettings,
    pub query: QuerySettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };
        if self.chunking.chunk_size == 0 { return invalid("chunking.chunk_size must be greater than 0".into()); }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return invalid(format!("chunking.chunk_overlap ({}) must be smaller than chunk_size ({})", self.chunking.chunk_overlap, self.chunking.chunk_size));
        }
        if self.embedding.dimension == 0 { return invalid("embedding.dimension must be greater than 0".into()); }
        if self.embedding.concurrency == 0 { return invalid("embedding.concurrency must be greater than 0".into()); }
        if self.vector_store.batch_size == 0 { return invalid("vector_store.batch_size must be greater than 0".into()); }
        let rate = self.vector_store.upserts_per_second;
        if rate.is_nan() || rate.is_infinite() || rate <= 0.0 {
            return invalid(format!("vector_store.upserts_per_second must be positive, got {}", rate));
        }
        if self.vector_store.upsert_burst == 0 { return invalid("vector_store.upsert_burst must be at least 1".into()); }
        if self.query.max_top_k == 0 || self.query.default_top_k == 0 || self.query.default_top_k > self.query.max_top_k {
            return invalid(format!("query.default_top_k ({}) must be within 1..={}", self.query.default_top_k, self.query.max_top_k));
        }
        Ok(())
    }

    /// The index the configured store owns: name and metric from the store
    /// section, width from the embedding model.
    pub fn index_spec(&self) -> IndexSpec {
        IndexSpec::new(self.vector_store.index_name.clone(), self.embedding.dimension, self.vector_store.metric)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Remote,
    Fake,
}

/// What the embedding service does with inputs longer than its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncatePolicy {
    #[default]
    None,
    Start,
    End,
}

impl TruncatePolicy {
    pub fn as_api_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Start => "START",
            Self::End => "END",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub dimension: usize,
    pub truncate: TruncatePolicy,
    pub timeout_secs: u64,
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Remote,
            base_url: "https://integrate.api.nvidia.com/v1".into(),
            model: "nvidia/nv-embedqa-e5-v5".into(),
            api_key: None,
            api_key_env: "NVIDIA_API_KEY".into(),
            dimension: 1024,
            truncate: TruncatePolicy::None,
            timeout_secs: 30,
            concurrency: 4,
            max_retries: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl EmbeddingSettings {
    pub fn api_key(&self) -> Result<String, ConfigError> {
        resolve_credential(self.api_key.as_deref(), "embedding.api_key", &self.api_key_env)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Pinecone,
    #[serde(alias = "lance")]
    Lancedb,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    pub backend: StoreBackend,
    pub index_name: String,
    pub metric: Metric,
    pub batch_size: usize,
    pub upserts_per_second: f64,
    pub upsert_burst: u32,
    pub timeout_secs: u64,
    pub pinecone: PineconeSettings,
    pub lancedb: LanceDbSettings,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Pinecone,
            index_name: "pdf-embeddings".into(),
            metric: Metric::Cosine,
            batch_size: 50,
            upserts_per_second: 2.0,
            upsert_burst: 1,
            timeout_secs: 30,
            pinecone: PineconeSettings::default(),
            lancedb: LanceDbSettings::default(),
        }
    }
}

/// Pinecone control/data plane settings. When both `cloud` and `region` are
/// set the index is created serverless, otherwise as a pod index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PineconeSettings {
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub controller_url: String,
    pub namespace: String,
    pub environment: String,
    pub pod_type: String,
    pub cloud: Option<String>,
    pub region: Option<String>,
    pub ready_timeout_secs: u64,
}

impl Default for PineconeSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: "PINECONE_API_KEY".into(),
            controller_url: "https://api.pinecone.io".into(),
            namespace: String::new(),
            environment: "gcp-starter".into(),
            pod_type: "starter".into(),
            cloud: None,
            region: None,
            ready_timeout_secs: 120,
        }
    }
}

impl PineconeSettings {
    pub fn api_key(&self) -> Result<String, ConfigError> {
        resolve_credential(self.api_key.as_deref(), "vector_store.pinecone.api_key", &self.api_key_env)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanceDbSettings {
    pub uri: String,
}

impl Default for LanceDbSettings {
    fn default() -> Self {
        Self { uri: "~/.local/share/docrag/lancedb".into() }
    }
}

impl LanceDbSettings {
    /// `uri` with `~` and environment variables expanded.
    pub fn resolved_uri(&self) -> PathBuf { expand_path(&self.uri) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
    pub max_context_chars: usize,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            base_url: "https://integrate.api.nvidia.com/v1".into(),
            model: "mistralai/mixtral-8x7b-instruct-v0.1".into(),
            api_key: None,
            api_key_env: "NVIDIA_API_KEY".into(),
            temperature: 0.3,
            max_tokens: 1000,
            timeout_secs: 60,
            max_context_chars: 12_000,
        }
    }
}

impl CompletionSettings {
    pub fn api_key(&self) -> Result<String, ConfigError> {
        resolve_credential(self.api_key.as_deref(), "completion.api_key", &self.api_key_env)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub default_top_k: usize,
    pub max_top_k: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self { default_top_k: 5, max_top_k: 10 }
    }
}

/// An explicitly configured key wins; otherwise the named environment variable.
fn resolve_credential(explicit: Option<&str>, key: &str, env_var: &str) -> Result<String, ConfigError> {
    if let Some(k) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(k.to_string());
    }
    match env::var(env_var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::MissingCredential { key: key.to_string(), env: env_var.to_string() }),
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
