//! docrag-llm
//!
//! Client for OpenAI-compatible `chat/completions` endpoints.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use docrag_core::config::CompletionSettings;
use docrag_core::{CompletionModel, CompletionRequest, SynthesisError};

pub struct ChatCompletionClient {
    client: Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl ChatCompletionClient {
    pub fn new(api_key: &str, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing completion API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing completion model name");
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&auth).context("invalid completion API key")?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to build completion HTTP client")?;
        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        Ok(Self { client, endpoint, model: model.to_string(), timeout })
    }

    pub fn from_settings(settings: &CompletionSettings) -> Result<Self> {
        let api_key = settings.api_key()?;
        Self::new(&api_key, &settings.base_url, &settings.model, Duration::from_secs(settings.timeout_secs))
    }

    async fn send(&self, request: &CompletionRequest<'_>) -> Result<String, SynthesisError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: vec![
                ChatMessage { role: "system", content: request.system },
                ChatMessage { role: "user", content: request.prompt },
            ],
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthesisError::Transport(e.to_string()))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| SynthesisError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(SynthesisError::Status { status: status.as_u16(), body: text.chars().take(512).collect() });
        }
        parse_completion(&text)
    }
}

#[async_trait]
impl CompletionModel for ChatCompletionClient {
    fn model_id(&self) -> &str { &self.model }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, SynthesisError> {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(SynthesisError::Timeout(self.timeout)),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(answer) => debug!(model = %self.model, prompt_chars = request.prompt.chars().count(), answer_chars = answer.chars().count(), elapsed_ms, "completion finished"),
            Err(e) => warn!(model = %self.model, elapsed_ms, error = %e, "completion failed"),
        }
        result
    }
}

/// Text of the first choice. An empty or missing message is an error, not an
/// empty answer.
pub fn parse_completion(body: &str) -> Result<String, SynthesisError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| SynthesisError::Malformed(format!("invalid completion response: {}", e)))?;
    let answer = parsed
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();
    if answer.is_empty() {
        return Err(SynthesisError::Malformed("completion contained no text".into()));
    }
    Ok(answer)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_choice_text_is_trimmed() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"  Revenue grew 12%.\n"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "Revenue grew 12%.");
    }

    #[test]
    fn empty_completion_is_malformed() {
        for body in [r#"{"choices":[]}"#, r#"{"choices":[{"message":{"content":"  "}}]}"#, r#"{"choices":[{"message":{"content":null}}]}"#, "<html>"] {
            assert!(matches!(parse_completion(body), Err(SynthesisError::Malformed(_))), "{}", body);
        }
    }
}
