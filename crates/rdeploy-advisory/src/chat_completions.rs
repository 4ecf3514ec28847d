//! OpenAI-compatible chat-completions backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use rdeploy_config::AdvisoryConfig;
use rdeploy_utils::error::AdvisoryError;

use crate::http_client::HttpClient;
use crate::types::AdvisoryBackend;

const SYSTEM_PROMPT: &str = "You help operators recover failed service deployments driven by \
docker compose. Reply with one short, concrete remedy (at most three sentences). Do not \
restate the error.";

const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Backend for any `/chat/completions` endpoint (OpenAI, OpenRouter, local gateways).
#[derive(Clone)]
pub struct ChatCompletionsBackend {
    client: HttpClient,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl ChatCompletionsBackend {
    /// # Errors
    ///
    /// Returns `AdvisoryError::Misconfiguration` if the HTTP client cannot be constructed
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, AdvisoryError> {
        Ok(Self {
            client: HttpClient::new()?,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
            timeout,
        })
    }

    /// Build from `[advisory]`, reading the key from the variable named by `api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns `AdvisoryError::Misconfiguration` if:
    /// - The API key environment variable is not set or empty
    /// - The HTTP client cannot be constructed
    pub fn new_from_config(config: &AdvisoryConfig) -> Result<Self, AdvisoryError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AdvisoryError::Misconfiguration(format!(
                    "advisory API key not found in environment variable '{}'. \
                     Set it, or set [advisory] enabled = false.",
                    config.api_key_env
                ))
            })?;

        Self::new(
            config.endpoint.clone(),
            api_key,
            config.model.clone(),
            config.max_tokens,
            config.timeout(),
        )
    }

    fn request_body(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: DEFAULT_TEMPERATURE,
            stream: false,
        }
    }
}

#[async_trait]
impl AdvisoryBackend for ChatCompletionsBackend {
    fn name(&self) -> &str {
        "chat-completions"
    }

    async fn complete(&self, prompt: &str) -> Result<String, AdvisoryError> {
        debug!(
            provider = self.name(),
            model = %self.model,
            max_tokens = self.max_tokens,
            timeout_secs = self.timeout.as_secs(),
            "Requesting advisory remedy"
        );

        let request = reqwest::Client::new()
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt));

        let response = self
            .client
            .execute_with_retry(request, self.timeout, self.name())
            .await?;

        let body: ChatResponse = response.json().await.map_err(|e| {
            AdvisoryError::Transport(format!("Failed to parse advisory response: {e}"))
        })?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(AdvisoryError::EmptyResponse);
        }
        Ok(text)
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
