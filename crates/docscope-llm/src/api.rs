//! API-based generation and embedding using OpenAI-compatible endpoints.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use docscope_types::ServiceSettings;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::LlmError;
use crate::service::{EmbeddingBatch, Generation, TextEmbedder, TextGenerator};
use crate::template::Prompt;

/// Configuration for the API client.
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,

    /// Chat model (e.g., "gpt-4o-mini")
    pub chat_model: String,

    /// Embedding model (e.g., "text-embedding-3-small")
    pub embedding_model: String,

    /// API key
    pub api_key: SecretString,

    /// Request timeout
    pub timeout: Duration,

    /// Maximum attempts per request
    pub max_retries: u32,

    /// USD per million prompt tokens
    pub input_price_per_million: f64,

    /// USD per million completion tokens
    pub output_price_per_million: f64,
}

impl ApiClientConfig {
    /// Create config for the OpenAI API.
    pub fn openai(api_key: impl Into<String>) -> Self {
        let defaults = ServiceSettings::default();
        Self {
            base_url: defaults.base_url,
            chat_model: defaults.chat_model,
            embedding_model: defaults.embedding_model,
            api_key: SecretString::from(api_key.into()),
            timeout: Duration::from_secs(defaults.timeout_secs),
            max_retries: defaults.max_retries,
            input_price_per_million: 0.0,
            output_price_per_million: 0.0,
        }
    }

    /// Build from loaded settings. The API key must be present.
    pub fn from_settings(settings: &ServiceSettings) -> Result<Self, LlmError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| LlmError::ConfigError("service.api_key is not set".to_string()))?;
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            chat_model: settings.chat_model.clone(),
            embedding_model: settings.embedding_model.clone(),
            api_key: SecretString::from(api_key),
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries.max(1),
            input_price_per_million: settings.input_price_per_million,
            output_price_per_million: settings.output_price_per_million,
        })
    }

    fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 * self.input_price_per_million
            + completion_tokens as f64 * self.output_price_per_million)
            / 1_000_000.0
    }
}

/// OpenAI-compatible client implementing both service traits.
pub struct ApiClient {
    client: Client,
    config: ApiClientConfig,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl ApiClient {
    /// Create a new API client.
    pub fn new(config: ApiClientConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::ConfigError(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Run `op` with exponential backoff. Parse and configuration errors are
    /// not retried.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        };

        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(attempt = attempts, request = what, "Calling API");

            match op().await {
                Ok(response) => return Ok(response),
                Err(e @ (LlmError::ParseError(_) | LlmError::ConfigError(_))) => return Err(e),
                Err(e) => {
                    if attempts >= self.config.max_retries {
                        error!(error = %e, request = what, "Max retries exceeded");
                        return Err(e);
                    }

                    match backoff.next_backoff() {
                        Some(duration) => {
                            warn!(
                                error = %e,
                                retry_in_ms = duration.as_millis(),
                                "API call failed, retrying"
                            );
                            tokio::time::sleep(duration).await;
                        }
                        None => {
                            error!(error = %e, "Backoff exhausted");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> Result<Resp, LlmError> {
        let url = format!("{}/{}", self.config.base_url, endpoint);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        if response.status() == 429 {
            return Err(LlmError::RateLimitExceeded);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))
    }

    async fn chat(&self, prompt: &Prompt) -> Result<Generation, LlmError> {
        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
        }

        #[derive(Serialize)]
        struct ChatMessage<'a> {
            role: &'static str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<ChatChoice>,
            #[serde(default)]
            usage: Usage,
        }

        #[derive(Deserialize)]
        struct ChatChoice {
            message: ChatMessageResponse,
        }

        #[derive(Deserialize)]
        struct ChatMessageResponse {
            content: String,
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &prompt.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &prompt.user,
        });

        let request = ChatRequest {
            model: &self.config.chat_model,
            messages,
        };

        let response: ChatResponse = self.post("chat/completions", &request).await?;
        let text = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::ParseError("No choices in response".to_string()))?;

        Ok(Generation {
            text,
            cost: self
                .config
                .cost(response.usage.prompt_tokens, response.usage.completion_tokens),
        })
    }

    async fn embeddings(&self, texts: &[String]) -> Result<EmbeddingBatch, LlmError> {
        #[derive(Serialize)]
        struct EmbeddingRequest<'a> {
            model: &'a str,
            input: &'a [String],
        }

        #[derive(Deserialize)]
        struct EmbeddingResponse {
            data: Vec<EmbeddingData>,
            #[serde(default)]
            usage: Usage,
        }

        #[derive(Deserialize)]
        struct EmbeddingData {
            index: usize,
            embedding: Vec<f32>,
        }

        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: texts,
        };

        let mut response: EmbeddingResponse = self.post("embeddings", &request).await?;
        if response.data.len() != texts.len() {
            return Err(LlmError::ParseError(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }
        response.data.sort_by_key(|d| d.index);

        Ok(EmbeddingBatch {
            vectors: response.data.into_iter().map(|d| d.embedding).collect(),
            cost: self.config.cost(response.usage.prompt_tokens, 0),
        })
    }
}

#[async_trait]
impl TextGenerator for ApiClient {
    async fn generate(&self, prompt: &Prompt) -> Result<Generation, LlmError> {
        self.with_retry("chat", || self.chat(prompt)).await
    }
}

#[async_trait]
impl TextEmbedder for ApiClient {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch, LlmError> {
        self.with_retry("embeddings", || self.embeddings(texts)).await
    }
}
