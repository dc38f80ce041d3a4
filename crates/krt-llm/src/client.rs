//! LLM client implementations
//!
//! OpenAI-compatible chat completions, Ollama and Anthropic messages APIs.
//! Every failure is classified into an `ExtractionError` kind so the batch
//! orchestrator can decide whether to retry.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use krt_core::{ExtractionError, KrtError, LlmConfig, LlmProvider};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A text-completion backend
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a prompt given a system instruction
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ExtractionError>;

    /// Model identifier, for logs
    fn model(&self) -> &str;
}

// ============================================================================
// Failure classification
// ============================================================================

/// Map a non-success HTTP status to an extraction failure
pub fn classify_status(provider: &str, status: StatusCode, body: &str) -> ExtractionError {
    let message = format!("{provider} returned {status}: {}", truncate(body, 300));
    match status {
        StatusCode::TOO_MANY_REQUESTS => ExtractionError::rate_limited(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ExtractionError::timeout(message)
        }
        _ => ExtractionError::provider(message),
    }
}

/// Map a transport error (connect, timeout, body read) to an extraction failure
pub fn classify_transport(provider: &str, err: &reqwest::Error) -> ExtractionError {
    if err.is_timeout() {
        ExtractionError::timeout(format!("{provider} request timed out: {err}"))
    } else if err.is_decode() {
        ExtractionError::malformed(format!("{provider} response could not be decoded: {err}"))
    } else {
        ExtractionError::provider(format!("{provider} request failed: {err}"))
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

async fn send_json<T: for<'de> Deserialize<'de>>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, ExtractionError> {
    let response = request
        .send()
        .await
        .map_err(|e| classify_transport(provider, &e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(provider, status, &body));
    }

    let body = response
        .text()
        .await
        .map_err(|e| classify_transport(provider, &e))?;
    serde_json::from_str(&body).map_err(|e| {
        ExtractionError::malformed(format!("{provider} response is not the expected JSON: {e}"))
    })
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    role: String,
    content: String,
}

impl Message {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

// ============================================================================
// OpenAI Client
// ============================================================================

/// OpenAI (or any OpenAI-compatible) chat completions client
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            model: model.into(),
            max_tokens,
            temperature,
        }
    }

    /// Create from config. Compatible endpoints without auth may omit the key
    /// when a base URL is given.
    pub fn from_config(config: &LlmConfig) -> Result<Self, KrtError> {
        let api_key = match (&config.api_key, &config.base_url) {
            (Some(key), _) => key.clone(),
            (None, Some(_)) => String::new(),
            (None, None) => {
                return Err(KrtError::Config("OpenAI API key required".to_string()));
            }
        };

        let client = Self::new(api_key, &config.model, config.max_tokens, config.temperature);
        Ok(match &config.base_url {
            Some(url) => client.with_base_url(url),
            None => client,
        })
    }

    /// Set custom base URL (DeepSeek, Grok, vLLM, Ollama's /v1, ...)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ExtractionError> {
        let request = OpenAiRequest {
            model: self.model.clone(),
            messages: vec![Message::new("system", system), Message::new("user", prompt)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let result: OpenAiResponse = send_json("OpenAI", builder).await?;
        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ExtractionError::malformed("OpenAI returned no choices"))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Ollama Client
// ============================================================================

/// Ollama generate API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    system: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature: 0.1,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        let base_url = config.base_url.as_deref().unwrap_or(OLLAMA_BASE_URL);
        let mut client = Self::new(base_url, &config.model);
        client.temperature = config.temperature;
        client
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ExtractionError> {
        let request = OllamaRequest {
            model: self.model.clone(),
            system: system.to_string(),
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        let builder = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request);

        let result: OllamaResponse = send_json("Ollama", builder).await?;
        Ok(result.response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Anthropic Client
// ============================================================================

/// Anthropic messages API client
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    system: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            model: model.into(),
            max_tokens,
            temperature: 0.1,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, KrtError> {
        let api_key = config
            .api_key
            .as_ref()
            .ok_or_else(|| KrtError::Config("Anthropic API key required".to_string()))?;

        let mut client = Self::new(api_key, &config.model, config.max_tokens);
        client.temperature = config.temperature;
        if let Some(url) = &config.base_url {
            client.base_url = url.trim_end_matches('/').to_string();
        }
        Ok(client)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ExtractionError> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            system: system.to_string(),
            messages: vec![Message::new("user", prompt)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let builder = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request);

        let result: AnthropicResponse = send_json("Anthropic", builder).await?;
        let text: Vec<String> = result
            .content
            .into_iter()
            .filter(|block| block.kind == "text" && !block.text.is_empty())
            .map(|block| block.text)
            .collect();

        if text.is_empty() {
            return Err(ExtractionError::malformed("Anthropic returned no text content"));
        }
        Ok(text.join("\n"))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an LLM client from config
pub fn create_llm_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>, KrtError> {
    match config.provider {
        LlmProvider::OpenAI => Ok(Box::new(OpenAiClient::from_config(config)?)),
        LlmProvider::Ollama => Ok(Box::new(OllamaClient::from_config(config))),
        LlmProvider::Anthropic => Ok(Box::new(AnthropicClient::from_config(config)?)),
    }
}
