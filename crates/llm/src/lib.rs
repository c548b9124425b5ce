pub mod handle;
pub mod prompt;
pub mod reply;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub use handle::{ModelHandle, RetryPolicy};
pub use prompt::{PromptBindings, PromptError, PromptTemplate, Slot};
pub use reply::{ModelReply, strip_thinking};

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider response missing completion text: {0}")]
    EmptyResponse(String),
    #[error("API key missing: set {0}")]
    MissingApiKey(String),
    #[error("model unavailable: {0}")]
    Unavailable(String),
}

impl LlmError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Timeout(_) => true,
            LlmError::Transport(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            LlmError::Status { status, .. } => *status == 429 || *status >= 500,
            LlmError::EmptyResponse(_) | LlmError::MissingApiKey(_) => false,
            LlmError::Unavailable(_) => true,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            LlmError::Timeout(_) => true,
            LlmError::Transport(err) => err.is_timeout(),
            _ => false,
        }
    }
}

// ── Model abstraction ────────────────────────────────────────────────────────

/// One completion request.  Clients are model-agnostic; the model name and
/// sampling temperature travel with each request.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAiCompatible,
}

impl Provider {
    /// Accepts the provider names used in config files.  Groq and OpenRouter
    /// both speak the OpenAI chat-completions protocol.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ollama" => Some(Provider::Ollama),
            "openai" | "openai-compatible" | "groq" | "openrouter" => {
                Some(Provider::OpenAiCompatible)
            }
            _ => None,
        }
    }
}

// ── Ollama ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Names of the models installed on the Ollama server.
    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(6))
            .send()
            .await?;
        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        let mut models = body
            .get("models")
            .and_then(|models| models.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("name").and_then(|name| name.as_str()))
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        models.sort();
        models.dedup();
        Ok(models)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new("http://localhost:11434")
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, LlmError> {
        let endpoint = format!("{}/api/generate", self.base_url);
        let payload = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": { "temperature": request.temperature }
        });

        let response = self.client.post(endpoint).json(&payload).send().await?;
        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        body.get("response")
            .and_then(|value| value.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| LlmError::EmptyResponse(body.to_string()))
    }
}

// ── OpenAI-compatible (Groq, OpenRouter, ...) ────────────────────────────────

#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl OpenAiCompatClient {
    /// `api_key_env` is only used to name the variable in the error raised
    /// when no key is configured.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        api_key_env: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            api_key_env: api_key_env.into(),
        }
    }

    /// Reads the key from `api_key_env`.
    pub fn from_env(base_url: impl Into<String>, api_key_env: &str) -> Self {
        Self::new(base_url, std::env::var(api_key_env).ok(), api_key_env)
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, LlmError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(LlmError::MissingApiKey(self.api_key_env.clone()));
        };

        let payload = json!({
            "model": request.model,
            "temperature": request.temperature,
            "messages": [
                {"role": "user", "content": request.prompt}
            ]
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        body.get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| LlmError::EmptyResponse(body.to_string()))
    }
}

// ── Structured output extraction ──────────────────────────────────────────────

/// Extract the first valid JSON fenced code block from an LLM response.
///
/// Looks for ` ```json\n...\n` ``` ` delimiters first, then falls back to the
/// span between the first `{` and the last `}`.  Returns `None` when neither
/// parses.
pub fn extract_json_output<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
    if let Some(fence_start) = response.find("```json") {
        let after_fence = &response[fence_start + "```json".len()..];
        if let Some(json_start) = after_fence.find(|c: char| !c.is_whitespace()) {
            let json_body = &after_fence[json_start..];
            if let Some(fence_end) = json_body.find("```") {
                let json_str = json_body[..fence_end].trim();
                if let Ok(val) = serde_json::from_str(json_str) {
                    return Some(val);
                }
            }
        }
    }

    let trimmed = response.trim();
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                if let Ok(val) = serde_json::from_str(&trimmed[start..=end]) {
                    return Some(val);
                }
            }
        }
    }

    None
}

// ── Tests ────────────────────────────────────────────────────────────────────
