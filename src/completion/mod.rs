//! Completion module - answer generation via the OpenAI chat API.
//!
//! The synthesizer is the only caller; it converts every failure from
//! this module into a fallback outcome, so errors here are informational
//! rather than fatal.
//!
//! ref: https://platform.openai.com/docs/api-reference/chat

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::get_api_key;
use crate::error::RagError;

// ============================================================================
// ChatProvider Trait
// ============================================================================

/// Generation parameters for one completion call.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Cap on generated tokens; `None` leaves it to the service.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            max_tokens: None,
            temperature: 0.3,
        }
    }
}

/// External language model invoked with a system and a user prompt.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Generate a completion. Timeouts are reported the same way as any
    /// other service failure.
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &ChatOptions,
    ) -> Result<String, RagError>;

    /// Provider name.
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI Chat
// ============================================================================

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const CHAT_MODEL: &str = "gpt-4o-mini";

/// Default timeout for completion requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// OpenAI chat completions client.
#[derive(Debug)]
pub struct OpenAiChat {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiChat {
    /// Create a client with the default timeout.
    pub fn new(api_key: String) -> Result<Self, RagError> {
        Self::with_timeout(api_key, DEFAULT_TIMEOUT)
    }

    /// Create a client with an explicit request timeout.
    pub fn with_timeout(api_key: String, timeout: Duration) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Synthesis(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            base_url: base_url_from_env(),
            client,
        })
    }

    /// Read the API key from `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, RagError> {
        Self::new(get_api_key()?)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl ChatProvider for OpenAiChat {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &ChatOptions,
    ) -> Result<String, RagError> {
        let request = ChatRequest {
            model: CHAT_MODEL,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Synthesis(format!("failed to send completion request: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RagError::Synthesis(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ApiError>(&body) {
                return Err(RagError::Synthesis(format!(
                    "chat API error ({status}): {}",
                    err.error.message
                )));
            }
            return Err(RagError::Synthesis(format!(
                "chat API error ({status}): {body}"
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| RagError::Synthesis(format!("failed to parse completion response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RagError::Synthesis("completion response had no content".into()))
    }

    fn name(&self) -> &str {
        CHAT_MODEL
    }
}

/// API base URL, overridable via `OPENAI_BASE_URL`.
fn base_url_from_env() -> String {
    std::env::var("OPENAI_BASE_URL")
        .ok()
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('/').to_string())
        .unwrap_or_else(|| OPENAI_DEFAULT_BASE_URL.to_string())
}

// ============================================================================
// Tests
// ============================================================================
