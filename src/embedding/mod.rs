//! Embedding module - text vectorization via the OpenAI embeddings API.
//!
//! All texts passed to one `embed_batch` call are submitted as a single
//! batched request to bound round-trip latency. Service failures are not
//! retried here; they surface as `RagError::Embedding` and abort the
//! in-progress batch.
//!
//! ref: https://platform.openai.com/docs/api-reference/embeddings

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RagError;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// Converts text into fixed-dimension vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per non-empty input text,
    /// order-preserving. An input with no non-empty text is rejected
    /// with `RagError::Validation` before any service call.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Embedding dimension.
    fn dimension(&self) -> usize;

    /// Maximum texts per batched request; ingestion splits larger sets
    /// into sequential batches of this size.
    fn batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }

    /// Provider name.
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI Embedding
// ============================================================================

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Embedding dimension of `text-embedding-ada-002`.
pub const DEFAULT_DIMENSION: usize = 1536;

/// Default texts per batched request.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default timeout for embedding requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI embeddings client.
#[derive(Debug)]
pub struct OpenAiEmbedding {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    batch_size: usize,
}

impl OpenAiEmbedding {
    /// Create a client with the default timeout and batch size.
    pub fn new(api_key: String) -> Result<Self, RagError> {
        Self::with_options(api_key, DEFAULT_TIMEOUT, DEFAULT_BATCH_SIZE)
    }

    /// Create a client with an explicit request timeout and batch size.
    pub fn with_options(
        api_key: String,
        timeout: Duration,
        batch_size: usize,
    ) -> Result<Self, RagError> {
        if batch_size == 0 {
            return Err(RagError::Validation("batch size must be at least 1".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Embedding(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            base_url: base_url_from_env(),
            client,
            batch_size,
        })
    }

    /// Read the API key from `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, RagError> {
        Self::new(get_api_key()?)
    }
}

/// Embeddings API request body.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

/// Embeddings API response.
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
    index: usize,
}

/// API error envelope.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        // Validate before any network call.
        let validated: Vec<&str> = texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();

        if validated.is_empty() {
            return Err(RagError::Validation("no valid text to embed".into()));
        }

        let request = EmbedRequest {
            model: EMBEDDING_MODEL,
            input: validated.clone(),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("failed to send embedding request: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RagError::Embedding(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ApiError>(&body) {
                return Err(RagError::Embedding(format!(
                    "embedding API error ({status}): {}",
                    err.error.message
                )));
            }
            return Err(RagError::Embedding(format!(
                "embedding API error ({status}): {body}"
            )));
        }

        let parsed: EmbedResponse = serde_json::from_str(&body)
            .map_err(|e| RagError::Embedding(format!("failed to parse embedding response: {e}")))?;

        if parsed.data.len() != validated.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                validated.len(),
                parsed.data.len()
            )));
        }

        // Restore input order from the response index field.
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimension(&self) -> usize {
        DEFAULT_DIMENSION
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn name(&self) -> &str {
        EMBEDDING_MODEL
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// Load the API key from the `OPENAI_API_KEY` environment variable.
pub fn get_api_key() -> Result<String, RagError> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => Err(RagError::Validation(
            "OPENAI_API_KEY environment variable is not set".into(),
        )),
    }
}

/// Whether an API key is configured.
pub fn has_api_key() -> bool {
    std::env::var("OPENAI_API_KEY")
        .map(|k| !k.is_empty())
        .unwrap_or(false)
}

/// API base URL, overridable via `OPENAI_BASE_URL` (proxy deployments).
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
