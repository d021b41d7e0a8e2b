//! Error taxonomy for the pipeline.
//!
//! Each variant names the stage that failed, so callers can decide which
//! failures are fatal and which degrade (a store query failure degrades
//! to empty results, an embedding failure aborts the request).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// Caller-supplied input was rejected before any work started.
    #[error("validation error: {0}")]
    Validation(String),

    /// The embedding provider failed or returned a malformed response.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The vector store rejected a read or write.
    #[error("store error: {0}")]
    Store(String),

    /// The chat model failed while generating an answer.
    #[error("synthesis error: {0}")]
    Synthesis(String),
}

impl RagError {
    /// Stable tag for logs and wire formats.
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Validation(_) => "validation",
            RagError::Embedding(_) => "embedding",
            RagError::Store(_) => "store",
            RagError::Synthesis(_) => "synthesis",
        }
    }
}
