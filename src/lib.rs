//! docqa - document question answering over a local vector index
//!
//! Documents are chunked, embedded through the OpenAI API and stored in
//! LanceDB. Questions retrieve the nearest fragments and a chat model
//! synthesizes an answer grounded in them.

pub mod cli;
pub mod completion;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod knowledge;
pub mod retrieval;
pub mod synthesis;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use completion::{ChatOptions, ChatProvider, OpenAiChat};
pub use embedding::{get_api_key, has_api_key, EmbeddingProvider, OpenAiEmbedding};
pub use engine::{AskResponse, EngineConfig, IngestReport, RagEngine};
pub use error::RagError;
pub use extractor::{extract_file, ExtractedText, FileKind};
pub use knowledge::{
    chunk_words, fragments_from_parts, Fragment, LanceVectorStore, StoredHit, StoredRecord,
    VectorStore, DEFAULT_MAX_WORDS,
};
pub use retrieval::{QueryResult, Retriever};
pub use synthesis::{SourceRef, SynthesisOutcome, Synthesizer};
