//! Knowledge module - chunk storage and nearest-neighbor retrieval.
//!
//! - Chunker: splits extracted text into position-tagged fragments
//! - VectorStore: persistent cosine k-NN over `(id, vector, content, metadata)`
//! - LanceDB: the on-disk store implementation

mod chunker;
mod lance;
mod vector;

// Re-exports
pub use chunker::{chunk_words, fragments_from_parts, Fragment, DEFAULT_MAX_WORDS};
pub use lance::LanceVectorStore;
pub use vector::{cosine_similarity, StoredHit, StoredRecord, VectorStore};
