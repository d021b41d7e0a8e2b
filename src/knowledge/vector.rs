//! Vector store trait and record types.
//!
//! The store persists `(id, vector, content, metadata)` records and
//! answers nearest-neighbor queries by cosine distance. Ids are assigned
//! by the caller (`chunk_<sequence>`); the read-size-then-write-records
//! region is serialized by the ingestion path, not by the store itself.

use async_trait::async_trait;

use crate::error::RagError;

// ============================================================================
// Types
// ============================================================================

/// Persisted form of a fragment, with a pre-assigned id and embedding.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    /// Globally unique id, monotonically assigned at ingestion
    /// (`chunk_<sequence>`).
    pub id: String,
    /// Embedding vector; length must equal the store dimension.
    pub vector: Vec<f32>,
    /// Fragment text.
    pub content: String,
    /// Origin document identifier.
    pub source: String,
    /// Position of the fragment within its source (0-based).
    pub chunk_index: usize,
    /// Total fragments derived from the source.
    pub total_chunks: usize,
}

/// One nearest-neighbor match returned by a store query.
#[derive(Debug, Clone)]
pub struct StoredHit {
    /// Fragment text.
    pub content: String,
    /// Origin document identifier.
    pub source: String,
    /// Position of the fragment within its source.
    pub chunk_index: usize,
    /// Total fragments derived from the source.
    pub total_chunks: usize,
    /// Cosine distance to the query vector (smaller is more similar).
    pub distance: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// Persistent cosine-distance nearest-neighbor store.
///
/// A store is bound to a single embedding dimension and a single metric
/// (cosine) at creation time. Implementations must return query results
/// ordered by ascending distance.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Append records. Ids must be pre-assigned by the caller.
    async fn add(&self, records: &[StoredRecord]) -> Result<usize, RagError>;

    /// Return up to `k` nearest neighbors of `vector`, ordered by
    /// ascending cosine distance. `source_filter` is an exact metadata
    /// equality predicate applied by the backend; an empty or missing
    /// collection yields an empty result, not an error.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<StoredHit>, RagError>;

    /// Current number of stored records; used for id assignment.
    async fn count(&self) -> Result<usize, RagError>;

    /// Embedding dimension the store was created with.
    fn dimension(&self) -> usize;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Cosine similarity between two vectors, in `[-1, 1]`.
///
/// Mismatched lengths and zero-norm vectors yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================
