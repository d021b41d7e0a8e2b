//! Retrieval module - ranked, deduplicated candidate lookup.
//!
//! One search: embed the query (single-element batch), ask the vector
//! store for the k nearest neighbors, filter by source, dedup by exact
//! content, convert distances to similarities, and re-sort. Embedding
//! failure is fatal to the search; a failed store query degrades to an
//! empty result set so downstream synthesis can short-circuit with a
//! "no information" answer.

use std::collections::HashSet;
use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::RagError;
use crate::knowledge::VectorStore;

// ============================================================================
// Types
// ============================================================================

/// One ranked search candidate. Created per query, never persisted.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Fragment text.
    pub content: String,
    /// `1 - cosine_distance`, clamped to `[0, 1]`. The scale is
    /// absolute, not normalized against the batch.
    pub similarity: f32,
    /// Origin document identifier.
    pub source: String,
    /// Position of the fragment within its source.
    pub chunk_index: usize,
    /// Total fragments derived from the source.
    pub total_chunks: usize,
}

// ============================================================================
// Retriever
// ============================================================================

/// Semantic search over the vector store.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    /// Create a retriever over injected providers.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Search for fragments similar to `query`.
    ///
    /// Source filtering happens after retrieval, so the result count may
    /// be smaller than `n_results`, including zero. Zero matches is a
    /// valid empty answer, not an error.
    pub async fn search(
        &self,
        query: &str,
        n_results: usize,
        source: Option<&str>,
    ) -> Result<Vec<QueryResult>, RagError> {
        if query.trim().is_empty() {
            return Err(RagError::Validation("query must not be empty".into()));
        }

        // 1. Embed the query as a single-element batch. Fatal on failure.
        let vectors = self.embedder.embed_batch(&[query.to_string()]).await?;
        let query_vector = vectors
            .first()
            .ok_or_else(|| RagError::Embedding("embedding service returned no vector".into()))?;

        // 2. k-NN lookup. A failed store query degrades to zero matches.
        let hits = match self.store.query(query_vector, n_results, None).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("vector store query failed, returning no matches: {e}");
                Vec::new()
            }
        };

        if hits.is_empty() {
            tracing::debug!(query, "no matches in vector store");
            return Ok(vec![]);
        }

        // 3. Case-insensitive source filter, applied post-retrieval.
        // Full Unicode lowercase matching, not just ASCII.
        let mut hits = hits;
        if let Some(wanted) = source {
            let wanted = wanted.to_lowercase();
            hits.retain(|h| h.source.to_lowercase() == wanted);
        }

        // 4. Stable dedup by exact content, keeping the first occurrence.
        let mut seen: HashSet<String> = HashSet::new();
        hits.retain(|h| seen.insert(h.content.clone()));

        // 5/6. Distance -> similarity, then re-sort to guarantee descending
        // order even after filtering.
        let mut results: Vec<QueryResult> = hits
            .into_iter()
            .map(|h| QueryResult {
                content: h.content,
                similarity: (1.0 - h.distance).clamp(0.0, 1.0),
                source: h.source,
                chunk_index: h.chunk_index,
                total_chunks: h.total_chunks,
            })
            .collect();

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(results)
    }
}

// ============================================================================
// Tests
// ============================================================================
