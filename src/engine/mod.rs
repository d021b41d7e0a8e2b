//! Engine module - the ingestion and query entry points.
//!
//! `RagEngine` wires the injected providers together: ingestion runs
//! extract → chunk → batched embed → id-assigned store writes, and a
//! query runs retrieve → synthesize. Id assignment reads the current
//! collection size and writes the id range as one atomic region, guarded
//! by a single ingest mutex so concurrent ingestions never collide on
//! ids. Query-path operations share no mutable state and run fully in
//! parallel across requests.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::completion::ChatProvider;
use crate::embedding::EmbeddingProvider;
use crate::error::RagError;
use crate::knowledge::{chunk_words, Fragment, StoredRecord, VectorStore, DEFAULT_MAX_WORDS};
use crate::retrieval::{QueryResult, Retriever};
use crate::synthesis::{SourceRef, Synthesizer};

// ============================================================================
// Configuration
// ============================================================================

/// Tunables for the pipeline.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum words per fragment during ingestion.
    pub max_words_per_chunk: usize,
    /// Nearest neighbors requested per query.
    pub n_results: usize,
    /// Estimated-token budget for the packed context.
    pub max_context_tokens: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_words_per_chunk: DEFAULT_MAX_WORDS,
            n_results: 10,
            max_context_tokens: 3000,
        }
    }
}

// ============================================================================
// Types
// ============================================================================

/// Result of one ingestion.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestReport {
    /// Fragments written to the store. Zero means the input contained
    /// nothing to ingest.
    pub chunks_stored: usize,
}

/// Result of one query.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AskResponse {
    /// The question as asked.
    pub question: String,
    /// Synthesized (or fallback) answer.
    pub answer: String,
    /// Cited sources, ranked by similarity descending.
    pub sources: Vec<SourceRef>,
}

// ============================================================================
// RagEngine
// ============================================================================

/// The assembled pipeline. All collaborators are constructor-injected so
/// tests can substitute fakes and multiple collections can coexist.
pub struct RagEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    retriever: Retriever,
    synthesizer: Synthesizer,
    config: EngineConfig,
    // Serializes the read-size/assign-ids/write-records region.
    ingest_gate: Mutex<()>,
}

impl RagEngine {
    /// Assemble an engine from injected providers.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        chat: Arc<dyn ChatProvider>,
        config: EngineConfig,
    ) -> Self {
        let retriever = Retriever::new(embedder.clone(), store.clone());
        let synthesizer = Synthesizer::new(chat);
        Self {
            embedder,
            store,
            retriever,
            synthesizer,
            config,
            ingest_gate: Mutex::new(()),
        }
    }

    /// Ingest raw extracted text under a source identifier.
    ///
    /// Returns `chunks_stored: 0` when the text contains nothing to
    /// ingest; callers decide whether that is worth reporting.
    pub async fn ingest_text(&self, text: &str, source: &str) -> Result<IngestReport, RagError> {
        if source.trim().is_empty() {
            return Err(RagError::Validation("source must not be empty".into()));
        }

        let fragments = chunk_words(text, source, self.config.max_words_per_chunk);
        self.ingest_fragments(fragments).await
    }

    /// Ingest pre-chunked fragments (the upstream producer already split
    /// the text). Fragments are embedded in sequential batches of the
    /// provider's batch size; batches already written stay committed if
    /// a later batch fails.
    pub async fn ingest_fragments(
        &self,
        fragments: Vec<Fragment>,
    ) -> Result<IngestReport, RagError> {
        if fragments.is_empty() {
            return Ok(IngestReport { chunks_stored: 0 });
        }

        if fragments.iter().any(|f| f.content.trim().is_empty()) {
            return Err(RagError::Validation(
                "fragments must have non-empty content".into(),
            ));
        }

        // Atomic region: collection size is read and the whole id range
        // is written under one guard.
        let _guard = self.ingest_gate.lock().await;

        let start = self.store.count().await?;
        let batch_size = self.embedder.batch_size().max(1);
        let mut stored = 0usize;

        for batch in fragments.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|f| f.content.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "expected {} vectors for batch, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            let records: Vec<StoredRecord> = batch
                .iter()
                .zip(vectors)
                .enumerate()
                .map(|(i, (fragment, vector))| StoredRecord {
                    id: format!("chunk_{}", start + stored + i),
                    vector,
                    content: fragment.content.clone(),
                    source: fragment.source.clone(),
                    chunk_index: fragment.chunk_index,
                    total_chunks: fragment.total_chunks,
                })
                .collect();

            self.store.add(&records).await?;
            stored += records.len();
            tracing::info!(stored, total = fragments.len(), "ingested fragment batch");
        }

        Ok(IngestReport {
            chunks_stored: stored,
        })
    }

    /// Answer a question from the ingested corpus, optionally restricted
    /// to one source document.
    pub async fn ask(
        &self,
        question: &str,
        source: Option<&str>,
    ) -> Result<AskResponse, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Validation("question must not be empty".into()));
        }

        let results = self
            .retriever
            .search(question, self.config.n_results, source)
            .await?;

        let outcome = self
            .synthesizer
            .synthesize(&results, question, self.config.max_context_tokens)
            .await;

        Ok(AskResponse {
            question: question.to_string(),
            answer: outcome.answer,
            sources: outcome.sources,
        })
    }

    /// Retrieval-only search, for inspecting ranked candidates.
    pub async fn search(
        &self,
        query: &str,
        n_results: usize,
        source: Option<&str>,
    ) -> Result<Vec<QueryResult>, RagError> {
        self.retriever.search(query, n_results, source).await
    }

    /// Number of stored fragments.
    pub async fn count(&self) -> Result<usize, RagError> {
        self.store.count().await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::NO_RESULTS_ANSWER;
    use crate::testing::{
        MemoryVectorStore, RecordingChat, ScriptedEmbedder, StaticEmbedder,
    };

    fn engine_with(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<MemoryVectorStore>,
        chat: Arc<RecordingChat>,
    ) -> RagEngine {
        RagEngine::new(embedder, store, chat, EngineConfig::default())
    }

    #[tokio::test]
    async fn test_ids_are_contiguous_across_sequential_ingestions() {
        let store = Arc::new(MemoryVectorStore::new(2));
        let chat = Arc::new(RecordingChat::new("ok"));
        let engine = engine_with(
            Arc::new(StaticEmbedder::new(vec![1.0, 0.0])),
            store.clone(),
            chat,
        );

        engine.ingest_text("a b c d", "one.txt").await.unwrap();
        let report = engine.ingest_text("e f", "two.txt").await.unwrap();
        assert_eq!(report.chunks_stored, 1);

        // Both ingestions used max_words 50_000, so each produced one
        // fragment; force more by ingesting pre-chunked fragments.
        let fragments = crate::knowledge::fragments_from_parts(
            vec!["x".into(), "y".into(), "z".into()],
            "three.txt",
        );
        engine.ingest_fragments(fragments).await.unwrap();

        let ids = store.ids();
        let expected: Vec<String> = (0..5).map(|i| format!("chunk_{i}")).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_concurrent_ingestions_never_collide_on_ids() {
        // The embedder yields between batches, so without the ingest
        // gate the three tasks would interleave their count/add regions
        // and assign overlapping ids.
        let embedder = Arc::new(
            ScriptedEmbedder::new(vec![], vec![1.0, 0.0]).with_batch_size(2),
        );
        let store = Arc::new(MemoryVectorStore::new(2));
        let chat = Arc::new(RecordingChat::new("ok"));
        let engine = engine_with(embedder, store.clone(), chat);

        let docs: Vec<Vec<Fragment>> = (0..3)
            .map(|d| {
                crate::knowledge::fragments_from_parts(
                    (0..4).map(|i| format!("doc {d} part {i}")).collect(),
                    &format!("doc{d}.txt"),
                )
            })
            .collect();
        let mut docs = docs.into_iter();
        let (a, b, c) = (
            docs.next().unwrap(),
            docs.next().unwrap(),
            docs.next().unwrap(),
        );

        let (ra, rb, rc) = tokio::join!(
            engine.ingest_fragments(a),
            engine.ingest_fragments(b),
            engine.ingest_fragments(c),
        );
        assert_eq!(ra.unwrap().chunks_stored, 4);
        assert_eq!(rb.unwrap().chunks_stored, 4);
        assert_eq!(rc.unwrap().chunks_stored, 4);

        // All 12 ids are unique and form one contiguous range.
        let mut indices: Vec<usize> = store
            .ids()
            .iter()
            .map(|id| id.strip_prefix("chunk_").unwrap().parse().unwrap())
            .collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..12).collect::<Vec<usize>>());
    }

    #[tokio::test]
    async fn test_empty_text_stores_nothing() {
        let store = Arc::new(MemoryVectorStore::new(2));
        let chat = Arc::new(RecordingChat::new("ok"));
        let engine = engine_with(
            Arc::new(StaticEmbedder::new(vec![1.0, 0.0])),
            store.clone(),
            chat,
        );

        let report = engine.ingest_text("   \n ", "empty.txt").await.unwrap();
        assert_eq!(report.chunks_stored, 0);
        assert_eq!(store.ids().len(), 0);
    }

    #[tokio::test]
    async fn test_ingestion_splits_into_provider_batches() {
        let embedder = Arc::new(
            ScriptedEmbedder::new(vec![], vec![1.0, 0.0]).with_batch_size(2),
        );
        let store = Arc::new(MemoryVectorStore::new(2));
        let chat = Arc::new(RecordingChat::new("ok"));
        let engine = engine_with(embedder.clone(), store, chat);

        let fragments = crate::knowledge::fragments_from_parts(
            (0..5).map(|i| format!("part {i}")).collect(),
            "doc.txt",
        );
        let report = engine.ingest_fragments(fragments).await.unwrap();

        assert_eq!(report.chunks_stored, 5);
        assert_eq!(embedder.batch_sizes_seen(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_embedding_failure_keeps_committed_batches() {
        let embedder = Arc::new(
            ScriptedEmbedder::new(vec![], vec![1.0, 0.0])
                .with_batch_size(2)
                .failing_after(1),
        );
        let store = Arc::new(MemoryVectorStore::new(2));
        let chat = Arc::new(RecordingChat::new("ok"));
        let engine = engine_with(embedder, store.clone(), chat);

        let fragments = crate::knowledge::fragments_from_parts(
            (0..5).map(|i| format!("part {i}")).collect(),
            "doc.txt",
        );
        let err = engine.ingest_fragments(fragments).await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));

        // The first batch stayed committed; a later ingestion re-reads
        // the count, so ids continue without collision.
        assert_eq!(store.ids(), vec!["chunk_0", "chunk_1"]);

        let embedder2 = Arc::new(StaticEmbedder::new(vec![1.0, 0.0]));
        let chat2 = Arc::new(RecordingChat::new("ok"));
        let engine2 = engine_with(embedder2, store.clone(), chat2);
        engine2.ingest_text("more text", "again.txt").await.unwrap();
        assert_eq!(store.ids(), vec!["chunk_0", "chunk_1", "chunk_2"]);
    }

    #[tokio::test]
    async fn test_store_add_failure_aborts_ingestion() {
        let store = Arc::new(MemoryVectorStore::failing_adds(2));
        let chat = Arc::new(RecordingChat::new("ok"));
        let engine = engine_with(
            Arc::new(StaticEmbedder::new(vec![1.0, 0.0])),
            store,
            chat,
        );

        let err = engine.ingest_text("some text", "doc.txt").await.unwrap_err();
        assert!(matches!(err, RagError::Store(_)));
    }

    #[tokio::test]
    async fn test_ask_with_empty_corpus_skips_the_model() {
        let store = Arc::new(MemoryVectorStore::new(2));
        let chat = Arc::new(RecordingChat::new("should not be called"));
        let engine = engine_with(
            Arc::new(StaticEmbedder::new(vec![1.0, 0.0])),
            store,
            chat.clone(),
        );

        let response = engine.ask("anything?", None).await.unwrap();
        assert_eq!(response.answer, NO_RESULTS_ANSWER);
        assert!(response.sources.is_empty());
        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    async fn test_closest_source_ranks_first() {
        // "What are cats?" is scripted to sit nearest the cat fragment.
        let embedder = Arc::new(ScriptedEmbedder::new(
            vec![
                ("Cats are mammals.", vec![1.0, 0.0, 0.0]),
                ("Dogs are mammals.", vec![0.0, 1.0, 0.0]),
                ("What are cats?", vec![0.95, 0.05, 0.0]),
            ],
            vec![0.0, 0.0, 1.0],
        ));
        let store = Arc::new(MemoryVectorStore::new(3));
        let chat = Arc::new(RecordingChat::new("Cats are mammals."));
        let engine = engine_with(embedder, store, chat);

        engine.ingest_text("Cats are mammals.", "doc1").await.unwrap();
        engine.ingest_text("Dogs are mammals.", "doc2").await.unwrap();

        let results = engine.search("What are cats?", 2, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source, "doc1");
        assert!(results[0].similarity > results[1].similarity);

        let response = engine.ask("What are cats?", None).await.unwrap();
        assert_eq!(response.sources[0].source, "doc1");
    }

    #[tokio::test]
    async fn test_ask_rejects_blank_question() {
        let store = Arc::new(MemoryVectorStore::new(2));
        let chat = Arc::new(RecordingChat::new("ok"));
        let engine = engine_with(
            Arc::new(StaticEmbedder::new(vec![1.0, 0.0])),
            store,
            chat,
        );

        let err = engine.ask("  ", None).await.unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }
}
