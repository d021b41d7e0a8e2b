//! Test doubles shared across unit tests: an in-memory vector store and
//! scripted embedding/chat providers. Compiled only for test builds.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::completion::{ChatOptions, ChatProvider};
use crate::embedding::EmbeddingProvider;
use crate::error::RagError;
use crate::knowledge::{cosine_similarity, StoredHit, StoredRecord, VectorStore};

// ============================================================================
// Vector Store
// ============================================================================

/// In-memory cosine k-NN store with the same contract as the LanceDB
/// implementation.
pub struct MemoryVectorStore {
    records: Mutex<Vec<StoredRecord>>,
    dimension: usize,
    fail_adds: bool,
}

impl MemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            dimension,
            fail_adds: false,
        }
    }

    /// A store whose `add` always fails.
    pub fn failing_adds(dimension: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            dimension,
            fail_adds: true,
        }
    }

    pub fn seed(&self, records: Vec<StoredRecord>) {
        self.records.lock().unwrap().extend(records);
    }

    pub fn ids(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn add(&self, records: &[StoredRecord]) -> Result<usize, RagError> {
        if self.fail_adds {
            return Err(RagError::Store("simulated add failure".into()));
        }
        self.records.lock().unwrap().extend_from_slice(records);
        Ok(records.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<StoredHit>, RagError> {
        let records = self.records.lock().unwrap();
        let mut hits: Vec<StoredHit> = records
            .iter()
            .filter(|r| source_filter.map_or(true, |s| r.source == s))
            .map(|r| StoredHit {
                content: r.content.clone(),
                source: r.source.clone(),
                chunk_index: r.chunk_index,
                total_chunks: r.total_chunks,
                distance: 1.0 - cosine_similarity(vector, &r.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize, RagError> {
        Ok(self.records.lock().unwrap().len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Embedders
// ============================================================================

/// Returns the same vector for every text.
pub struct StaticEmbedder {
    vector: Vec<f32>,
}

impl StaticEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.iter().all(|t| t.trim().is_empty()) {
            return Err(RagError::Validation("no valid text to embed".into()));
        }
        Ok(texts.iter().map(|_| self.vector.clone()).collect())
    }

    fn dimension(&self) -> usize {
        self.vector.len()
    }

    fn name(&self) -> &str {
        "static-embedder"
    }
}

/// Maps exact texts to scripted vectors; unknown texts get a default.
pub struct ScriptedEmbedder {
    entries: Vec<(String, Vec<f32>)>,
    default: Vec<f32>,
    batch_size: usize,
    batch_sizes_seen: Mutex<Vec<usize>>,
    fail_after_batches: Option<usize>,
    batches_served: AtomicUsize,
}

impl ScriptedEmbedder {
    pub fn new(entries: Vec<(&str, Vec<f32>)>, default: Vec<f32>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(t, v)| (t.to_string(), v))
                .collect(),
            default,
            batch_size: 32,
            batch_sizes_seen: Mutex::new(Vec::new()),
            fail_after_batches: None,
            batches_served: AtomicUsize::new(0),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Fail every call after the first `n` batches have been served.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after_batches = Some(n);
        self
    }

    pub fn batch_sizes_seen(&self) -> Vec<usize> {
        self.batch_sizes_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        // Suspension point so concurrent callers can interleave, like a
        // real network round-trip would.
        tokio::task::yield_now().await;

        if texts.iter().all(|t| t.trim().is_empty()) {
            return Err(RagError::Validation("no valid text to embed".into()));
        }

        let served = self.batches_served.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after_batches {
            if served >= limit {
                return Err(RagError::Embedding("simulated embedding failure".into()));
            }
        }

        self.batch_sizes_seen.lock().unwrap().push(texts.len());
        Ok(texts
            .iter()
            .map(|t| {
                self.entries
                    .iter()
                    .find(|(known, _)| known == t)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| self.default.clone())
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.default.len()
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn name(&self) -> &str {
        "scripted-embedder"
    }
}

/// Always fails.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Err(RagError::Embedding("simulated embedding failure".into()))
    }

    fn dimension(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "failing-embedder"
    }
}

// ============================================================================
// Chat Providers
// ============================================================================

/// Returns a fixed answer and records the prompts it was given.
pub struct RecordingChat {
    answer: String,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl RecordingChat {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_user_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatProvider for RecordingChat {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        _options: &ChatOptions,
    ) -> Result<String, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(user_prompt.to_string());
        Ok(self.answer.clone())
    }

    fn name(&self) -> &str {
        "recording-chat"
    }
}

/// Always fails.
pub struct FailingChat;

#[async_trait]
impl ChatProvider for FailingChat {
    async fn complete(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _options: &ChatOptions,
    ) -> Result<String, RagError> {
        Err(RagError::Synthesis("simulated model failure".into()))
    }

    fn name(&self) -> &str {
        "failing-chat"
    }
}
