//! Synthesis module - context packing and grounded answer generation.
//!
//! The synthesizer applies an adaptive relevance threshold, packs the
//! survivors into a token budget (highest similarity first, the last
//! fragment truncated to exactly fill the remainder), prompts the
//! language model with a deterministic grounding instruction, and
//! formats the answer. Model failures never propagate: they become a
//! degraded but well-formed fallback outcome.

mod format;

pub use format::format_answer;

use std::sync::Arc;

use crate::completion::{ChatOptions, ChatProvider};
use crate::retrieval::QueryResult;

// ============================================================================
// Policy Constants
// ============================================================================

/// Candidate pool size above which the relevance bar is raised.
const ADAPTIVE_POOL_CUTOFF: usize = 10;
/// Threshold for pools larger than the cutoff.
const HIGH_POOL_THRESHOLD: f32 = 0.35;
/// Threshold for pools of at most the cutoff size.
const LOW_POOL_THRESHOLD: f32 = 0.20;
/// Maximum survivors considered for packing.
const TOP_N: usize = 10;

/// Answer returned when retrieval produced no candidates.
pub const NO_RESULTS_ANSWER: &str = "No relevant information found.";
/// Answer returned when the token budget admits no context at all.
pub const EMPTY_CONTEXT_ANSWER: &str =
    "Could not process the retrieved context within the token budget.";
/// Marker present in every model-failure fallback answer.
pub const API_ERROR_MARKER: &str = "API error";

const SYSTEM_PROMPT: &str = "\
You are a document assistant. Answer the question using only the provided context.
Rules:
- Use only information found in the context; do not bring in outside knowledge.
- Do not explain your reasoning.
- Do not list or quote the sources verbatim in the answer body.
- If the context does not contain enough information, reply exactly: \
\"I don't have enough information to answer this question.\"
- Format any enumeration as bullet points.
- Keep a professional tone.";

// ============================================================================
// Types
// ============================================================================

/// A source citation attached to an answer.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SourceRef {
    /// Origin document identifier.
    pub source: String,
    /// Similarity of the cited fragment.
    pub similarity: f32,
}

/// The outcome of one synthesis. Produced per query, never persisted.
#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    /// Final answer text.
    pub answer: String,
    /// Candidates actually considered for the context, ranked by
    /// similarity descending; empty when no context was assembled.
    pub sources: Vec<SourceRef>,
}

// ============================================================================
// Synthesizer
// ============================================================================

/// Grounded answer generation over ranked retrieval candidates.
pub struct Synthesizer {
    chat: Arc<dyn ChatProvider>,
    options: ChatOptions,
}

impl Synthesizer {
    /// Create a synthesizer over an injected language model.
    pub fn new(chat: Arc<dyn ChatProvider>) -> Self {
        Self {
            chat,
            options: ChatOptions::default(),
        }
    }

    /// Synthesize an answer from ranked candidates.
    ///
    /// `max_tokens` bounds the estimated token cost of the packed
    /// context, not the generated answer. This method never fails:
    /// service errors are converted into a fallback outcome.
    pub async fn synthesize(
        &self,
        results: &[QueryResult],
        query: &str,
        max_tokens: usize,
    ) -> SynthesisOutcome {
        // 1. Nothing retrieved: answer without touching the model.
        if results.is_empty() {
            return SynthesisOutcome {
                answer: NO_RESULTS_ANSWER.to_string(),
                sources: vec![],
            };
        }

        // 2/3. Adaptive threshold with a best-single-chunk override so a
        // strict filter never zeroes out a non-empty pool.
        let threshold = adaptive_threshold(results.len());
        let mut survivors: Vec<&QueryResult> = results
            .iter()
            .filter(|r| r.similarity >= threshold)
            .collect();

        if survivors.is_empty() {
            if let Some(best) = results.iter().max_by(|a, b| {
                a.similarity
                    .partial_cmp(&b.similarity)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }) {
                tracing::debug!(
                    threshold,
                    best_similarity = best.similarity,
                    "no candidate cleared the threshold; using best single chunk"
                );
                survivors.push(best);
            }
        }

        // 4. Rank and cap the pool actually considered.
        survivors.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        survivors.truncate(TOP_N);

        // 5. Greedy token-budgeted packing in rank order.
        let parts = pack_context(&survivors, max_tokens);

        // 6. Budget admitted nothing.
        if parts.is_empty() {
            return SynthesisOutcome {
                answer: EMPTY_CONTEXT_ANSWER.to_string(),
                sources: vec![],
            };
        }

        let context = parts.join("\n");
        let sources: Vec<SourceRef> = survivors
            .iter()
            .map(|r| SourceRef {
                source: r.source.clone(),
                similarity: r.similarity,
            })
            .collect();

        let user_prompt = format!("Question: {query}\n\nContext:\n{context}");

        // 8/9. Generate, falling back on failure instead of propagating.
        match self
            .chat
            .complete(SYSTEM_PROMPT, &user_prompt, &self.options)
            .await
        {
            Ok(raw) => SynthesisOutcome {
                answer: format_answer(&raw),
                sources,
            },
            Err(e) => {
                tracing::warn!("language model call failed, returning fallback: {e}");
                if sources.is_empty() {
                    SynthesisOutcome {
                        answer: format!(
                            "The language model is unavailable ({API_ERROR_MARKER}) and no \
                             fallback answer is available."
                        ),
                        sources: vec![],
                    }
                } else {
                    SynthesisOutcome {
                        answer: format!(
                            "Unable to generate an answer due to an {API_ERROR_MARKER}: {e}. \
                             The sources listed below were retrieved for this question."
                        ),
                        sources,
                    }
                }
            }
        }
    }
}

// ============================================================================
// Threshold & Packing
// ============================================================================

/// Relevance threshold for a candidate pool of `pool_size`.
///
/// A large pool likely contains enough strong matches to raise the bar;
/// a small pool should not be over-filtered. The switch is strictly at
/// `pool_size > 10`.
fn adaptive_threshold(pool_size: usize) -> f32 {
    if pool_size > ADAPTIVE_POOL_CUTOFF {
        HIGH_POOL_THRESHOLD
    } else {
        LOW_POOL_THRESHOLD
    }
}

/// Coarse deterministic token estimate: `max(1, chars / 4)`.
fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / 4).max(1)
}

/// Pack survivors into the budget in rank order.
///
/// Whole fragments are appended while the running estimate stays within
/// `max_tokens`; the first overflowing fragment is cut to a prefix that
/// exactly fills the remaining budget, then packing stops.
fn pack_context(survivors: &[&QueryResult], max_tokens: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut used = 0usize;

    for result in survivors {
        let cost = estimate_tokens(&result.content);
        if used + cost <= max_tokens {
            parts.push(result.content.clone());
            used += cost;
        } else {
            let remaining = max_tokens - used;
            if remaining == 0 {
                break;
            }
            let cut = prefix_bytes(&result.content, remaining * 4);
            if cut > 0 {
                parts.push(result.content[..cut].to_string());
            }
            break;
        }
    }

    parts
}

/// Byte index just past the first `n_chars` characters of `s`, clamped
/// to the full length. Token costs count characters, so truncation has
/// to as well.
fn prefix_bytes(s: &str, n_chars: usize) -> usize {
    s.char_indices().nth(n_chars).map_or(s.len(), |(i, _)| i)
}

// ============================================================================
// Tests
// ============================================================================
