//! Text chunking - splits extracted text into bounded fragments.
//!
//! A fragment is a contiguous run of at most `max_words` whitespace-
//! separated words, tagged with its position within the source document.
//! Upstream extractors that already produce pre-split parts (for example
//! paragraph-split OCR output) converge on the same `Fragment` shape via
//! [`fragments_from_parts`].

// ============================================================================
// Types
// ============================================================================

/// Default maximum words per fragment.
pub const DEFAULT_MAX_WORDS: usize = 50_000;

/// A bounded unit of ingested text with positional metadata.
///
/// Invariant: `content` is non-empty after trimming and
/// `chunk_index < total_chunks` for all fragments of the same source.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Fragment text.
    pub content: String,
    /// Origin document identifier (usually the filename).
    pub source: String,
    /// Position of this fragment within its source (0-based).
    pub chunk_index: usize,
    /// Total number of fragments derived from the source.
    pub total_chunks: usize,
}

// ============================================================================
// Chunking
// ============================================================================

/// Split `text` into fragments of at most `max_words` words.
///
/// Words are whitespace-separated; order is preserved and runs are
/// re-joined with single spaces. Empty or whitespace-only input yields
/// zero fragments, which callers must treat as "nothing to ingest", not
/// as an error.
pub fn chunk_words(text: &str, source: &str, max_words: usize) -> Vec<Fragment> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return vec![];
    }

    let max_words = max_words.max(1);
    let total_chunks = words.len().div_ceil(max_words);

    words
        .chunks(max_words)
        .enumerate()
        .map(|(chunk_index, run)| Fragment {
            content: run.join(" "),
            source: source.to_string(),
            chunk_index,
            total_chunks,
        })
        .collect()
}

/// Adapt pre-chunked parts (already split upstream) into fragments.
///
/// Blank parts are dropped before positions are assigned, so the
/// resulting fragments satisfy the same index/total invariant as
/// [`chunk_words`] output.
pub fn fragments_from_parts(parts: Vec<String>, source: &str) -> Vec<Fragment> {
    let kept: Vec<String> = parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    let total_chunks = kept.len();
    kept.into_iter()
        .enumerate()
        .map(|(chunk_index, content)| Fragment {
            content,
            source: source.to_string(),
            chunk_index,
            total_chunks,
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
