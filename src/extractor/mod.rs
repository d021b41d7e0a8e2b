//! Content extraction - the upstream text producer.
//!
//! Extraction is glue in front of the pipeline: it turns a file into
//! plain text (or, for PDFs, page-split parts) and leaves chunking to
//! the ingestion path. Supported inputs are plain text, markdown, and
//! PDFs with a text layer. Unsupported extensions and oversized files
//! are validation errors.

pub mod pdf;

use std::path::Path;

use crate::error::RagError;

/// Upload size cap.
const MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// File kinds the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileKind {
    Text,
    Pdf,
}

/// Classify a path by extension.
pub fn classify(path: &Path) -> Result<FileKind, RagError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "md" | "markdown" | "text" => Ok(FileKind::Text),
        "pdf" => Ok(FileKind::Pdf),
        _ => Err(RagError::Validation(format!(
            "unsupported file format: {path:?}"
        ))),
    }
}

/// Extracted content: the text plus optional pre-split parts (PDF pages).
#[derive(Debug, Clone)]
pub struct ExtractedText {
    /// Full extracted text.
    pub text: String,
    /// Page-split parts when the format provides a natural split.
    pub parts: Option<Vec<String>>,
}

/// Extract text from a supported file.
pub async fn extract_file(path: &Path) -> Result<ExtractedText, RagError> {
    let kind = classify(path)?;

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| RagError::Validation(format!("failed to stat {path:?}: {e}")))?;
    if metadata.len() > MAX_FILE_BYTES {
        return Err(RagError::Validation(format!(
            "file {path:?} exceeds the {} MB size limit",
            MAX_FILE_BYTES / (1024 * 1024)
        )));
    }

    match kind {
        FileKind::Text => {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| RagError::Validation(format!("failed to read {path:?}: {e}")))?;
            Ok(ExtractedText { text, parts: None })
        }
        FileKind::Pdf => {
            // pdf-extract is CPU bound; run it off the async threads.
            let owned = path.to_path_buf();
            let text = tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&owned))
                .await
                .map_err(|e| RagError::Validation(format!("PDF extraction task failed: {e}")))??;

            let parts = if text.trim().is_empty() {
                None
            } else {
                Some(pdf::split_pdf_pages(&text))
            };
            Ok(ExtractedText { text, parts })
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
