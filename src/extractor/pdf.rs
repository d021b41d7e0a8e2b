//! PDF text extraction via the pdf-extract crate.

use std::path::Path;

use crate::error::RagError;

/// Extract the full text of a PDF.
///
/// Scanned PDFs with no text layer yield an empty string; the caller
/// treats that as nothing to ingest.
pub fn extract_text_from_pdf(path: &Path) -> Result<String, RagError> {
    let bytes = std::fs::read(path)
        .map_err(|e| RagError::Validation(format!("failed to read PDF {path:?}: {e}")))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| RagError::Validation(format!("PDF processing failed for {path:?}: {e}")))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "no text extracted from PDF {:?}; it might be a scanned document",
            path
        );
        return Ok(String::new());
    }

    Ok(text)
}

/// Split PDF text into pages on the form-feed separator. Falls back to a
/// single page when no separator is present.
pub fn split_pdf_pages(text: &str) -> Vec<String> {
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.is_empty() {
        vec![text.trim().to_string()]
    } else {
        pages
    }
}

// ============================================================================
// Tests
// ============================================================================
