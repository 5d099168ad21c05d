//! Text extraction: read the PDF text layer page by page.
//!
//! `pdf-extract` is CPU-bound and synchronous, so extraction runs on the
//! blocking pool via `spawn_blocking`. The extractor (and its font parsers)
//! can panic on malformed documents; a panicked task surfaces here as a
//! `JoinError` and is reported as a corrupt PDF instead of taking the
//! process down.

use crate::error::DecoderError;
use std::path::Path;
use tracing::{debug, info, warn};

/// The full extracted text of a paper. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    source: String,
    text: String,
    page_count: usize,
}

impl Document {
    /// Build a document from already-extracted text (one page).
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
            page_count: 1,
        }
    }

    /// Join per-page text in page order with `separator`.
    pub fn from_pages(source: impl Into<String>, pages: &[String], separator: &str) -> Self {
        Self {
            source: source.into(),
            text: pages.join(separator),
            page_count: pages.len(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Length in characters (Unicode scalar values).
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// True when there is nothing but whitespace: a scanned or image-only
    /// PDF.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Extract the text layer of the PDF at `pdf_path`.
///
/// `source` is the identifier recorded in the document (the original URL
/// for downloaded inputs). Pages are joined with `separator`.
pub async fn extract(
    pdf_path: &Path,
    source: &str,
    separator: &str,
) -> Result<Document, DecoderError> {
    let bytes = tokio::fs::read(pdf_path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DecoderError::FileNotFound {
            path: pdf_path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => DecoderError::PermissionDenied {
            path: pdf_path.to_path_buf(),
        },
        _ => DecoderError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: e.to_string(),
        },
    })?;
    debug!("Read {} bytes from {}", bytes.len(), pdf_path.display());

    let pages = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| {
        if e.is_panic() {
            warn!("Text extractor panicked on {}", pdf_path.display());
            DecoderError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: "text extractor panicked (malformed font or content stream)".into(),
            }
        } else {
            DecoderError::Internal(format!("Extraction task failed: {}", e))
        }
    })?
    .map_err(|detail| classify_extract_error(pdf_path, detail))?;

    let document = Document::from_pages(source, &pages, separator);
    info!(
        "Extracted {} chars from {} pages of {}",
        document.char_count(),
        document.page_count(),
        source
    );
    Ok(document)
}

fn classify_extract_error(pdf_path: &Path, detail: String) -> DecoderError {
    let lower = detail.to_lowercase();
    if lower.contains("encrypt") || lower.contains("password") || lower.contains("decrypt") {
        DecoderError::PasswordRequired {
            path: pdf_path.to_path_buf(),
        }
    } else {
        DecoderError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail,
        }
    }
}
