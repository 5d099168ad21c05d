//! Error types for the paper-decoder library.
//!
//! Three types reflect three failure modes:
//!
//! * [`DecoderError`] — **Fatal**: the run cannot produce a report at all
//!   (bad input file, no text layer, model host unreachable after retries).
//!   Returned as `Err(DecoderError)` from the top-level `decode*` functions.
//!
//! * [`AssistantError`] — the outcome of a single assistant call. Connection
//!   and authentication failures escalate to [`DecoderError::Connection`];
//!   everything else degrades that call's contribution.
//!
//! * [`StageWarning`] — **Non-fatal**: a stage degraded (tool timeout,
//!   incomplete response, unparsable output). Stored inside
//!   [`crate::output::AnalysisResult`] so callers can see what is missing
//!   from an otherwise successful report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the paper-decoder library.
#[derive(Debug, Error)]
pub enum DecoderError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The PDF could not be parsed by the text extractor.
    #[error("PDF '{path}' could not be parsed: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The PDF is encrypted; text extraction is not possible.
    #[error("PDF '{path}' is encrypted.\nDecrypt it first, e.g.: qpdf --decrypt input.pdf output.pdf")]
    PasswordRequired { path: PathBuf },

    /// Extraction succeeded but produced no text (scanned / image-only PDF).
    #[error(
        "No extractable text in '{source_name}' ({pages} pages).\n\
The document is probably scanned or image-only; run it through OCR first."
    )]
    NoTextLayer { source_name: String, pages: usize },

    // ── Assistant errors ──────────────────────────────────────────────────
    /// No assistant backend could be constructed (missing API key etc.).
    #[error("Assistant provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model host was unreachable or rejected our credentials, after
    /// the retry budget was exhausted.
    #[error("Connection to the model host failed during {stage} (chunk {chunk}): {source}")]
    Connection {
        stage: Stage,
        chunk: usize,
        #[source]
        source: AssistantError,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output report file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of a single assistant call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssistantError {
    /// Network failure, HTTP 408/429/5xx, or a transport timeout. Retried.
    #[error("connection failed: {detail}")]
    Connection { detail: String },

    /// HTTP 401/403; retrying will not help.
    #[error("authentication rejected by '{provider}': {detail}")]
    Auth { provider: String, detail: String },

    /// A hosted tool (e.g. the documentation-lookup server) did not respond
    /// within its bound.
    #[error("tool '{tool}' timed out: {detail}")]
    ToolTimeout { tool: String, detail: String },

    /// The session ended without a usable final message, or the wait for
    /// completion exceeded the configured bound.
    #[error("incomplete response: {reason}")]
    IncompleteResponse { reason: String },

    /// Any other rejection from the model host (bad request, unknown model).
    #[error("API error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Api { status: Option<u16>, message: String },
}

impl AssistantError {
    /// Whether the failure means the whole run must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Auth { .. })
    }

    /// Whether a best-effort retry is permitted.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// The three model-backed stages of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    TermExtraction,
    TermExplanation,
    Comprehensive,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::TermExtraction => "term extraction",
            Stage::TermExplanation => "term explanation",
            Stage::Comprehensive => "comprehensive explanation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a non-fatal stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    ToolTimeout,
    IncompleteResponse,
    ApiError,
    ParseError,
}

/// A non-fatal failure recorded against one stage of one chunk.
///
/// The run continues with placeholder values for whatever the stage would
/// have contributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageWarning {
    pub stage: Stage,
    pub chunk_index: usize,
    pub kind: WarningKind,
    pub detail: String,
}

impl StageWarning {
    pub fn new(stage: Stage, chunk_index: usize, kind: WarningKind, detail: impl Into<String>) -> Self {
        Self {
            stage,
            chunk_index,
            kind,
            detail: detail.into(),
        }
    }

    /// Classify a recoverable assistant error.
    pub fn from_assistant(stage: Stage, chunk_index: usize, err: &AssistantError) -> Self {
        let kind = match err {
            AssistantError::ToolTimeout { .. } => WarningKind::ToolTimeout,
            AssistantError::IncompleteResponse { .. } => WarningKind::IncompleteResponse,
            _ => WarningKind::ApiError,
        };
        Self::new(stage, chunk_index, kind, err.to_string())
    }
}

impl fmt::Display for StageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (chunk {}): {}", self.stage, self.chunk_index, self.detail)
    }
}
