//! Result types returned by a decoding run.

use crate::error::StageWarning;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Explanation used for a term the model did not explain.
pub const MISSING_EXPLANATION: &str = "No explanation available.";

/// Comprehensive explanation used when every attempt failed.
pub const MISSING_COMPREHENSIVE: &str = "No comprehensive explanation available.";

/// A repository related to the paper, as suggested by the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// `owner/repo` or a project name. Never empty.
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Characters in the extracted document.
    pub document_chars: usize,
    /// Chunks the document splits into at the configured size.
    pub total_chunks: usize,
    /// Assistant calls made, including fallback calls.
    pub assistant_calls: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub extract_duration_ms: u64,
    pub assistant_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// The final report of a run.
///
/// Constructed once by [`crate::pipeline::report::aggregate`], which
/// enforces the invariants below; read-only afterwards.
///
/// * `explanations` has exactly the keys in `technical_terms`.
/// * Every repository has a non-empty name; names are unique
///   (case-insensitive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub(crate) source: String,
    pub(crate) chunks_processed: usize,
    pub(crate) chunk_preview: String,
    pub(crate) technical_terms: Vec<String>,
    pub(crate) explanations: BTreeMap<String, String>,
    pub(crate) repositories: Vec<Repository>,
    pub(crate) comprehensive_explanation: String,
    pub(crate) warnings: Vec<StageWarning>,
    pub(crate) stats: RunStats,
}

impl AnalysisResult {
    /// Path or URL the document was read from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn chunks_processed(&self) -> usize {
        self.chunks_processed
    }

    /// First 200 characters of the first analysed chunk.
    pub fn chunk_preview(&self) -> &str {
        &self.chunk_preview
    }

    pub fn technical_terms(&self) -> &[String] {
        &self.technical_terms
    }

    pub fn explanations(&self) -> &BTreeMap<String, String> {
        &self.explanations
    }

    /// Explanation for `term`, if it is one of the reported terms.
    pub fn explanation(&self, term: &str) -> Option<&str> {
        self.explanations.get(term).map(String::as_str)
    }

    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    pub fn comprehensive_explanation(&self) -> &str {
        &self.comprehensive_explanation
    }

    /// Non-fatal failures recorded during the run.
    pub fn warnings(&self) -> &[StageWarning] {
        &self.warnings
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Whether any stage degraded.
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// What `inspect` reports about a PDF without calling the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub source: String,
    pub page_count: usize,
    pub char_count: usize,
    pub word_count: usize,
    /// Chunks at the configured chunk size.
    pub chunk_count: usize,
    pub has_text_layer: bool,
}
