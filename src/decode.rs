//! Top-level entry points: decode a paper from a path, URL or bytes.
//!
//! A run is one straight sequence:
//!
//! ```text
//! resolve input ─▶ extract text ─▶ chunk ─▶ terms ─▶ explanations ─▶ comprehensive ─▶ report
//! ```
//!
//! Only input, extraction, configuration and connection failures are
//! fatal. Everything an assistant stage can get wrong shows up as a
//! [`crate::error::StageWarning`] on an otherwise complete report.

use crate::assistant::{AssistantBackend, AssistantClient, ChatBackend, ResponsesBackend};
use crate::config::DecoderConfig;
use crate::error::DecoderError;
use crate::output::{AnalysisResult, DocumentSummary, RunStats};
use crate::pipeline::chunk::{chunk, chunk_count, Chunk};
use crate::pipeline::extract::{self, Document};
use crate::pipeline::input;
use crate::pipeline::llm;
use crate::pipeline::report::{aggregate, render, AggregateInput};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Source name recorded for in-memory input.
const MEMORY_SOURCE: &str = "<memory>";

/// Decode a PDF file or URL into an [`AnalysisResult`].
///
/// # Errors
/// Returns `Err(DecoderError)` only for fatal errors:
/// - file not found, unreadable, not a PDF, encrypted or corrupt
/// - no text layer (scanned document)
/// - no assistant provider configured
/// - the model host unreachable after the retry budget
///
/// Degraded stages (tool timeouts, unparsable answers) still return `Ok`;
/// see [`AnalysisResult::warnings`].
pub async fn decode(
    input_str: impl AsRef<str>,
    config: &DecoderConfig,
) -> Result<AnalysisResult, DecoderError> {
    let start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting decode: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    decode_path(resolved.path(), &resolved.source_name(), config, start).await
}

/// Decode PDF bytes held in memory.
///
/// The bytes are written to a managed temp file that is removed when this
/// returns.
pub async fn decode_from_bytes(
    bytes: &[u8],
    config: &DecoderConfig,
) -> Result<AnalysisResult, DecoderError> {
    let start = Instant::now();
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(DecoderError::NotAPdf {
            path: PathBuf::from(MEMORY_SOURCE),
            magic,
        });
    }
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| DecoderError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| DecoderError::Internal(format!("tempfile write: {e}")))?;
    decode_path(tmp.path(), MEMORY_SOURCE, config, start).await
}

/// Synchronous wrapper around [`decode`].
///
/// Creates a temporary tokio runtime internally.
pub fn decode_sync(
    input_str: impl AsRef<str>,
    config: &DecoderConfig,
) -> Result<AnalysisResult, DecoderError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DecoderError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(decode(input_str, config))
}

/// Decode a paper and write the rendered report to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn decode_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &DecoderConfig,
) -> Result<AnalysisResult, DecoderError> {
    let result = decode(input_str, config).await?;
    write_atomic(output_path.as_ref(), &render(&result)).await?;
    Ok(result)
}

/// Run the assistant stages over an already-extracted document.
///
/// Useful when the text comes from somewhere other than a PDF.
pub async fn analyze_document(
    document: &Document,
    config: &DecoderConfig,
) -> Result<AnalysisResult, DecoderError> {
    let backend = resolve_backend(config)?;
    analyze(document, backend, config, 0, Instant::now()).await
}

/// Describe a PDF without calling the model: pages, characters, chunks.
///
/// Does not require a provider or API key.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &DecoderConfig,
) -> Result<DocumentSummary, DecoderError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let document = extract::extract(
        resolved.path(),
        &resolved.source_name(),
        &config.page_separator,
    )
    .await?;
    Ok(summarize(&document, config.chunk_size))
}

/// Summary of an extracted document at `chunk_size`.
pub fn summarize(document: &Document, chunk_size: usize) -> DocumentSummary {
    let char_count = document.char_count();
    DocumentSummary {
        source: document.source().to_string(),
        page_count: document.page_count(),
        char_count,
        word_count: document.word_count(),
        chunk_count: chunk_count(char_count, chunk_size),
        has_text_layer: !document.is_blank(),
    }
}

/// Write `contents` to `path` through a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), DecoderError> {
    let write_err = |e| DecoderError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name: OsString = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn decode_path(
    pdf_path: &Path,
    source: &str,
    config: &DecoderConfig,
    start: Instant,
) -> Result<AnalysisResult, DecoderError> {
    let backend = resolve_backend(config)?;

    let extract_start = Instant::now();
    let document = extract::extract(pdf_path, source, &config.page_separator).await?;
    let extract_ms = extract_start.elapsed().as_millis() as u64;

    analyze(&document, backend, config, extract_ms, start).await
}

async fn analyze(
    document: &Document,
    backend: Arc<dyn AssistantBackend>,
    config: &DecoderConfig,
    extract_duration_ms: u64,
    start: Instant,
) -> Result<AnalysisResult, DecoderError> {
    if document.is_blank() {
        return Err(DecoderError::NoTextLayer {
            source_name: document.source().to_string(),
            pages: document.page_count(),
        });
    }

    let total_chunks = chunk_count(document.char_count(), config.chunk_size);
    let chunks: Vec<Chunk<'_>> = chunk(document, config.chunk_size)
        .take(config.max_chunks)
        .collect();
    info!(
        "Document has {} chars in {} chunks; analysing {}",
        document.char_count(),
        total_chunks,
        chunks.len()
    );

    let client = AssistantClient::from_config(backend, config);
    info!("Using assistant backend '{}'", client.backend_name());

    let progress: ProgressCallback = config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback));

    let out = llm::run_stages(&client, &chunks, config.max_terms, &progress).await?;

    let stats = RunStats {
        document_chars: document.char_count(),
        total_chunks,
        assistant_calls: out.assistant_calls,
        total_input_tokens: out.input_tokens,
        total_output_tokens: out.output_tokens,
        extract_duration_ms,
        assistant_duration_ms: out.duration_ms,
        total_duration_ms: start.elapsed().as_millis() as u64,
    };

    let result = aggregate(AggregateInput {
        source: document.source().to_string(),
        first_chunk: chunks.first().map(|c| c.text.to_string()).unwrap_or_default(),
        chunks_processed: chunks.len(),
        terms: out.terms,
        explanations: out.explanations,
        repositories: out.repositories,
        comprehensive_explanation: out.comprehensive_explanation,
        warnings: out.warnings,
        stats,
    });

    info!(
        "Decode complete: {} terms, {} repositories, {} warnings, {}ms total",
        result.technical_terms().len(),
        result.repositories().len(),
        result.warnings().len(),
        result.stats().total_duration_ms
    );
    Ok(result)
}

/// Resolve the assistant backend, from most-specific to least-specific.
///
/// 1. **Pre-built backend** (`config.backend`), used as-is.
/// 2. **Hosted Responses API** when the provider is unset or `"openai"` and
///    an API key is available (`config.api_key`, then `OPENAI_API_KEY`).
/// 3. **Named chat provider** (`config.provider_name`) through
///    [`ProviderFactory::create_llm_provider`]; no hosted tools.
/// 4. **Auto-detection** (`ProviderFactory::from_env`) when nothing is set.
pub fn resolve_backend(config: &DecoderConfig) -> Result<Arc<dyn AssistantBackend>, DecoderError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    if config.uses_hosted_tools() {
        let key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()));
        match key {
            Some(key) => {
                return Ok(Arc::new(ResponsesBackend::from_config(config, key)?));
            }
            None if config.provider_name.is_some() => {
                return Err(DecoderError::ProviderNotConfigured {
                    provider: "openai".to_string(),
                    hint: "Set OPENAI_API_KEY or pass --api-key.".to_string(),
                });
            }
            None => debug!("No OpenAI key found; trying other providers"),
        }
    }

    let (label, provider) = match config.provider_name {
        Some(ref name) => (name.clone(), create_chat_provider(name, &config.model)?),
        None => {
            let (llm_provider, _embedding) =
                ProviderFactory::from_env().map_err(|e| DecoderError::ProviderNotConfigured {
                    provider: "auto".to_string(),
                    hint: format!(
                        "No LLM provider could be auto-detected from environment.\n\
                        Set OPENAI_API_KEY (recommended: enables web search and repository lookup)\n\
                        or ANTHROPIC_API_KEY / GEMINI_API_KEY.\n\
                        Error: {}",
                        e
                    ),
                })?;
            ("auto".to_string(), llm_provider)
        }
    };

    warn!(
        "Provider '{}' has no hosted tools; web search and repository lookup are disabled",
        label
    );
    Ok(Arc::new(ChatBackend::new(provider, label)))
}

fn create_chat_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DecoderError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DecoderError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_chunks_at_configured_size() {
        let doc = Document::new("p.pdf", "a".repeat(7001));
        let s = summarize(&doc, 3000);
        assert_eq!(s.chunk_count, 3);
        assert_eq!(s.char_count, 7001);
        assert!(s.has_text_layer);

        let blank = Document::new("scan.pdf", "  \n ");
        assert!(!summarize(&blank, 3000).has_text_layer);
    }

    #[tokio::test]
    async fn bytes_without_pdf_header_are_rejected() {
        let config = DecoderConfig::default();
        let err = decode_from_bytes(b"GIF89a", &config).await.unwrap_err();
        match err {
            DecoderError::NotAPdf { magic, .. } => assert_eq!(&magic, b"GIF8"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.txt");
        write_atomic(&path, "TECHNICAL TERMS").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "TECHNICAL TERMS");
        assert!(!dir.path().join("nested").join("report.txt.tmp").exists());
    }

    #[test]
    fn explicit_key_selects_hosted_backend() {
        let config = DecoderConfig::builder().api_key("sk-test").build().unwrap();
        let backend = resolve_backend(&config).unwrap();
        assert_eq!(backend.name(), "openai-responses");
    }
}
