//! # paper-decoder
//!
//! Make a research paper readable: extract its text, pick out the jargon,
//! explain it, find related code, and summarise the whole thing.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Extract   text layer via pdf-extract (CPU-bound, spawn_blocking)
//!  ├─ 3. Chunk     fixed-size character windows (default 3000)
//!  ├─ 4. Terms     assistant call: JSON array of technical terms
//!  ├─ 5. Explain   assistant call with web search: term → explanation
//!  ├─ 6. Overview  assistant call with DeepWiki + web search:
//!  │               explanation and related GitHub repositories
//!  └─ 7. Report    aggregated AnalysisResult + console rendering
//! ```
//!
//! Steps 4–6 run on the hosted OpenAI Responses API, where web search and
//! the DeepWiki MCP server execute on the host. Other providers supported
//! by `edgequake-llm` work too, without tools.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paper_decoder::{decode, render, DecoderConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads OPENAI_API_KEY from the environment.
//!     let config = DecoderConfig::default();
//!     let result = decode("https://arxiv.org/pdf/1706.03762", &config).await?;
//!     println!("{}", render(&result));
//!     for w in result.warnings() {
//!         eprintln!("degraded: {w}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paper-decoder` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! paper-decoder = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assistant;
pub mod config;
pub mod decode;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod tools;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assistant::{
    AssistantBackend, AssistantClient, AssistantRequest, AssistantResponse, ChatBackend,
    ResponsesBackend, SessionId, SessionStatus,
};
pub use config::{DecoderConfig, DecoderConfigBuilder};
pub use decode::{
    analyze_document, decode, decode_from_bytes, decode_sync, decode_to_file, inspect,
};
pub use error::{AssistantError, DecoderError, Stage, StageWarning, WarningKind};
pub use output::{AnalysisResult, DocumentSummary, Repository, RunStats};
pub use pipeline::chunk::{chunk, Chunk, Chunks};
pub use pipeline::extract::Document;
pub use pipeline::parse::{parse_comprehensive, parse_explanations, parse_terms, Parsed};
pub use pipeline::report::render;
pub use progress::{DecodeProgressCallback, NoopProgressCallback, ProgressCallback};
pub use tools::{ToolConfiguration, ToolKind, ToolSet};
