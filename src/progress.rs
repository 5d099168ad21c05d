//! Progress-callback trait for per-stage decoding events.
//!
//! Inject an [`Arc<dyn DecodeProgressCallback>`] via
//! [`crate::config::DecoderConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its assistant calls.
//!
//! # Example
//!
//! ```rust
//! use paper_decoder::{DecodeProgressCallback, DecoderConfig, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl DecodeProgressCallback for CountingCallback {
//!     fn on_stage_complete(&self, stage: Stage, chunk_index: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage} done for chunk {chunk_index}");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = DecoderConfig::builder()
//!     .progress_callback(counter as Arc<dyn DecodeProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::Stage;
use std::sync::Arc;

/// Called by the pipeline as it runs each assistant-backed stage.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait DecodeProgressCallback: Send + Sync {
    /// Called once after chunking, before the first assistant call.
    ///
    /// # Arguments
    /// * `total_calls` — number of assistant calls the run plans to make
    ///   (fallback calls after a tool timeout are not counted)
    fn on_run_start(&self, total_calls: usize) {
        let _ = total_calls;
    }

    /// Called just before a stage submits its request.
    fn on_stage_start(&self, stage: Stage, chunk_index: usize) {
        let _ = (stage, chunk_index);
    }

    /// Called when a stage finished, degraded or not.
    fn on_stage_complete(&self, stage: Stage, chunk_index: usize) {
        let _ = (stage, chunk_index);
    }

    /// Called when a stage degraded (tool timeout, incomplete response,
    /// unparsable output). The run continues.
    fn on_stage_warning(&self, stage: Stage, chunk_index: usize, message: &str) {
        let _ = (stage, chunk_index, message);
    }

    /// Called once after the report has been aggregated.
    ///
    /// # Arguments
    /// * `calls`    — assistant calls actually made
    /// * `warnings` — number of degraded stages
    fn on_run_complete(&self, calls: usize, warnings: usize) {
        let _ = (calls, warnings);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl DecodeProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::DecoderConfig`].
pub type ProgressCallback = Arc<dyn DecodeProgressCallback>;
