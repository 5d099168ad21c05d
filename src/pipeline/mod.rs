//! Pipeline stages for decoding a paper.
//!
//! Each submodule implements exactly one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ chunk ──▶ llm ──▶ parse ──▶ report
//! (URL/path) (text)    (windows) (assistant) (tolerant) (aggregate/render)
//! ```
//!
//! 1. [`input`]   — canonicalise the user-supplied path or URL to a local file
//! 2. [`extract`] — read the text layer; runs in `spawn_blocking`
//! 3. [`chunk`]   — fixed-size character windows
//! 4. [`llm`]     — the three assistant stages; the only step with network I/O
//! 5. [`parse`]   — recover structure from whatever the model returned
//! 6. [`report`]  — enforce report invariants and render for the console

pub mod chunk;
pub mod extract;
pub mod input;
pub mod llm;
pub mod parse;
pub mod report;
