//! CLI binary for paper-decoder.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `DecoderConfig` and prints the report.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use paper_decoder::config::{DEFAULT_API_BASE, DEFAULT_MODEL};
use paper_decoder::decode::write_atomic;
use paper_decoder::{
    decode, inspect, render, DecodeProgressCallback, DecoderConfig, ProgressCallback, Stage,
    ToolSet,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar step per assistant stage, with a log
/// line for every finished or degraded stage.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Wall-clock start of each running stage.
    start_times: Mutex<HashMap<(Stage, usize), Instant>>,
    warnings: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Extracting text…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            warnings: AtomicUsize::new(0),
        })
    }

    /// Stop the spinner after a fatal error so the error prints on a clean line.
    fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }

    fn elapsed(&self, stage: Stage, chunk_index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&(stage, chunk_index)))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl DecodeProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_calls: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:32.green/238}] {pos}/{len} stages  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_calls as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Decoding");
        self.bar.reset_eta();
    }

    fn on_stage_start(&self, stage: Stage, chunk_index: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert((stage, chunk_index), Instant::now());
        }
        self.bar.set_message(format!("{stage} (chunk {chunk_index})"));
    }

    fn on_stage_complete(&self, stage: Stage, chunk_index: usize) {
        let secs = self.elapsed(stage, chunk_index);
        self.bar.println(format!(
            "  {} {:<26} chunk {:<3} {}",
            green("✓"),
            stage.as_str(),
            chunk_index,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_stage_warning(&self, stage: Stage, chunk_index: usize, message: &str) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
        // Keep long provider messages to one terminal line.
        let msg: String = if message.chars().count() > 80 {
            format!("{}\u{2026}", message.chars().take(79).collect::<String>())
        } else {
            message.to_string()
        };
        self.bar.println(format!(
            "  {} {:<26} chunk {:<3} {}",
            yellow("⚠"),
            stage.as_str(),
            chunk_index,
            yellow(&msg),
        ));
    }

    fn on_run_complete(&self, calls: usize, warnings: usize) {
        self.bar.finish_and_clear();
        if warnings == 0 {
            eprintln!(
                "{} decoded with {} assistant calls",
                green("✔"),
                bold(&calls.to_string())
            );
        } else {
            eprintln!(
                "{} decoded with {} assistant calls  ({} degraded stages)",
                yellow("⚠"),
                bold(&calls.to_string()),
                yellow(&warnings.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Decode a local paper (report on stdout)
  paper-decoder paper.pdf

  # Decode from a URL and save the report
  paper-decoder https://arxiv.org/pdf/1706.03762 -o attention.txt

  # Structured JSON output
  paper-decoder --json paper.pdf > paper.json

  # Analyse the first three chunks, explain up to eight terms
  paper-decoder --max-chunks 3 --max-terms 8 paper.pdf

  # Custom tool set (JSON array of Responses API tool descriptors)
  paper-decoder --tools tools.json paper.pdf

  # Page / character / chunk counts only (no API key needed)
  paper-decoder --inspect-only paper.pdf

PROVIDERS:
  openai (default)   Responses API with hosted web search and the DeepWiki
                     MCP server. Needs OPENAI_API_KEY.
  anthropic, gemini, ollama, …
                     Plain chat completions through edgequake-llm. Web search
                     and repository lookup are unavailable.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  OPENAI_BASE_URL         Responses API base URL
  ANTHROPIC_API_KEY       Anthropic API key (with --provider anthropic)
  GEMINI_API_KEY          Google Gemini API key (with --provider gemini)
  PAPER_DECODER_*         Every flag, e.g. PAPER_DECODER_MODEL, PAPER_DECODER_CHUNK_SIZE
  RUST_LOG                Override log filter (e.g. paper_decoder=debug)

EXIT STATUS:
  0  report produced (possibly with degraded stages, listed under WARNINGS)
  1  fatal error: unreadable input, no text layer, configuration,
     or the model host unreachable
"#;

/// Decode research papers: technical terms, explanations, related code.
#[derive(Parser, Debug)]
#[command(
    name = "paper-decoder",
    version,
    about = "Explain research papers: technical terms, related repositories, plain-language summary",
    long_about = "Extract the text of a research paper (local PDF or URL), identify its technical \
terms, explain them with web search, find related GitHub repositories through DeepWiki, and \
write a comprehensive plain-language explanation.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the report to this file instead of stdout.
    #[arg(short, long, env = "PAPER_DECODER_OUTPUT")]
    output: Option<PathBuf>,

    /// Model ID (e.g. gpt-4o, gpt-4.1, gpt-4o-mini).
    #[arg(long, env = "PAPER_DECODER_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Provider: openai (hosted tools) or any edgequake-llm provider.
    #[arg(long, env = "PAPER_DECODER_PROVIDER")]
    provider: Option<String>,

    /// API key for the Responses API.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of the Responses API.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "PAPER_DECODER_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Max output tokens per assistant call.
    #[arg(long, env = "PAPER_DECODER_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Chunk size in characters.
    #[arg(long, env = "PAPER_DECODER_CHUNK_SIZE", default_value_t = 3000)]
    chunk_size: usize,

    /// Number of leading chunks to analyse.
    #[arg(long, env = "PAPER_DECODER_MAX_CHUNKS", default_value_t = 1)]
    max_chunks: usize,

    /// Maximum number of technical terms to report and explain.
    #[arg(long, env = "PAPER_DECODER_MAX_TERMS", default_value_t = 5)]
    max_terms: usize,

    /// Retries after a connection failure.
    #[arg(long, env = "PAPER_DECODER_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Seconds to wait for one assistant call to complete.
    #[arg(long, env = "PAPER_DECODER_RESPONSE_TIMEOUT", default_value_t = 180)]
    response_timeout: u64,

    /// Per-HTTP-request timeout in seconds.
    #[arg(long, env = "PAPER_DECODER_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PAPER_DECODER_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// JSON file with the tool descriptors to attach (default: web search + DeepWiki).
    #[arg(long, env = "PAPER_DECODER_TOOLS", conflicts_with = "no_tools")]
    tools: Option<PathBuf>,

    /// Run without any hosted tools.
    #[arg(long, env = "PAPER_DECODER_NO_TOOLS")]
    no_tools: bool,

    /// Output the structured result as JSON instead of the text report.
    #[arg(long, env = "PAPER_DECODER_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PAPER_DECODER_NO_PROGRESS")]
    no_progress: bool,

    /// Print page, character and chunk counts only; no assistant calls.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAPER_DECODER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAPER_DECODER_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let config = build_config(&cli, None)?;
        let summary = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
            );
        } else {
            println!("Source:       {}", summary.source);
            println!("Pages:        {}", summary.page_count);
            println!("Characters:   {}", summary.char_count);
            println!("Words:        {}", summary.word_count);
            println!("Chunks:       {} (at {} chars)", summary.chunk_count, config.chunk_size);
            println!("Text layer:   {}", if summary.has_text_layer { "yes" } else { "no (scanned?)" });
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let cli_progress = show_progress.then(CliProgressCallback::new);
    let progress_cb: Option<ProgressCallback> = cli_progress
        .clone()
        .map(|cb| cb as Arc<dyn DecodeProgressCallback>);
    let abandon_progress = || {
        if let Some(ref cb) = cli_progress {
            cb.abandon();
        }
    };

    let config = build_config(&cli, progress_cb).inspect_err(|_| abandon_progress())?;

    // ── Run ──────────────────────────────────────────────────────────────
    let result = decode(&cli.input, &config)
        .await
        .inspect_err(|_| abandon_progress())
        .context("Decoding failed")?;

    let text = if cli.json {
        serde_json::to_string_pretty(&result).context("Failed to serialise result")?
    } else {
        render(&result)
    };

    if let Some(ref output_path) = cli.output {
        write_atomic(output_path, &text)
            .await
            .context("Failed to write report")?;
        if !cli.quiet {
            eprintln!(
                "{}  {}  →  {}",
                if result.is_partial() { yellow("⚠") } else { green("✔") },
                bold(&format!("{} terms, {} repositories", result.technical_terms().len(), result.repositories().len())),
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(text.as_bytes())
            .context("Failed to write to stdout")?;
        if !text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !cli.json {
        let stats = result.stats();
        eprintln!(
            "   {} tokens in  /  {} tokens out  —  {}ms total",
            dim(&stats.total_input_tokens.to_string()),
            dim(&stats.total_output_tokens.to_string()),
            stats.total_duration_ms,
        );
        if result.is_partial() {
            eprintln!(
                "   {} see WARNINGS in the report for degraded stages",
                cyan("ℹ")
            );
        }
    }

    Ok(())
}

/// Map CLI args to `DecoderConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<DecoderConfig> {
    let tools = if cli.no_tools {
        ToolSet::none()
    } else if let Some(ref path) = cli.tools {
        ToolSet::from_file(path).context("Failed to load tool configuration")?
    } else {
        ToolSet::default()
    };

    let mut builder = DecoderConfig::builder()
        .model(&cli.model)
        .api_base(&cli.api_base)
        .temperature(cli.temperature)
        .max_output_tokens(cli.max_tokens)
        .chunk_size(cli.chunk_size)
        .max_chunks(cli.max_chunks)
        .max_terms(cli.max_terms)
        .max_retries(cli.max_retries)
        .response_timeout_secs(cli.response_timeout)
        .request_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .tools(tools);

    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abandon_clears_a_running_bar() {
        let cb = CliProgressCallback::new();
        cb.on_run_start(3);
        cb.on_stage_start(Stage::TermExtraction, 0);
        cb.abandon();
        assert!(cb.bar.is_finished());
        // A second call after a normal finish is harmless.
        cb.abandon();
    }

    #[test]
    fn no_tools_flag_builds_an_empty_tool_set() {
        let cli = Cli::parse_from(["paper-decoder", "paper.pdf", "--no-tools"]);
        let config = build_config(&cli, None).unwrap();
        assert!(config.tools.all().is_empty());
    }
}
