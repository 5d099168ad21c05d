//! Configuration types for a paper-decoding run.
//!
//! All run behaviour is controlled through [`DecoderConfig`], built via its
//! [`DecoderConfigBuilder`]. Keeping every knob in one struct makes it easy
//! to share a config between the CLI and library callers, log it, and diff
//! two runs to understand why their reports differ.

use crate::assistant::AssistantBackend;
use crate::error::DecoderError;
use crate::progress::ProgressCallback;
use crate::tools::ToolSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default model identifier for the hosted assistant.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default base URL of the OpenAI-compatible Responses API.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Configuration for a paper-decoding run.
///
/// Built via [`DecoderConfig::builder()`] or using
/// [`DecoderConfig::default()`].
///
/// # Example
/// ```rust
/// use paper_decoder::DecoderConfig;
///
/// let config = DecoderConfig::builder()
///     .model("gpt-4o-mini")
///     .chunk_size(4000)
///     .max_terms(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct DecoderConfig {
    /// Model identifier passed to the assistant. Default: `gpt-4o`.
    pub model: String,

    /// Provider name. `None` or `"openai"` drives the hosted Responses API
    /// with tools; any other name (`"anthropic"`, `"gemini"`, `"ollama"`, …)
    /// falls back to plain chat completions without hosted tools.
    pub provider_name: Option<String>,

    /// Pre-constructed backend. Takes precedence over `provider_name`.
    pub backend: Option<Arc<dyn AssistantBackend>>,

    /// API key for the Responses API. Falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,

    /// Base URL of the Responses API. Default: `https://api.openai.com/v1`.
    pub api_base: String,

    /// Sampling temperature. Default: 0.3.
    ///
    /// Low enough that term lists stay stable between runs, high enough
    /// that explanations read naturally.
    pub temperature: f32,

    /// Maximum output tokens per assistant call. Default: 2048.
    pub max_output_tokens: usize,

    /// Chunk size in characters. Default: 3000.
    pub chunk_size: usize,

    /// How many leading chunks are analysed. Default: 1.
    pub max_chunks: usize,

    /// Upper bound on reported (and explained) technical terms. Default: 5.
    pub max_terms: usize,

    /// Retries after a connection failure. Default: 3.
    ///
    /// Only connection failures are retried; tool timeouts, incomplete
    /// responses and API rejections degrade the stage instead.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Delay between completion polls in milliseconds. Default: 1000.
    pub poll_interval_ms: u64,

    /// Bound on waiting for one assistant call to complete, in seconds. Default: 180.
    ///
    /// Tool-augmented calls routinely take 20–60 s because the model runs
    /// several searches before answering.
    pub response_timeout_secs: u64,

    /// Per-HTTP-request timeout in seconds. Default: 60.
    pub request_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// String inserted between pages of extracted text. Default: `"\n"`.
    pub page_separator: String,

    /// Tools attached to assistant calls. Default: web search + DeepWiki.
    pub tools: ToolSet,

    /// Optional progress callback invoked around each stage.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            backend: None,
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            temperature: 0.3,
            max_output_tokens: 2048,
            chunk_size: 3000,
            max_chunks: 1,
            max_terms: 5,
            max_retries: 3,
            retry_backoff_ms: 500,
            poll_interval_ms: 1000,
            response_timeout_secs: 180,
            request_timeout_secs: 60,
            download_timeout_secs: 120,
            page_separator: "\n".to_string(),
            tools: ToolSet::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DecoderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("chunk_size", &self.chunk_size)
            .field("max_chunks", &self.max_chunks)
            .field("max_terms", &self.max_terms)
            .field("max_retries", &self.max_retries)
            .field("response_timeout_secs", &self.response_timeout_secs)
            .field("tools", &self.tools)
            .finish()
    }
}

impl DecoderConfig {
    /// Create a new builder for `DecoderConfig`.
    pub fn builder() -> DecoderConfigBuilder {
        DecoderConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    /// Whether the configured provider is the hosted Responses API.
    pub fn uses_hosted_tools(&self) -> bool {
        self.provider_name
            .as_deref()
            .map(|p| p.eq_ignore_ascii_case("openai"))
            .unwrap_or(true)
    }
}

/// Builder for [`DecoderConfig`].
pub struct DecoderConfigBuilder {
    config: DecoderConfig,
}

impl fmt::Debug for DecoderConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl DecoderConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn AssistantBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.chunk_size = n;
        self
    }

    pub fn max_chunks(mut self, n: usize) -> Self {
        self.config.max_chunks = n;
        self
    }

    pub fn max_terms(mut self, n: usize) -> Self {
        self.config.max_terms = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn response_timeout_secs(mut self, secs: u64) -> Self {
        self.config.response_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn page_separator(mut self, sep: impl Into<String>) -> Self {
        self.config.page_separator = sep.into();
        self
    }

    pub fn tools(mut self, tools: ToolSet) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DecoderConfig, DecoderError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(DecoderError::InvalidConfig("Model must not be empty".into()));
        }
        if c.chunk_size == 0 {
            return Err(DecoderError::InvalidConfig(
                "Chunk size must be ≥ 1".into(),
            ));
        }
        if c.max_chunks == 0 {
            return Err(DecoderError::InvalidConfig(
                "Max chunks must be ≥ 1".into(),
            ));
        }
        if c.max_terms == 0 {
            return Err(DecoderError::InvalidConfig("Max terms must be ≥ 1".into()));
        }
        if c.max_output_tokens == 0 {
            return Err(DecoderError::InvalidConfig(
                "Max output tokens must be ≥ 1".into(),
            ));
        }
        if c.response_timeout_secs == 0 {
            return Err(DecoderError::InvalidConfig(
                "Response timeout must be ≥ 1s".into(),
            ));
        }
        if !(c.api_base.starts_with("https://") || c.api_base.starts_with("http://")) {
            return Err(DecoderError::InvalidConfig(format!(
                "API base must be an HTTP/HTTPS URL, got '{}'",
                c.api_base
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = DecoderConfig::default();
        assert_eq!(c.model, "gpt-4o");
        assert_eq!(c.temperature, 0.3);
        assert_eq!(c.max_output_tokens, 2048);
        assert_eq!(c.chunk_size, 3000);
        assert_eq!(c.max_chunks, 1);
        assert_eq!(c.max_terms, 5);
        assert!(c.uses_hosted_tools());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = DecoderConfig::builder().chunk_size(0).build().unwrap_err();
        assert!(err.to_string().contains("Chunk size"));
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(DecoderConfig::builder().max_terms(0).build().is_err());
        assert!(DecoderConfig::builder().max_chunks(0).build().is_err());
        assert!(DecoderConfig::builder().response_timeout_secs(0).build().is_err());
    }

    #[test]
    fn api_base_trailing_slash_is_trimmed() {
        let c = DecoderConfig::builder()
            .api_base("http://localhost:8080/v1/")
            .build()
            .unwrap();
        assert_eq!(c.api_base, "http://localhost:8080/v1");
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = DecoderConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn non_openai_provider_disables_hosted_tools() {
        let c = DecoderConfig::builder()
            .provider_name("anthropic")
            .build()
            .unwrap();
        assert!(!c.uses_hosted_tools());
    }
}
