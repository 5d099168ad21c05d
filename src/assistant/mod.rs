//! Assistant sessions: submit a prompt with tools, wait for the answer.
//!
//! A hosted assistant call is a small state machine. The request is
//! submitted, the host runs the model (and any tool calls it decides to
//! make) in the background, and the client polls until the session reaches
//! a terminal state. [`AssistantBackend`] is the seam between that state
//! machine and the wire protocol:
//!
//! * [`ResponsesBackend`] drives the hosted Responses API, where web search
//!   and MCP servers run on the host.
//! * [`ChatBackend`] wraps any `edgequake-llm` provider. Chat completions
//!   are synchronous and have no hosted tools, so the session completes at
//!   submit time and tools are ignored.
//!
//! ## Retry Strategy
//!
//! Only [`AssistantError::Connection`] is retried, with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`). A tool timeout or an incomplete
//! answer is not transient in the same way: re-running the same request
//! usually hits the same slow tool, so the pipeline degrades that stage
//! instead.

pub mod chat;
pub mod responses;

pub use chat::ChatBackend;
pub use responses::ResponsesBackend;

use crate::config::DecoderConfig;
use crate::error::{AssistantError, Stage};
use crate::tools::{ToolConfiguration, ToolKind, ToolSet};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Handle of one submitted request, as issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One assistant call: a prompt plus the tools it may use.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantRequest {
    pub stage: Stage,
    pub chunk_index: usize,
    pub prompt: String,
    pub tools: Vec<ToolConfiguration>,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: usize,
}

/// The final text of a completed session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssistantResponse {
    pub text: String,
    /// Host-side identifier, when the backend has one.
    pub response_id: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Tool invocations the host reported (searches, MCP calls).
    pub tool_calls: usize,
}

/// State of a submitted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Completed,
    Failed(AssistantError),
}

/// Wire protocol behind an [`AssistantClient`].
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Short name for logs, e.g. `"openai-responses"`.
    fn name(&self) -> &str;

    async fn submit(&self, request: &AssistantRequest) -> Result<SessionId, AssistantError>;

    async fn poll(&self, session: &SessionId) -> Result<SessionStatus, AssistantError>;

    /// Final text of a session that reported [`SessionStatus::Completed`].
    async fn fetch_result(&self, session: &SessionId) -> Result<AssistantResponse, AssistantError>;
}

/// Generation and waiting parameters shared by every call of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub poll_interval: Duration,
    pub response_timeout: Duration,
}

impl ClientSettings {
    pub fn from_config(config: &DecoderConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            poll_interval: config.poll_interval(),
            response_timeout: config.response_timeout(),
        }
    }
}

/// Runs assistant calls against one backend with one immutable tool set.
pub struct AssistantClient {
    backend: Arc<dyn AssistantBackend>,
    tools: ToolSet,
    settings: ClientSettings,
}

impl AssistantClient {
    pub fn new(backend: Arc<dyn AssistantBackend>, tools: ToolSet, settings: ClientSettings) -> Self {
        Self {
            backend,
            tools,
            settings,
        }
    }

    pub fn from_config(backend: Arc<dyn AssistantBackend>, config: &DecoderConfig) -> Self {
        Self::new(backend, config.tools.clone(), ClientSettings::from_config(config))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// Build a request carrying the configured tools of the given kinds.
    /// Kinds missing from the tool set are silently left out.
    pub fn request(
        &self,
        stage: Stage,
        chunk_index: usize,
        prompt: String,
        kinds: &[ToolKind],
    ) -> AssistantRequest {
        AssistantRequest {
            stage,
            chunk_index,
            prompt,
            tools: self.tools.select(kinds),
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            max_output_tokens: self.settings.max_output_tokens,
        }
    }

    /// Submit `request` and wait for its final text.
    ///
    /// Connection failures are retried up to `max_retries` times; every
    /// other error is returned immediately.
    pub async fn run(&self, request: &AssistantRequest) -> Result<AssistantResponse, AssistantError> {
        let mut last_err: Option<AssistantError> = None;

        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                let backoff = self.settings.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "{} (chunk {}): retry {}/{} after {}ms",
                    request.stage, request.chunk_index, attempt, self.settings.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.run_once(request).await {
                Ok(response) => {
                    debug!(
                        "{} (chunk {}): {} input tokens, {} output tokens, {} tool calls",
                        request.stage,
                        request.chunk_index,
                        response.input_tokens,
                        response.output_tokens,
                        response.tool_calls
                    );
                    return Ok(response);
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        "{} (chunk {}): attempt {} failed: {}",
                        request.stage,
                        request.chunk_index,
                        attempt + 1,
                        e
                    );
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| AssistantError::Connection {
            detail: "retry budget exhausted".into(),
        }))
    }

    async fn run_once(&self, request: &AssistantRequest) -> Result<AssistantResponse, AssistantError> {
        let session = self.backend.submit(request).await?;
        debug!(
            "{} (chunk {}): submitted session {} to {}",
            request.stage,
            request.chunk_index,
            session,
            self.backend.name()
        );

        match timeout(self.settings.response_timeout, self.wait_for_completion(&session)).await {
            Ok(result) => result,
            Err(_) => Err(AssistantError::IncompleteResponse {
                reason: format!(
                    "timed out after {}s waiting for session {}",
                    self.settings.response_timeout.as_secs_f32(),
                    session
                ),
            }),
        }
    }

    async fn wait_for_completion(&self, session: &SessionId) -> Result<AssistantResponse, AssistantError> {
        let mut polls = 0u32;
        loop {
            match self.backend.poll(session).await? {
                SessionStatus::Pending => {
                    polls += 1;
                    debug!("Session {} pending (poll {})", session, polls);
                    sleep(self.settings.poll_interval).await;
                }
                SessionStatus::Completed => return self.backend.fetch_result(session).await,
                SessionStatus::Failed(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    /// Backend whose submit/poll outcomes are scripted per call.
    #[derive(Default)]
    struct ScriptedBackend {
        submits: Mutex<VecDeque<Result<SessionId, AssistantError>>>,
        polls: Mutex<VecDeque<SessionStatus>>,
        submit_count: AtomicUsize,
        poll_count: AtomicUsize,
        seen: Mutex<Vec<AssistantRequest>>,
    }

    impl ScriptedBackend {
        fn with_submits(submits: Vec<Result<SessionId, AssistantError>>) -> Self {
            Self {
                submits: Mutex::new(submits.into()),
                ..Default::default()
            }
        }

        fn polls(self, polls: Vec<SessionStatus>) -> Self {
            *self.polls.lock().unwrap() = polls.into();
            self
        }
    }

    #[async_trait]
    impl AssistantBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn submit(&self, request: &AssistantRequest) -> Result<SessionId, AssistantError> {
            self.submit_count.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            self.submits
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(SessionId("resp_default".into())))
        }

        async fn poll(&self, _session: &SessionId) -> Result<SessionStatus, AssistantError> {
            self.poll_count.fetch_add(1, Ordering::SeqCst);
            // An exhausted script keeps the session pending forever.
            Ok(self
                .polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(SessionStatus::Pending))
        }

        async fn fetch_result(&self, session: &SessionId) -> Result<AssistantResponse, AssistantError> {
            Ok(AssistantResponse {
                text: format!("answer for {session}"),
                response_id: Some(session.to_string()),
                input_tokens: 10,
                output_tokens: 5,
                tool_calls: 0,
            })
        }
    }

    fn settings() -> ClientSettings {
        ClientSettings {
            model: "test-model".into(),
            temperature: 0.3,
            max_output_tokens: 256,
            max_retries: 2,
            retry_backoff_ms: 1,
            poll_interval: Duration::from_millis(1),
            response_timeout: Duration::from_secs(5),
        }
    }

    fn client(backend: Arc<ScriptedBackend>) -> AssistantClient {
        AssistantClient::new(backend, ToolSet::default(), settings())
    }

    fn conn() -> AssistantError {
        AssistantError::Connection {
            detail: "connection reset".into(),
        }
    }

    #[tokio::test]
    async fn completes_after_pending_polls() {
        let backend = Arc::new(ScriptedBackend::default().polls(vec![
            SessionStatus::Pending,
            SessionStatus::Pending,
            SessionStatus::Completed,
        ]));
        let c = client(backend.clone());
        let req = c.request(Stage::TermExtraction, 0, "prompt".into(), &[]);
        let resp = assert_ok!(c.run(&req).await);
        assert_eq!(resp.text, "answer for resp_default");
        assert_eq!(backend.poll_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn connection_failures_are_retried() {
        let backend = Arc::new(
            ScriptedBackend::with_submits(vec![Err(conn()), Ok(SessionId("resp_2".into()))])
                .polls(vec![SessionStatus::Completed]),
        );
        let c = client(backend.clone());
        let req = c.request(Stage::TermExplanation, 0, "prompt".into(), &[]);
        let resp = assert_ok!(c.run(&req).await);
        assert_eq!(resp.response_id.as_deref(), Some("resp_2"));
        assert_eq!(backend.submit_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let backend = Arc::new(ScriptedBackend::with_submits(vec![
            Err(conn()),
            Err(conn()),
            Err(conn()),
            Err(conn()),
        ]));
        let c = client(backend.clone());
        let req = c.request(Stage::Comprehensive, 0, "prompt".into(), &[]);
        let err = assert_err!(c.run(&req).await);
        assert_eq!(err, conn());
        // One attempt plus max_retries (2).
        assert_eq!(backend.submit_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn tool_timeout_is_not_retried() {
        let timeout_err = AssistantError::ToolTimeout {
            tool: "deepwiki".into(),
            detail: "no response in 30s".into(),
        };
        let backend = Arc::new(
            ScriptedBackend::default().polls(vec![SessionStatus::Failed(timeout_err.clone())]),
        );
        let c = client(backend.clone());
        let req = c.request(Stage::Comprehensive, 0, "prompt".into(), &[ToolKind::RemoteLookup]);
        let err = assert_err!(c.run(&req).await);
        assert_eq!(err, timeout_err);
        assert_eq!(backend.submit_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let auth = AssistantError::Auth {
            provider: "scripted".into(),
            detail: "invalid key".into(),
        };
        let backend = Arc::new(ScriptedBackend::with_submits(vec![Err(auth.clone())]));
        let c = client(backend.clone());
        let req = c.request(Stage::TermExtraction, 0, "prompt".into(), &[]);
        assert_eq!(assert_err!(c.run(&req).await), auth);
        assert_eq!(backend.submit_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn waiting_is_bounded_by_response_timeout() {
        let backend = Arc::new(ScriptedBackend::default());
        let c = AssistantClient::new(
            backend,
            ToolSet::default(),
            ClientSettings {
                response_timeout: Duration::from_millis(50),
                poll_interval: Duration::from_millis(5),
                ..settings()
            },
        );
        let req = c.request(Stage::Comprehensive, 0, "prompt".into(), &[]);
        match assert_err!(c.run(&req).await) {
            AssistantError::IncompleteResponse { reason } => {
                assert!(reason.contains("timed out"), "got: {reason}")
            }
            other => panic!("expected IncompleteResponse, got {other:?}"),
        }
    }

    #[test]
    fn request_carries_only_selected_tools() {
        let c = client(Arc::new(ScriptedBackend::default()));
        let req = c.request(Stage::TermExplanation, 2, "p".into(), &[ToolKind::WebSearch]);
        assert_eq!(req.tools, vec![ToolConfiguration::web_search()]);
        assert_eq!(req.chunk_index, 2);
        assert_eq!(req.model, "test-model");

        let req = c.request(
            Stage::Comprehensive,
            0,
            "p".into(),
            &[ToolKind::RemoteLookup, ToolKind::WebSearch],
        );
        assert_eq!(req.tools.len(), 2);
    }
}
