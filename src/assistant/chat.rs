//! Backend for plain chat-completion providers (`edgequake-llm`).
//!
//! Anthropic, Gemini, Ollama and friends have no hosted web search or MCP
//! runtime, so requests run as a single chat turn and any attached tools
//! are dropped. The chat call is synchronous from the caller's point of
//! view: `submit` runs it to completion and parks the answer until
//! `fetch_result` collects it.

use super::{AssistantBackend, AssistantRequest, AssistantResponse, SessionId, SessionStatus};
use crate::error::AssistantError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

pub struct ChatBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
    next_id: AtomicU64,
    finished: Mutex<HashMap<SessionId, AssistantResponse>>,
}

impl ChatBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
            next_id: AtomicU64::new(1),
            finished: Mutex::new(HashMap::new()),
        }
    }

    fn finished(&self) -> Result<std::sync::MutexGuard<'_, HashMap<SessionId, AssistantResponse>>, AssistantError> {
        self.finished
            .lock()
            .map_err(|_| AssistantError::IncompleteResponse {
                reason: "session table poisoned".into(),
            })
    }
}

#[async_trait]
impl AssistantBackend for ChatBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn submit(&self, request: &AssistantRequest) -> Result<SessionId, AssistantError> {
        if !request.tools.is_empty() {
            let labels: Vec<&str> = request.tools.iter().map(|t| t.label()).collect();
            debug!(
                "{}: provider has no hosted tools; ignoring {:?}",
                self.label, labels
            );
        }

        let messages = vec![ChatMessage::user(&request.prompt)];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_output_tokens),
            ..Default::default()
        };

        let start = Instant::now();
        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| classify_provider_error(&self.label, e.to_string()))?;
        debug!(
            "{}: chat completed in {:?}",
            self.label,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            return Err(AssistantError::IncompleteResponse {
                reason: "provider returned an empty message".into(),
            });
        }

        let id = SessionId(format!(
            "chat-{}",
            self.next_id.fetch_add(1, Ordering::Relaxed)
        ));
        let answer = AssistantResponse {
            text: response.content,
            response_id: None,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
            tool_calls: 0,
        };
        self.finished()?.insert(id.clone(), answer);
        Ok(id)
    }

    async fn poll(&self, session: &SessionId) -> Result<SessionStatus, AssistantError> {
        if self.finished()?.contains_key(session) {
            Ok(SessionStatus::Completed)
        } else {
            Ok(SessionStatus::Failed(unknown_session(session)))
        }
    }

    async fn fetch_result(&self, session: &SessionId) -> Result<AssistantResponse, AssistantError> {
        self.finished()?
            .remove(session)
            .ok_or_else(|| unknown_session(session))
    }
}

fn unknown_session(session: &SessionId) -> AssistantError {
    AssistantError::IncompleteResponse {
        reason: format!("no result for session {session}"),
    }
}

/// Provider errors arrive as text; pick out credential failures so they are
/// not retried.
fn classify_provider_error(provider: &str, detail: String) -> AssistantError {
    let lower = detail.to_lowercase();
    let is_auth = ["401", "403", "unauthorized", "forbidden", "api key", "api_key"]
        .iter()
        .any(|needle| lower.contains(needle));
    if is_auth {
        AssistantError::Auth {
            provider: provider.to_string(),
            detail,
        }
    } else {
        AssistantError::Connection { detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_errors_are_auth() {
        let e = classify_provider_error("anthropic", "HTTP 401: invalid x-api-key".into());
        assert!(matches!(e, AssistantError::Auth { .. }));
        assert!(!e.is_retryable());

        let e = classify_provider_error("openai", "Missing API key".into());
        assert!(matches!(e, AssistantError::Auth { .. }));
    }

    #[test]
    fn other_errors_are_connection() {
        let e = classify_provider_error("ollama", "error sending request: connection refused".into());
        assert!(e.is_retryable());
    }

    #[test]
    fn unknown_session_is_incomplete() {
        let e = unknown_session(&SessionId("chat-9".into()));
        assert!(e.to_string().contains("chat-9"));
    }
}
