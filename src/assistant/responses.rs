//! Backend for the hosted Responses API (`/v1/responses`).
//!
//! Requests are created with `background: true`, so the host returns at
//! once with a `queued` response object and runs the model, its web
//! searches and its MCP calls on its side. The client then polls
//! `GET /responses/{id}` until the object reaches a terminal status.

use super::{AssistantBackend, AssistantRequest, AssistantResponse, SessionId, SessionStatus};
use crate::config::DecoderConfig;
use crate::error::{AssistantError, DecoderError};
use crate::tools::ToolConfiguration;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const BACKEND_NAME: &str = "openai-responses";

/// Responses API client over `reqwest`.
pub struct ResponsesBackend {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl std::fmt::Debug for ResponsesBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponsesBackend")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl ResponsesBackend {
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, DecoderError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DecoderError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &DecoderConfig, api_key: impl Into<String>) -> Result<Self, DecoderError> {
        Self::new(
            api_key,
            config.api_base.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    async fn get_response(&self, session: &SessionId) -> Result<ResponseObject, AssistantError> {
        let url = format!("{}/responses/{}", self.api_base, session);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(resp).await
    }
}

#[async_trait]
impl AssistantBackend for ResponsesBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn submit(&self, request: &AssistantRequest) -> Result<SessionId, AssistantError> {
        let body = CreateResponse::from_request(request);
        let url = format!("{}/responses", self.api_base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let created: ResponseObject = read_json(resp).await?;
        debug!(
            "Created response {} ({} tools, status {})",
            created.id,
            request.tools.len(),
            created.status
        );
        Ok(SessionId(created.id))
    }

    async fn poll(&self, session: &SessionId) -> Result<SessionStatus, AssistantError> {
        let response = self.get_response(session).await?;
        Ok(session_status(&response))
    }

    async fn fetch_result(&self, session: &SessionId) -> Result<AssistantResponse, AssistantError> {
        let response = self.get_response(session).await?;
        collect_output(response)
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CreateResponse<'a> {
    model: &'a str,
    input: [InputMessage<'a>; 1],
    text: TextOptions,
    temperature: f32,
    max_output_tokens: usize,
    top_p: f32,
    store: bool,
    background: bool,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolConfiguration],
}

fn no_tools(tools: &&[ToolConfiguration]) -> bool {
    tools.is_empty()
}

#[derive(Debug, Serialize)]
struct InputMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct TextOptions {
    format: TextFormat,
}

#[derive(Debug, Serialize)]
struct TextFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl<'a> CreateResponse<'a> {
    fn from_request(request: &'a AssistantRequest) -> Self {
        Self {
            model: &request.model,
            input: [InputMessage {
                role: "user",
                content: &request.prompt,
            }],
            text: TextOptions {
                format: TextFormat { kind: "text" },
            },
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
            top_p: 1.0,
            store: true,
            background: true,
            tools: &request.tools,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResponseObject {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<ErrorObject>,
    #[serde(default)]
    incomplete_details: Option<IncompleteDetails>,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct IncompleteDetails {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    McpCall {
        #[serde(default)]
        server_label: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        error: Option<Value>,
    },
    McpListTools {
        #[serde(default)]
        server_label: Option<String>,
        #[serde(default)]
        error: Option<Value>,
    },
    WebSearchCall {
        #[serde(default)]
        status: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    OutputText {
        #[serde(default)]
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

// ── Interpretation ───────────────────────────────────────────────────────

fn session_status(response: &ResponseObject) -> SessionStatus {
    match response.status.as_str() {
        "queued" | "in_progress" => SessionStatus::Pending,
        "completed" => SessionStatus::Completed,
        "incomplete" => SessionStatus::Failed(AssistantError::IncompleteResponse {
            reason: response
                .incomplete_details
                .as_ref()
                .and_then(|d| d.reason.clone())
                .unwrap_or_else(|| "response incomplete".into()),
        }),
        "cancelled" => SessionStatus::Failed(AssistantError::IncompleteResponse {
            reason: "response was cancelled".into(),
        }),
        "failed" => SessionStatus::Failed(failure(response)),
        other => SessionStatus::Failed(AssistantError::IncompleteResponse {
            reason: format!("unexpected response status '{other}'"),
        }),
    }
}

/// Classify a `failed` response. A timeout inside a tool call is reported
/// against the tool so the pipeline can retry without it.
fn failure(response: &ResponseObject) -> AssistantError {
    if let Some(err) = tool_timeout(&response.output) {
        return err;
    }
    let (code, message) = response
        .error
        .as_ref()
        .map(|e| (e.code.clone().unwrap_or_default(), e.message.clone()))
        .unwrap_or_default();
    let lower = format!("{code} {message}").to_lowercase();
    if mentions_timeout(&lower) && (lower.contains("mcp") || lower.contains("tool")) {
        return AssistantError::ToolTimeout {
            tool: "mcp".into(),
            detail: message,
        };
    }
    AssistantError::IncompleteResponse {
        reason: if message.is_empty() {
            "response failed".into()
        } else {
            message
        },
    }
}

fn mentions_timeout(lower: &str) -> bool {
    lower.contains("timeout") || lower.contains("timed out")
}

fn error_text(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

/// First MCP item whose error is a timeout. Other tool errors are logged;
/// the model usually recovers from them on its own.
fn tool_timeout(output: &[OutputItem]) -> Option<AssistantError> {
    for item in output {
        let (label, error) = match item {
            OutputItem::McpCall {
                server_label,
                error: Some(error),
                ..
            }
            | OutputItem::McpListTools {
                server_label,
                error: Some(error),
            } => (server_label.as_deref().unwrap_or("mcp"), error),
            _ => continue,
        };
        if error.is_null() {
            continue;
        }
        let detail = error_text(error);
        if mentions_timeout(&detail.to_lowercase()) {
            return Some(AssistantError::ToolTimeout {
                tool: label.to_string(),
                detail,
            });
        }
        warn!("Tool '{}' reported an error: {}", label, detail);
    }
    None
}

fn collect_output(response: ResponseObject) -> Result<AssistantResponse, AssistantError> {
    if let Some(err) = tool_timeout(&response.output) {
        return Err(err);
    }

    let mut text = String::new();
    let mut tool_calls = 0usize;
    for item in &response.output {
        match item {
            OutputItem::Message { content } => {
                for part in content {
                    if let ContentPart::OutputText { text: t } = part {
                        text.push_str(t);
                    }
                }
            }
            OutputItem::McpCall { name, .. } => {
                tool_calls += 1;
                debug!("MCP call: {}", name.as_deref().unwrap_or("?"));
            }
            OutputItem::WebSearchCall { status } => {
                tool_calls += 1;
                debug!("Web search call ({})", status.as_deref().unwrap_or("unknown"));
            }
            OutputItem::McpListTools { .. } | OutputItem::Other => {}
        }
    }

    if text.trim().is_empty() {
        return Err(AssistantError::IncompleteResponse {
            reason: "completed response contained no message text".into(),
        });
    }

    let usage = response.usage.unwrap_or_default();
    Ok(AssistantResponse {
        text,
        response_id: Some(response.id),
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        tool_calls,
    })
}

// ── HTTP plumbing ────────────────────────────────────────────────────────

fn transport_error(e: reqwest::Error) -> AssistantError {
    AssistantError::Connection {
        detail: if e.is_timeout() {
            "request timed out".into()
        } else {
            e.to_string()
        },
    }
}

async fn read_json(resp: reqwest::Response) -> Result<ResponseObject, AssistantError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(http_error(status, &body));
    }
    resp.json::<ResponseObject>()
        .await
        .map_err(|e| AssistantError::Api {
            status: Some(status.as_u16()),
            message: format!("unreadable response body: {e}"),
        })
}

fn http_error(status: StatusCode, body: &str) -> AssistantError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    match status.as_u16() {
        401 | 403 => AssistantError::Auth {
            provider: BACKEND_NAME.into(),
            detail: message,
        },
        408 | 429 => AssistantError::Connection {
            detail: format!("HTTP {status}: {message}"),
        },
        s if status.is_server_error() => AssistantError::Connection {
            detail: format!("HTTP {s}: {message}"),
        },
        s => AssistantError::Api {
            status: Some(s),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{AssistantClient, ClientSettings};
    use crate::error::Stage;
    use crate::tools::{ToolKind, ToolSet};
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn parse(v: Value) -> ResponseObject {
        serde_json::from_value(v).unwrap()
    }

    fn backend(server: &MockServer) -> ResponsesBackend {
        ResponsesBackend::new("sk-test", format!("{}/v1/", server.uri()), Duration::from_secs(5))
            .unwrap()
    }

    fn request() -> AssistantRequest {
        AssistantRequest {
            stage: Stage::Comprehensive,
            chunk_index: 0,
            prompt: "Explain this paper".into(),
            tools: ToolSet::default().all().to_vec(),
            model: "gpt-4o".into(),
            temperature: 0.3,
            max_output_tokens: 2048,
        }
    }

    fn completed_body() -> Value {
        json!({
            "id": "resp_1",
            "status": "completed",
            "output": [
                {"type": "web_search_call", "id": "ws_1", "status": "completed"},
                {"type": "mcp_list_tools", "id": "ml_1", "server_label": "deepwiki", "tools": []},
                {"type": "mcp_call", "id": "mc_1", "server_label": "deepwiki",
                 "name": "ask_question", "arguments": "{}", "output": "...", "error": null},
                {"type": "reasoning", "id": "rs_1", "summary": []},
                {"type": "message", "role": "assistant", "content": [
                    {"type": "output_text", "text": "{\"explanation\": ", "annotations": []},
                    {"type": "refusal", "refusal": "ignored"},
                    {"type": "output_text", "text": "\"ok\"}", "annotations": []}
                ]}
            ],
            "usage": {"input_tokens": 120, "output_tokens": 30, "total_tokens": 150}
        })
    }

    #[test]
    fn request_body_has_hosted_shape() {
        let req = request();
        let body = serde_json::to_value(CreateResponse::from_request(&req)).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["input"][0]["role"], "user");
        assert_eq!(body["input"][0]["content"], "Explain this paper");
        assert_eq!(body["text"]["format"]["type"], "text");
        assert_eq!(body["top_p"], 1.0);
        assert_eq!(body["store"], true);
        assert_eq!(body["background"], true);
        assert_eq!(body["max_output_tokens"], 2048);
        assert_eq!(body["tools"][0]["type"], "web_search");
        assert_eq!(body["tools"][1]["server_label"], "deepwiki");
    }

    #[test]
    fn empty_tool_list_is_omitted() {
        let req = AssistantRequest {
            tools: Vec::new(),
            ..request()
        };
        let body = serde_json::to_value(CreateResponse::from_request(&req)).unwrap();
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn status_mapping() {
        let status = |s: &str| session_status(&parse(json!({"id": "r", "status": s})));
        assert_eq!(status("queued"), SessionStatus::Pending);
        assert_eq!(status("in_progress"), SessionStatus::Pending);
        assert_eq!(status("completed"), SessionStatus::Completed);
        assert!(matches!(
            status("cancelled"),
            SessionStatus::Failed(AssistantError::IncompleteResponse { .. })
        ));
    }

    #[test]
    fn incomplete_reports_reason() {
        let r = parse(json!({
            "id": "r", "status": "incomplete",
            "incomplete_details": {"reason": "max_output_tokens"}
        }));
        assert_eq!(
            session_status(&r),
            SessionStatus::Failed(AssistantError::IncompleteResponse {
                reason: "max_output_tokens".into()
            })
        );
    }

    #[test]
    fn failed_mcp_timeout_is_a_tool_timeout() {
        let r = parse(json!({
            "id": "r", "status": "failed",
            "error": {"code": "server_error", "message": "MCP server request timed out"}
        }));
        match session_status(&r) {
            SessionStatus::Failed(AssistantError::ToolTimeout { tool, .. }) => assert_eq!(tool, "mcp"),
            other => panic!("unexpected {other:?}"),
        }

        let r = parse(json!({
            "id": "r", "status": "failed",
            "output": [{"type": "mcp_call", "server_label": "deepwiki", "name": "ask_question",
                        "error": "Timeout waiting for tool response"}],
            "error": {"message": "The model failed"}
        }));
        match session_status(&r) {
            SessionStatus::Failed(AssistantError::ToolTimeout { tool, .. }) => {
                assert_eq!(tool, "deepwiki")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn failed_without_tool_is_incomplete() {
        let r = parse(json!({
            "id": "r", "status": "failed",
            "error": {"code": "server_error", "message": "Something went wrong"}
        }));
        assert_eq!(
            session_status(&r),
            SessionStatus::Failed(AssistantError::IncompleteResponse {
                reason: "Something went wrong".into()
            })
        );
    }

    #[test]
    fn output_text_parts_are_concatenated() {
        let resp = collect_output(parse(completed_body())).unwrap();
        assert_eq!(resp.text, "{\"explanation\": \"ok\"}");
        assert_eq!(resp.input_tokens, 120);
        assert_eq!(resp.output_tokens, 30);
        assert_eq!(resp.tool_calls, 2);
        assert_eq!(resp.response_id.as_deref(), Some("resp_1"));
    }

    #[test]
    fn completed_with_list_tools_timeout_is_a_tool_timeout() {
        let r = parse(json!({
            "id": "r", "status": "completed",
            "output": [
                {"type": "mcp_list_tools", "server_label": "deepwiki",
                 "error": {"message": "connection timed out"}},
                {"type": "message", "content": [{"type": "output_text", "text": "partial"}]}
            ]
        }));
        assert!(matches!(
            collect_output(r),
            Err(AssistantError::ToolTimeout { tool, .. }) if tool == "deepwiki"
        ));
    }

    #[test]
    fn non_timeout_tool_error_is_tolerated() {
        let r = parse(json!({
            "id": "r", "status": "completed",
            "output": [
                {"type": "mcp_call", "server_label": "deepwiki", "error": "repository not indexed"},
                {"type": "message", "content": [{"type": "output_text", "text": "answer"}]}
            ]
        }));
        assert_eq!(collect_output(r).unwrap().text, "answer");
    }

    #[test]
    fn completed_without_text_is_incomplete() {
        let r = parse(json!({"id": "r", "status": "completed", "output": []}));
        assert!(matches!(
            collect_output(r),
            Err(AssistantError::IncompleteResponse { .. })
        ));
    }

    #[test]
    fn http_status_mapping() {
        let body = r#"{"error": {"message": "Incorrect API key provided"}}"#;
        assert_eq!(
            http_error(StatusCode::UNAUTHORIZED, body),
            AssistantError::Auth {
                provider: BACKEND_NAME.into(),
                detail: "Incorrect API key provided".into()
            }
        );
        assert!(http_error(StatusCode::TOO_MANY_REQUESTS, "slow down").is_retryable());
        assert!(http_error(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert_eq!(
            http_error(StatusCode::BAD_REQUEST, "unknown model"),
            AssistantError::Api {
                status: Some(400),
                message: "unknown model".into()
            }
        );
    }

    #[tokio::test]
    async fn submit_posts_request_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/responses"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4o", "background": true, "store": true})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "resp_42", "status": "queued"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let session = backend(&server).submit(&request()).await.unwrap();
        assert_eq!(session, SessionId("resp_42".into()));
    }

    #[tokio::test]
    async fn unauthorized_submit_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/responses"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let err = backend(&server).submit(&request()).await.unwrap_err();
        assert!(matches!(err, AssistantError::Auth { .. }), "got {err:?}");
        assert!(!err.to_string().contains("sk-test"));
    }

    #[tokio::test]
    async fn unreachable_host_is_connection_error() {
        // Nothing listens on port 9 of localhost in a test sandbox.
        let b = ResponsesBackend::new("sk-test", "http://127.0.0.1:9/v1", Duration::from_secs(2))
            .unwrap();
        let err = b.submit(&request()).await.unwrap_err();
        assert!(err.is_retryable(), "got {err:?}");
    }

    #[tokio::test]
    async fn client_runs_a_full_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/responses"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "resp_1", "status": "queued"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/responses/resp_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completed_body()))
            .mount(&server)
            .await;

        let client = AssistantClient::new(
            Arc::new(backend(&server)),
            ToolSet::default(),
            ClientSettings {
                model: "gpt-4o".into(),
                temperature: 0.3,
                max_output_tokens: 2048,
                max_retries: 0,
                retry_backoff_ms: 1,
                poll_interval: Duration::from_millis(5),
                response_timeout: Duration::from_secs(5),
            },
        );
        let req = client.request(
            Stage::Comprehensive,
            0,
            "Explain".into(),
            &[ToolKind::RemoteLookup, ToolKind::WebSearch],
        );
        let resp = client.run(&req).await.unwrap();
        assert_eq!(resp.text, "{\"explanation\": \"ok\"}");
    }
}
