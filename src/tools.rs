//! Hosted tool descriptors attached to assistant requests.
//!
//! A [`ToolConfiguration`] serialises to exactly the JSON object the hosted
//! Responses API expects in its `tools` array, so the same value can be
//! loaded from a user-supplied JSON file, logged, and sent on the wire.
//!
//! The [`ToolSet`] is built once per run and handed to the
//! [`crate::assistant::AssistantClient`]; nothing in the crate reads tool
//! configuration from global state.

use crate::error::DecoderError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Server label of the default documentation-lookup MCP server.
pub const DEEPWIKI_LABEL: &str = "deepwiki";

/// Endpoint of the default documentation-lookup MCP server.
pub const DEEPWIKI_URL: &str = "https://mcp.deepwiki.com/mcp";

/// Operations the assistant may call on the DeepWiki server.
pub const DEEPWIKI_ALLOWED_TOOLS: [&str; 3] =
    ["read_wiki_structure", "read_wiki_contents", "ask_question"];

/// Whether the hosted runtime must pause for a human before a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalPolicy {
    #[default]
    Never,
    Always,
}

/// One external tool made available to the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolConfiguration {
    /// The host's built-in web search.
    WebSearch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search_context_size: Option<String>,
    },
    /// A remote MCP server (documentation / repository lookup).
    Mcp {
        server_label: String,
        server_url: String,
        allowed_tools: Vec<String>,
        #[serde(default)]
        require_approval: ApprovalPolicy,
    },
}

/// The two families of tool a prompt can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    WebSearch,
    RemoteLookup,
}

impl ToolConfiguration {
    pub fn web_search() -> Self {
        ToolConfiguration::WebSearch {
            search_context_size: None,
        }
    }

    /// The DeepWiki MCP descriptor with its read-only operation allow-list
    /// and no manual approval.
    pub fn deepwiki() -> Self {
        ToolConfiguration::Mcp {
            server_label: DEEPWIKI_LABEL.to_string(),
            server_url: DEEPWIKI_URL.to_string(),
            allowed_tools: DEEPWIKI_ALLOWED_TOOLS.iter().map(|s| s.to_string()).collect(),
            require_approval: ApprovalPolicy::Never,
        }
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolConfiguration::WebSearch { .. } => ToolKind::WebSearch,
            ToolConfiguration::Mcp { .. } => ToolKind::RemoteLookup,
        }
    }

    /// Human-readable label used in logs and errors.
    pub fn label(&self) -> &str {
        match self {
            ToolConfiguration::WebSearch { .. } => "web_search",
            ToolConfiguration::Mcp { server_label, .. } => server_label,
        }
    }

    fn validate(&self) -> Result<(), DecoderError> {
        if let ToolConfiguration::Mcp {
            server_label,
            server_url,
            allowed_tools,
            ..
        } = self
        {
            if server_label.trim().is_empty() {
                return Err(DecoderError::InvalidConfig(
                    "MCP tool needs a non-empty server_label".into(),
                ));
            }
            if !(server_url.starts_with("https://") || server_url.starts_with("http://")) {
                return Err(DecoderError::InvalidConfig(format!(
                    "MCP server_url must be an HTTP/HTTPS URL, got '{server_url}'"
                )));
            }
            if allowed_tools.is_empty() {
                return Err(DecoderError::InvalidConfig(format!(
                    "MCP server '{server_label}' has an empty allowed_tools list"
                )));
            }
        }
        Ok(())
    }
}

/// The immutable set of tools available for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolSet {
    tools: Vec<ToolConfiguration>,
}

impl Default for ToolSet {
    /// Web search plus the DeepWiki documentation-lookup server.
    fn default() -> Self {
        Self {
            tools: vec![ToolConfiguration::web_search(), ToolConfiguration::deepwiki()],
        }
    }
}

impl ToolSet {
    pub fn new(tools: Vec<ToolConfiguration>) -> Result<Self, DecoderError> {
        for tool in &tools {
            tool.validate()?;
        }
        Ok(Self { tools })
    }

    /// An empty set: every call runs on the model's own knowledge.
    pub fn none() -> Self {
        Self { tools: Vec::new() }
    }

    /// Load a JSON array of tool descriptors.
    pub fn from_json(json: &str) -> Result<Self, DecoderError> {
        let tools: Vec<ToolConfiguration> = serde_json::from_str(json)
            .map_err(|e| DecoderError::InvalidConfig(format!("Invalid tool configuration: {e}")))?;
        Self::new(tools)
    }

    pub fn from_file(path: &Path) -> Result<Self, DecoderError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            DecoderError::InvalidConfig(format!(
                "Failed to read tool configuration '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_json(&json)
    }

    pub fn all(&self) -> &[ToolConfiguration] {
        &self.tools
    }

    /// Every configured tool of the requested kinds, in configuration order.
    pub fn select(&self, kinds: &[ToolKind]) -> Vec<ToolConfiguration> {
        self.tools
            .iter()
            .filter(|t| kinds.contains(&t.kind()))
            .cloned()
            .collect()
    }

    pub fn has(&self, kind: ToolKind) -> bool {
        self.tools.iter().any(|t| t.kind() == kind)
    }
}
