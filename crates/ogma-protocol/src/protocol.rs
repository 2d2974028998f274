//! The closed tool-server request/response protocol.
//!
//! An external agent talks to the tool server over stdio using exactly
//! three request forms: initialize, list-tools, and call-tool. The tool
//! set itself is closed too: a handful of read-only queries over the
//! snapshot plus the single `submit_result` write, so an agent can never
//! reach state outside its point-in-time snapshot.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version negotiated during initialize.
pub const PROTOCOL_VERSION: &str = "1";

/// Name of the single write tool an agent must call before finishing.
pub const SUBMIT_TOOL: &str = "submit_result";

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// A request from the agent to the tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolRequest {
    /// Handshake; must be the first request.
    Initialize,
    /// List the closed tool set.
    ListTools,
    /// Invoke one tool by name.
    CallTool {
        /// Tool name.
        name: String,
        /// Tool arguments (tool-specific object, may be omitted).
        #[serde(default)]
        arguments: Value,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

/// A response from the tool server to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResponse {
    /// Initialize succeeded.
    Initialized {
        /// Protocol version the server speaks.
        protocol_version: String,
        /// Server name.
        server_name: String,
        /// Server version.
        server_version: String,
    },
    /// The tool listing.
    Tools {
        /// Available tools.
        tools: Vec<ToolInfo>,
    },
    /// Result of a tool call.
    ToolResult {
        /// Tool-specific JSON payload.
        content: Value,
    },
    /// The request could not be served.
    Error {
        /// Human-readable message.
        message: String,
    },
}

impl ToolResponse {
    /// Build an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// True if this is an error response.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// A tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name (unique identifier).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_tagging() {
        let json = serde_json::to_value(&ToolRequest::Initialize).unwrap();
        assert_eq!(json["type"], "initialize");

        let json = serde_json::to_value(&ToolRequest::CallTool {
            name: "get_chunk".to_string(),
            arguments: json!({"id": "c1"}),
        })
        .unwrap();
        assert_eq!(json["type"], "call_tool");
        assert_eq!(json["arguments"]["id"], "c1");
    }

    #[test]
    fn test_call_tool_arguments_default() {
        let req: ToolRequest =
            serde_json::from_value(json!({"type": "call_tool", "name": "list_concepts"})).unwrap();
        match req {
            ToolRequest::CallTool { name, arguments } => {
                assert_eq!(name, "list_concepts");
                assert!(arguments.is_null());
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_response_round_trip() {
        let resp = ToolResponse::Initialized {
            protocol_version: PROTOCOL_VERSION.to_string(),
            server_name: "ogma-toolserver".to_string(),
            server_version: "0.1.0".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        let parsed: ToolResponse = serde_json::from_str(&json).unwrap();
        assert!(!parsed.is_error());
    }

    #[test]
    fn test_unknown_request_type_rejected() {
        let result: std::result::Result<ToolRequest, _> =
            serde_json::from_value(json!({"type": "write_file", "path": "/etc/passwd"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_error_response() {
        let resp = ToolResponse::error("unknown tool");
        assert!(resp.is_error());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "unknown tool");
    }
}
