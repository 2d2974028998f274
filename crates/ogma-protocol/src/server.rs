//! The snapshot-backed tool server.
//!
//! Serves the closed tool set over a framed stdio channel. Every query
//! tool reads the immutable snapshot loaded at startup; `submit_result`
//! is the only write, and it may happen at most once per server lifetime.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{ProtocolError, Result};
use crate::protocol::{PROTOCOL_VERSION, SUBMIT_TOOL, ToolInfo, ToolRequest, ToolResponse};
use crate::snapshot::Snapshot;
use crate::transport::{read_message, write_message};

/// Serves read-only queries over one snapshot plus the single submit tool.
pub struct ToolServer {
    snapshot: Snapshot,
    artifact_path: PathBuf,
    initialized: bool,
    submitted: bool,
}

impl ToolServer {
    /// Create a server over a loaded snapshot.
    ///
    /// `artifact_path` is where `submit_result` writes its payload.
    pub fn new(snapshot: Snapshot, artifact_path: PathBuf) -> Self {
        Self {
            snapshot,
            artifact_path,
            initialized: false,
            submitted: false,
        }
    }

    /// Serve requests until the peer hangs up.
    pub fn serve<R: BufRead, W: Write>(&mut self, reader: &mut R, writer: &mut W) -> Result<()> {
        info!(
            session_id = %self.snapshot.session_id,
            chunks = self.snapshot.chunks.len(),
            concepts = self.snapshot.concepts.len(),
            "Tool server ready"
        );

        while let Some(request) = read_message::<_, ToolRequest>(reader)? {
            let response = self.handle(request);
            write_message(writer, &response)?;
        }

        debug!(submitted = self.submitted, "Tool server shutting down");
        Ok(())
    }

    /// Whether the agent submitted a result this lifetime.
    pub fn submitted(&self) -> bool {
        self.submitted
    }

    /// Handle one request.
    pub fn handle(&mut self, request: ToolRequest) -> ToolResponse {
        match request {
            ToolRequest::Initialize => {
                self.initialized = true;
                ToolResponse::Initialized {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    server_name: "ogma-toolserver".to_string(),
                    server_version: env!("CARGO_PKG_VERSION").to_string(),
                }
            }
            ToolRequest::ListTools => {
                if !self.initialized {
                    return ToolResponse::error("initialize first");
                }
                ToolResponse::Tools {
                    tools: tool_catalog(),
                }
            }
            ToolRequest::CallTool { name, arguments } => {
                if !self.initialized {
                    return ToolResponse::error("initialize first");
                }
                match self.call_tool(&name, &arguments) {
                    Ok(content) => ToolResponse::ToolResult { content },
                    Err(e) => {
                        warn!(tool = %name, error = %e, "Tool call failed");
                        ToolResponse::error(e.to_string())
                    }
                }
            }
        }
    }

    fn call_tool(&mut self, name: &str, arguments: &Value) -> Result<Value> {
        match name {
            "list_chunks" => Ok(json!({
                "chunks": self.snapshot.chunks.iter().map(chunk_summary).collect::<Vec<_>>()
            })),
            "get_chunk" => {
                let id = required_str(arguments, "id")?;
                let chunk = self
                    .snapshot
                    .chunks
                    .iter()
                    .find(|c| c.id == id)
                    .ok_or_else(|| ProtocolError::protocol(format!("no chunk with id {id}")))?;
                Ok(serde_json::to_value(chunk)?)
            }
            "search_chunks" => {
                let query = required_str(arguments, "query")?.to_lowercase();
                let matches: Vec<Value> = self
                    .snapshot
                    .chunks
                    .iter()
                    .filter(|c| {
                        c.title.to_lowercase().contains(&query)
                            || c.content.to_lowercase().contains(&query)
                    })
                    .map(chunk_summary)
                    .collect();
                Ok(json!({ "chunks": matches }))
            }
            "list_concepts" => Ok(json!({ "concepts": self.snapshot.concepts })),
            "list_relationships" => Ok(json!({ "relationships": self.snapshot.relationships })),
            "list_questions" => Ok(json!({ "questions": self.snapshot.questions })),
            SUBMIT_TOOL => {
                if self.submitted {
                    return Err(ProtocolError::protocol("result already submitted"));
                }
                let result = arguments
                    .get("result")
                    .ok_or_else(|| ProtocolError::protocol("missing 'result' argument"))?;
                if !result.is_object() {
                    return Err(ProtocolError::protocol("'result' must be a JSON object"));
                }
                std::fs::write(&self.artifact_path, serde_json::to_string_pretty(result)?)?;
                self.submitted = true;
                info!(path = %self.artifact_path.display(), "Result artifact written");
                Ok(json!({ "ok": true }))
            }
            other => Err(ProtocolError::protocol(format!("unknown tool: {other}"))),
        }
    }
}

fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::protocol(format!("missing '{key}' argument")))
}

fn chunk_summary(chunk: &ogma_types::Chunk) -> Value {
    json!({
        "id": chunk.id,
        "parent_id": chunk.parent_id,
        "title": chunk.title,
        "depth": chunk.depth,
        "kind": chunk.kind,
        "position": chunk.position,
    })
}

/// The closed tool set.
fn tool_catalog() -> Vec<ToolInfo> {
    let no_args = json!({ "type": "object", "properties": {} });
    vec![
        ToolInfo {
            name: "list_chunks".to_string(),
            description: "List the resource's chunks (titles and tree structure, no content)"
                .to_string(),
            input_schema: no_args.clone(),
        },
        ToolInfo {
            name: "get_chunk".to_string(),
            description: "Get one chunk with its full content".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": { "id": { "type": "string" } },
                "required": ["id"]
            }),
        },
        ToolInfo {
            name: "search_chunks".to_string(),
            description: "Find chunks whose title or content contains a query string".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            }),
        },
        ToolInfo {
            name: "list_concepts".to_string(),
            description: "List every concept already in the session graph".to_string(),
            input_schema: no_args.clone(),
        },
        ToolInfo {
            name: "list_relationships".to_string(),
            description: "List every relationship already in the session graph".to_string(),
            input_schema: no_args.clone(),
        },
        ToolInfo {
            name: "list_questions".to_string(),
            description: "List the resource's extracted question records".to_string(),
            input_schema: no_args,
        },
        ToolInfo {
            name: SUBMIT_TOOL.to_string(),
            description: "Submit the final structured result; must be called exactly once"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": { "result": { "type": "object" } },
                "required": ["result"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogma_types::{Chunk, Resource, ResourceKind};
    use std::io::BufReader;

    fn test_server(dir: &std::path::Path) -> ToolServer {
        let resource = Resource::new("s1", "Notes", ResourceKind::Foundation);
        let snapshot = Snapshot {
            session_id: "s1".to_string(),
            chunks: vec![
                Chunk::new(&resource.id, "1.1 Overview", "Introduces the heat equation."),
                Chunk::new(&resource.id, "1.2 Derivation", "From Fourier's law."),
            ],
            resource: Some(resource),
            ..Default::default()
        };
        ToolServer::new(snapshot, dir.join("result.json"))
    }

    #[test]
    fn test_requires_initialize() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut server = test_server(dir.path());

        let resp = server.handle(ToolRequest::ListTools);
        assert!(resp.is_error());

        server.handle(ToolRequest::Initialize);
        let resp = server.handle(ToolRequest::ListTools);
        match resp {
            ToolResponse::Tools { tools } => {
                assert!(tools.iter().any(|t| t.name == SUBMIT_TOOL));
                assert_eq!(tools.len(), 7);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_search_chunks() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut server = test_server(dir.path());
        server.handle(ToolRequest::Initialize);

        let resp = server.handle(ToolRequest::CallTool {
            name: "search_chunks".to_string(),
            arguments: json!({"query": "fourier"}),
        });
        match resp {
            ToolResponse::ToolResult { content } => {
                let chunks = content["chunks"].as_array().unwrap();
                assert_eq!(chunks.len(), 1);
                assert_eq!(chunks[0]["title"], "1.2 Derivation");
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_get_chunk_unknown_id_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut server = test_server(dir.path());
        server.handle(ToolRequest::Initialize);

        let resp = server.handle(ToolRequest::CallTool {
            name: "get_chunk".to_string(),
            arguments: json!({"id": "nope"}),
        });
        assert!(resp.is_error());
    }

    #[test]
    fn test_submit_result_writes_artifact_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut server = test_server(dir.path());
        server.handle(ToolRequest::Initialize);

        let payload = json!({"result": {"concepts": [{"name": "Heat Equation"}]}});
        let resp = server.handle(ToolRequest::CallTool {
            name: SUBMIT_TOOL.to_string(),
            arguments: payload.clone(),
        });
        assert!(!resp.is_error());
        assert!(server.submitted());

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("result.json")).unwrap())
                .unwrap();
        assert_eq!(written["concepts"][0]["name"], "Heat Equation");

        // One task = at most one artifact
        let resp = server.handle(ToolRequest::CallTool {
            name: SUBMIT_TOOL.to_string(),
            arguments: payload,
        });
        assert!(resp.is_error());
    }

    #[test]
    fn test_submit_result_rejects_non_object() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut server = test_server(dir.path());
        server.handle(ToolRequest::Initialize);

        let resp = server.handle(ToolRequest::CallTool {
            name: SUBMIT_TOOL.to_string(),
            arguments: json!({"result": "just a string"}),
        });
        assert!(resp.is_error());
        assert!(!server.submitted());
    }

    #[test]
    fn test_unknown_tool() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut server = test_server(dir.path());
        server.handle(ToolRequest::Initialize);

        let resp = server.handle(ToolRequest::CallTool {
            name: "delete_everything".to_string(),
            arguments: Value::Null,
        });
        assert!(resp.is_error());
    }

    #[test]
    fn test_serve_over_byte_stream() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut server = test_server(dir.path());

        let mut input = Vec::new();
        write_message(&mut input, &ToolRequest::Initialize).unwrap();
        write_message(
            &mut input,
            &ToolRequest::CallTool {
                name: "list_chunks".to_string(),
                arguments: Value::Null,
            },
        )
        .unwrap();

        let mut reader = BufReader::new(input.as_slice());
        let mut output = Vec::new();
        server.serve(&mut reader, &mut output).unwrap();

        let mut out_reader = BufReader::new(output.as_slice());
        let first: ToolResponse = read_message(&mut out_reader).unwrap().unwrap();
        let second: ToolResponse = read_message(&mut out_reader).unwrap().unwrap();
        assert!(matches!(first, ToolResponse::Initialized { .. }));
        match second {
            ToolResponse::ToolResult { content } => {
                assert_eq!(content["chunks"].as_array().unwrap().len(), 2);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
