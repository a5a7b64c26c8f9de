#![forbid(unsafe_code)]

//! MCP (Model Context Protocol) server over stdio.
//!
//! One JSON-RPC message per line in, one response per line out. Requests are
//! handled in order; each tool call awaits the engine before the next line is
//! read.

use std::collections::HashMap;
use std::io;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::tools::ToolRegistry;

const PROTOCOL_VERSION: &str = "2024-11-05";

pub struct McpServer {
    registry: ToolRegistry,
}

#[derive(Debug, Serialize)]
struct ServerInfo {
    name: &'static str,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: HashMap<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallResult {
    content: Vec<ToolContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_error: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ToolContent {
    r#type: &'static str,
    text: String,
}

impl ToolCallResult {
    fn text(text: String, is_error: bool) -> Self {
        Self {
            content: vec![ToolContent {
                r#type: "text",
                text,
            }],
            is_error: is_error.then_some(true),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum JsonRpcId {
    String(String),
    Number(i64),
}

fn json_rpc_id_from_value(value: &Value) -> Option<JsonRpcId> {
    match value {
        Value::String(s) => Some(JsonRpcId::String(s.clone())),
        Value::Number(n) => n.as_i64().map(JsonRpcId::Number),
        _ => None,
    }
}

impl McpServer {
    pub const fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Serve on the process's stdin and stdout until stdin closes.
    pub async fn start(&self) -> io::Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<Value>(trimmed) {
                Ok(message) => self.handle_message(&message).await,
                Err(_) => Some(error_response(None, -32700, "Parse error: invalid JSON")),
            };

            if let Some(response) = response {
                writer.write_all(response.to_string().as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        debug!("stdin closed, stopping MCP server");
        Ok(())
    }

    /// The response to one message, or `None` for notifications.
    pub async fn handle_message(&self, message: &Value) -> Option<Value> {
        let method = message.get("method").and_then(Value::as_str).unwrap_or("");
        let id = message.get("id").and_then(json_rpc_id_from_value)?;

        let response = match method {
            "initialize" => result_response(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": ServerInfo {
                        name: "mingle",
                        version: env!("CARGO_PKG_VERSION"),
                    }
                }),
            ),
            "tools/list" => result_response(id, json!({ "tools": self.registry.get_tool_metadata() })),
            "tools/call" => self.handle_tools_call(id, message.get("params")).await,
            "ping" => result_response(id, json!({})),
            _ => error_response(Some(id), -32601, &format!("Method not found: {method}")),
        };
        Some(response)
    }

    async fn handle_tools_call(&self, id: JsonRpcId, params: Option<&Value>) -> Value {
        let Some(params) = params else {
            return error_response(Some(id), -32602, "Missing tool params");
        };
        let Ok(parsed) = serde_json::from_value::<ToolCallParams>(params.clone()) else {
            return error_response(Some(id), -32602, "Invalid tool params");
        };

        let arguments = Value::Object(parsed.arguments.into_iter().collect());
        let result = match self.registry.execute(&parsed.name, arguments).await {
            Ok(value) => ToolCallResult::text(value.to_string(), false),
            Err(err) => {
                warn!(tool = %parsed.name, code = %err.code, "tool call failed");
                ToolCallResult::text(format!("Error: {}", err.message), true)
            }
        };

        match serde_json::to_value(result) {
            Ok(value) => result_response(id, value),
            Err(err) => error_response(Some(id), -32603, &format!("Internal error: {err}")),
        }
    }
}

fn result_response(id: JsonRpcId, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

fn error_response(id: Option<JsonRpcId>, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Tool, ToolResult};
    use async_trait::async_trait;

    struct PingTool;

    #[async_trait]
    impl Tool for PingTool {
        fn name(&self) -> &'static str {
            "pong"
        }

        fn description(&self) -> &'static str {
            "Answers pong"
        }

        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }

        async fn execute(&self, _params: Value) -> ToolResult {
            Ok(json!({ "reply": "pong" }))
        }
    }

    fn server() -> McpServer {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(PingTool));
        McpServer::new(registry)
    }

    #[tokio::test]
    async fn test_initialize_and_list() {
        let server = server();
        let init = server
            .handle_message(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}))
            .await
            .unwrap();
        assert_eq!(init["result"]["serverInfo"]["name"], "mingle");

        let list = server
            .handle_message(&json!({"jsonrpc": "2.0", "id": "a", "method": "tools/list"}))
            .await
            .unwrap();
        assert_eq!(list["id"], "a");
        assert_eq!(list["result"]["tools"][0]["name"], "pong");
    }

    #[tokio::test]
    async fn test_notifications_get_no_reply() {
        let reply = server()
            .handle_message(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_tool_error() {
        let reply = server()
            .handle_message(&json!({
                "jsonrpc": "2.0", "id": 7, "method": "tools/call",
                "params": {"name": "missing", "arguments": {}}
            }))
            .await
            .unwrap();
        assert_eq!(reply["result"]["isError"], true);
    }

    #[tokio::test]
    async fn test_serve_line_protocol() {
        let input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\nnot json\n\n".to_vec();
        let mut output = Vec::new();
        server()
            .serve(BufReader::new(input.as_slice()), &mut output)
            .await
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["result"], json!({}));
        assert_eq!(lines[1]["error"]["code"], -32700);
    }
}
