#![forbid(unsafe_code)]

//! Tool abstraction layer for the mingle MCP server.
//!
//! Tools are plain async handlers over JSON parameters, so the same
//! implementations back the MCP server and can be driven directly in tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::QueryEngine;
use crate::error::EngineError;
use crate::ingest::Ingestor;

pub mod directory_tools;
pub mod query_tools;

/// Result type for tool execution
pub type ToolResult = Result<Value, ToolError>;

/// Error type for tool execution failures
#[derive(Debug, Clone)]
pub struct ToolError {
    pub code: String,
    pub message: String,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new("invalid_params", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ToolError {}

impl From<EngineError> for ToolError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidInput(message) => Self::invalid_params(message),
            EngineError::NotFound(message) => Self::not_found(message),
            failed @ EngineError::QueryFailed { .. } => Self::internal_error(failed.to_string()),
            other => {
                tracing::error!(error = %other, "tool execution failed");
                Self::internal_error("request failed")
            }
        }
    }
}

/// Trait for MCP tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in MCP protocol)
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema for input parameters
    fn input_schema(&self) -> Value;

    async fn execute(&self, params: Value) -> ToolResult;
}

/// Shared services the tools dispatch into.
pub struct Services {
    pub engine: QueryEngine,
    pub ingestor: Ingestor,
}

/// Registry for managing available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(AsRef::as_ref)
    }

    /// Registered tool names, sorted.
    pub fn list_tools(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Tool metadata for MCP tools/list, sorted by name.
    pub fn get_tool_metadata(&self) -> Vec<Value> {
        self.list_tools()
            .into_iter()
            .filter_map(|name| self.get(name))
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "inputSchema": tool.input_schema(),
                })
            })
            .collect()
    }

    pub async fn execute(&self, name: &str, params: Value) -> ToolResult {
        match self.get(name) {
            Some(tool) => tool.execute(params).await,
            None => Err(ToolError::not_found(format!("Tool not found: {name}"))),
        }
    }
}

/// Create a registry with all built-in tools
pub fn create_default_registry(services: Arc<Services>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Box::new(query_tools::AiQueryTool::new(Arc::clone(&services))));

    registry.register(Box::new(directory_tools::JoinEventTool::new(Arc::clone(
        &services,
    ))));
    registry.register(Box::new(directory_tools::RecordMeetingTool::new(
        Arc::clone(&services),
    )));
    registry.register(Box::new(directory_tools::ListMetTool::new(services)));

    registry
}

pub(crate) fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::invalid_params(format!("{key} must be a non-empty string")))
}

pub(crate) fn optional_str(params: &Value, key: &str) -> String {
    params
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
