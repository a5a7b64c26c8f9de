#![forbid(unsafe_code)]

//! Natural-language search over the user's network.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::types::{AiQueryRequest, QueryMode};

use super::{Services, Tool, ToolError, ToolResult, required_str};

pub struct AiQueryTool {
    services: Arc<Services>,
}

impl AiQueryTool {
    pub const fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Tool for AiQueryTool {
    fn name(&self) -> &'static str {
        "ai_query"
    }

    fn description(&self) -> &'static str {
        "Ask who you met or who matches a description, using graph traversal or semantic search"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural-language question, e.g. 'Who did I meet who works in AI?'"
                },
                "mode": {
                    "type": "string",
                    "enum": ["auto", "rag", "cypher"],
                    "default": "auto"
                },
                "userId": {
                    "type": "string",
                    "description": "Id of the asking user, used to anchor relationship queries"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> ToolResult {
        let query = required_str(&params, "query")?;
        let mode = match params.get("mode").and_then(Value::as_str) {
            Some(raw) => raw.parse::<QueryMode>()?,
            None => QueryMode::Auto,
        };
        let user_id = params
            .get("userId")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let request = AiQueryRequest {
            query: query.to_string(),
            mode,
            user_id,
        };
        let response = self.services.engine.query(&request).await?;
        serde_json::to_value(response)
            .map_err(|e| ToolError::internal_error(format!("Failed to encode response: {e}")))
    }
}
