#![forbid(unsafe_code)]

//! Check-in and meeting tools backed by the directory.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::types::ProfileInput;

use super::{Services, Tool, ToolError, ToolResult, optional_str, required_str};

/// Tool for joining an event with the token from its QR code
pub struct JoinEventTool {
    services: Arc<Services>,
}

impl JoinEventTool {
    pub const fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Tool for JoinEventTool {
    fn name(&self) -> &'static str {
        "join_event"
    }

    fn description(&self) -> &'static str {
        "Join an event using its join token and register or update your profile"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token": { "type": "string", "description": "Join token printed on the event QR code" },
                "name": { "type": "string" },
                "email": { "type": "string", "description": "Used to recognise returning attendees" },
                "company": { "type": "string" },
                "jobTitle": { "type": "string" },
                "bio": { "type": "string" },
                "interests": { "type": "string" }
            },
            "required": ["token", "name"]
        })
    }

    async fn execute(&self, params: Value) -> ToolResult {
        let token = required_str(&params, "token")?;
        let profile = ProfileInput {
            name: required_str(&params, "name")?.trim().to_string(),
            email: optional_str(&params, "email"),
            company: optional_str(&params, "company"),
            job_title: optional_str(&params, "jobTitle"),
            bio: optional_str(&params, "bio"),
            interests: optional_str(&params, "interests"),
        };

        let outcome = self.services.ingestor.join_event(token, profile).await?;
        Ok(json!({
            "success": true,
            "user": outcome.person,
            "event": outcome.event,
            "alreadyJoined": !outcome.newly_joined,
        }))
    }
}

/// Tool for recording that two attendees met
pub struct RecordMeetingTool {
    services: Arc<Services>,
}

impl RecordMeetingTool {
    pub const fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Tool for RecordMeetingTool {
    fn name(&self) -> &'static str {
        "record_meeting"
    }

    fn description(&self) -> &'static str {
        "Record that two attendees met, with an optional note"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "userAId": { "type": "string" },
                "userBId": { "type": "string" },
                "note": { "type": "string", "description": "What you talked about" },
                "eventId": { "type": "string" }
            },
            "required": ["userAId", "userBId"]
        })
    }

    async fn execute(&self, params: Value) -> ToolResult {
        let from = required_str(&params, "userAId")?;
        let to = required_str(&params, "userBId")?;
        let note = optional_str(&params, "note");
        let event_id = params
            .get("eventId")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let meeting = self
            .services
            .ingestor
            .record_meeting(from, to, &note, event_id)
            .await?;
        Ok(json!({ "success": true, "meeting": meeting }))
    }
}

/// Tool for listing everyone a person has met
pub struct ListMetTool {
    services: Arc<Services>,
}

impl ListMetTool {
    pub const fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Tool for ListMetTool {
    fn name(&self) -> &'static str {
        "list_met"
    }

    fn description(&self) -> &'static str {
        "List the people a user has met, most recent first"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "userId": { "type": "string" }
            },
            "required": ["userId"]
        })
    }

    async fn execute(&self, params: Value) -> ToolResult {
        let user_id = required_str(&params, "userId")?;
        let contacts = self
            .services
            .ingestor
            .directory()
            .list_met(user_id)
            .await
            .map_err(|e| ToolError::internal_error(format!("Failed to list meetings: {e}")))?;

        Ok(json!({
            "count": contacts.len(),
            "contacts": contacts,
        }))
    }
}
