#![forbid(unsafe_code)]

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonStatus {
    #[default]
    Active,
    Inactive,
}

/// A profile as the directory stores it. Never hard-deleted; see [`PersonStatus`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub interests: String,
    #[serde(default)]
    pub status: PersonStatus,
}

/// Editable profile fields, as submitted on event join or profile edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub interests: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub name: String,
    pub date: Option<String>,
    #[serde(default)]
    pub location: String,
    pub capacity: Option<u32>,
    pub join_token: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub person_id: String,
    pub event_id: String,
    pub joined_at: i64,
}

/// One direction of a MET_AT relation. Always stored in pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub from: String,
    pub to: String,
    pub note: String,
    pub at: i64,
    pub event_id: Option<String>,
}

impl Meeting {
    pub fn reversed(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
            note: self.note.clone(),
            at: self.at,
            event_id: self.event_id.clone(),
        }
    }
}

/// Someone a person has met, with the note left on the edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetContact {
    pub person: Person,
    pub note: String,
    pub met_at: i64,
    pub event_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    Person,
    Note,
}

impl OwnerType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Note => "note",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "person" => Some(Self::Person),
            "note" => Some(Self::Note),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: i64,
    pub owner_type: OwnerType,
    pub owner_id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub created_at: i64,
}

/// How a vector index reports closeness. Indexes that threshold report
/// similarity; the rest report a raw distance usable only for ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorScore {
    Similarity(f32),
    Distance(f32),
}

impl VectorScore {
    pub fn distance(self) -> f32 {
        match self {
            Self::Similarity(sim) => 1.0 - sim,
            Self::Distance(dist) => dist,
        }
    }

    /// `1 - distance`, which for a similarity score is the similarity itself.
    pub fn relevance(self) -> f32 {
        1.0 - self.distance()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub owner_type: OwnerType,
    pub owner_id: String,
    pub text: String,
    pub score: VectorScore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    #[default]
    Auto,
    Rag,
    Cypher,
}

impl FromStr for QueryMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "rag" => Ok(Self::Rag),
            "cypher" => Ok(Self::Cypher),
            other => Err(EngineError::InvalidInput(format!(
                "unknown mode '{other}' (expected auto, rag or cypher)"
            ))),
        }
    }
}

/// Which pipeline actually served a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModeUsed {
    #[serde(rename = "rag")]
    Rag,
    #[serde(rename = "cypher")]
    Cypher,
    #[serde(rename = "auto (rag fallback)")]
    AutoRagFallback,
}

impl ModeUsed {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rag => "rag",
            Self::Cypher => "cypher",
            Self::AutoRagFallback => "auto (rag fallback)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiQueryRequest {
    pub query: String,
    #[serde(default)]
    pub mode: QueryMode,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRef {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// A single contact in a query answer. Both pipelines normalize into this.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiQueryResult {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub company: String,
    #[serde(default, rename = "jobTitle")]
    pub job_title: String,
    #[serde(default)]
    pub why: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub met_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiQueryResponse {
    pub results: Vec<AiQueryResult>,
    pub summary: String,
    pub mode_used: ModeUsed,
}

/// What a retrieval pipeline hands back to the planner.
#[derive(Debug)]
pub enum PipelineOutcome {
    Hits {
        results: Vec<AiQueryResult>,
        summary: String,
    },
    Empty {
        summary: String,
    },
    Failed(EngineError),
}

impl PipelineOutcome {
    pub fn from_results(results: Vec<AiQueryResult>, summary: String) -> Self {
        if results.is_empty() {
            Self::Empty { summary }
        } else {
            Self::Hits { results, summary }
        }
    }
}
