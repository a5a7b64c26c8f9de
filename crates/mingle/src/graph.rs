#![forbid(unsafe_code)]

//! Graph store abstraction and record projections.
//!
//! A traversal returns loosely shaped rows: a column may hold a whole node,
//! a relationship, or a scalar under whatever alias the statement chose.
//! [`GraphRecord`] tags each column and offers projections that recover a
//! person and an optional event from any of those shapes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::types::{Event, EventRef, Meeting, Person};

/// Read access to the graph. Every traversal runs inside its own session.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn GraphSession>>;
}

/// A request-scoped session. Callers must `close` it on every exit path.
#[async_trait]
pub trait GraphSession: Send {
    async fn run(&mut self, statement: &str, params: Value) -> Result<Vec<GraphRecord>>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Parameterised writes that mirror directory changes into the graph.
#[async_trait]
pub trait GraphWriter: Send + Sync {
    async fn upsert_attendance(&self, person: &Person, event: &Event, joined_at: i64) -> Result<()>;

    /// Writes both directions of the meeting.
    async fn record_meeting(&self, meeting: &Meeting) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphValue {
    Node {
        #[serde(default)]
        labels: Vec<String>,
        properties: Map<String, Value>,
    },
    Relationship {
        properties: Map<String, Value>,
    },
    Scalar {
        value: Value,
    },
}

impl GraphValue {
    pub fn node(labels: &[&str], properties: Value) -> Self {
        Self::Node {
            labels: labels.iter().map(|l| (*l).to_string()).collect(),
            properties: into_map(properties),
        }
    }

    pub fn scalar(value: impl Into<Value>) -> Self {
        Self::Scalar {
            value: value.into(),
        }
    }

    fn node_properties(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Node { properties, .. } => Some(properties),
            _ => None,
        }
    }

    fn has_label(&self, label: &str) -> bool {
        matches!(self, Self::Node { labels, .. } if labels.iter().any(|l| l == label))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphRecord {
    pub columns: Vec<(String, GraphValue)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonProjection {
    pub id: String,
    pub name: String,
    pub company: String,
    pub job_title: String,
}

impl PersonProjection {
    pub fn is_blank(&self) -> bool {
        self.id.is_empty() && self.name.is_empty()
    }
}

impl GraphRecord {
    pub fn new(columns: Vec<(String, GraphValue)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, key: &str) -> Option<&GraphValue> {
        self.columns.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// The person this row is about.
    ///
    /// Preference order: a node in column `p`, then the first node labelled
    /// `Person`, then scalar columns read as a flat object (`name`, `p.name`
    /// and `other.name` all count as `name`).
    pub fn person(&self) -> PersonProjection {
        let node = self
            .get("p")
            .and_then(GraphValue::node_properties)
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|(_, v)| v.has_label("Person"))
                    .and_then(|(_, v)| v.node_properties())
            });

        if let Some(props) = node {
            return PersonProjection {
                id: string_prop(props, "id"),
                name: string_prop(props, "name"),
                company: string_prop(props, "company"),
                job_title: string_prop(props, "jobTitle"),
            };
        }

        let flat = self.flatten_scalars();
        PersonProjection {
            id: string_prop(&flat, "id"),
            name: string_prop(&flat, "name"),
            company: string_prop(&flat, "company"),
            job_title: string_prop(&flat, "jobTitle"),
        }
    }

    /// The associated event, if the row carries one in column `e` or as an
    /// `Event` node.
    pub fn event(&self) -> Option<EventRef> {
        let props = self
            .get("e")
            .and_then(GraphValue::node_properties)
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|(_, v)| v.has_label("Event"))
                    .and_then(|(_, v)| v.node_properties())
            })?;

        let date = props.get("date").and_then(value_to_string);
        Some(EventRef {
            name: string_prop(props, "name"),
            date,
        })
    }

    fn flatten_scalars(&self) -> Map<String, Value> {
        let mut flat = Map::new();
        for (key, value) in &self.columns {
            if let GraphValue::Scalar { value } = value {
                let short = key.rsplit('.').next().unwrap_or(key);
                flat.entry(short.to_string()).or_insert_with(|| value.clone());
            }
        }
        flat
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn string_prop(props: &Map<String, Value>, key: &str) -> String {
    props.get(key).and_then(value_to_string).unwrap_or_default()
}
