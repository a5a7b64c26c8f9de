#![forbid(unsafe_code)]

//! Neo4j over its transactional HTTP API.
//!
//! A session is an explicit transaction: opened with `POST /db/{db}/tx`,
//! used via `POST {tx}`, and released with `DELETE {tx}` (rollback). Reads
//! never commit. Writes from ingestion go through the one-shot
//! `/tx/commit` endpoint with fixed, parameterised statements.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::graph::{GraphRecord, GraphSession, GraphStore, GraphValue, GraphWriter};
use crate::types::{Event, Meeting, Person};

const UPSERT_ATTENDANCE: &str = "MERGE (p:Person {id: $personId})
SET p.name = $name, p.email = $email, p.company = $company, p.jobTitle = $jobTitle, p.bio = $bio
MERGE (e:Event {id: $eventId})
SET e.name = $eventName, e.date = $eventDate, e.location = $eventLocation
MERGE (p)-[r:ATTENDED]->(e)
SET r.joinedAt = $joinedAt";

const RECORD_MEETING: &str = "MATCH (a:Person {id: $from}), (b:Person {id: $to})
MERGE (a)-[r1:MET_AT]->(b)
MERGE (b)-[r2:MET_AT]->(a)
SET r1.note = $note, r1.at = $at, r1.eventId = $eventId,
    r2.note = $note, r2.at = $at, r2.eventId = $eventId";

#[derive(Debug, Serialize)]
struct Statement<'a> {
    statement: &'a str,
    parameters: Value,
    #[serde(rename = "resultDataContents")]
    result_data_contents: [&'static str; 1],
}

#[derive(Debug, Serialize)]
struct StatementBatch<'a> {
    statements: Vec<Statement<'a>>,
}

#[derive(Debug, Default, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
    commit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: Vec<Value>,
    #[serde(default)]
    meta: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

#[derive(Clone)]
pub struct Neo4jHttpStore {
    client: reqwest::Client,
    base_url: String,
    database: String,
    user: String,
    password: Option<String>,
}

impl Neo4jHttpStore {
    pub fn new(client: reqwest::Client, config: &EngineConfig, password: Option<String>) -> Self {
        Self {
            client,
            base_url: config.neo4j_url.trim_end_matches('/').to_string(),
            database: config.neo4j_database.clone(),
            user: config.neo4j_user.clone(),
            password,
        }
    }

    fn tx_endpoint(&self) -> String {
        format!("{}/db/{}/tx", self.base_url, self.database)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.password {
            Some(password) => builder.basic_auth(&self.user, Some(password)),
            None => builder,
        }
    }

    async fn post_batch(&self, url: &str, batch: &StatementBatch<'_>) -> Result<TxResponse> {
        let response = self
            .request(reqwest::Method::POST, url)
            .json(batch)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Graph(format!("HTTP {status}: {body}")));
        }

        let parsed: TxResponse = response.json().await?;
        if let Some(err) = parsed.errors.first() {
            return Err(EngineError::Graph(format!("{}: {}", err.code, err.message)));
        }
        Ok(parsed)
    }

    async fn commit(&self, statement: &str, parameters: Value) -> Result<()> {
        let url = format!("{}/commit", self.tx_endpoint());
        let batch = StatementBatch {
            statements: vec![Statement {
                statement,
                parameters,
                result_data_contents: ["row"],
            }],
        };
        self.post_batch(&url, &batch).await.map(|_| ())
    }
}

#[async_trait]
impl GraphStore for Neo4jHttpStore {
    async fn open_session(&self) -> Result<Box<dyn GraphSession>> {
        let opened = self
            .post_batch(&self.tx_endpoint(), &StatementBatch { statements: Vec::new() })
            .await?;
        let commit = opened
            .commit
            .ok_or_else(|| EngineError::Graph("transaction response had no commit URL".to_string()))?;
        let tx_url = commit
            .strip_suffix("/commit")
            .map(str::to_string)
            .ok_or_else(|| EngineError::Graph(format!("unexpected commit URL {commit}")))?;

        debug!(tx = %tx_url, "opened graph session");
        Ok(Box::new(Neo4jSession {
            store: self.clone(),
            tx_url,
        }))
    }
}

#[async_trait]
impl GraphWriter for Neo4jHttpStore {
    async fn upsert_attendance(&self, person: &Person, event: &Event, joined_at: i64) -> Result<()> {
        self.commit(
            UPSERT_ATTENDANCE,
            json!({
                "personId": person.id,
                "name": person.name,
                "email": person.email,
                "company": person.company,
                "jobTitle": person.job_title,
                "bio": person.bio,
                "eventId": event.id,
                "eventName": event.name,
                "eventDate": event.date,
                "eventLocation": event.location,
                "joinedAt": joined_at,
            }),
        )
        .await
    }

    async fn record_meeting(&self, meeting: &Meeting) -> Result<()> {
        self.commit(
            RECORD_MEETING,
            json!({
                "from": meeting.from,
                "to": meeting.to,
                "note": meeting.note,
                "at": meeting.at,
                "eventId": meeting.event_id,
            }),
        )
        .await
    }
}

struct Neo4jSession {
    store: Neo4jHttpStore,
    tx_url: String,
}

#[async_trait]
impl GraphSession for Neo4jSession {
    async fn run(&mut self, statement: &str, params: Value) -> Result<Vec<GraphRecord>> {
        let batch = StatementBatch {
            statements: vec![Statement {
                statement,
                parameters: params,
                result_data_contents: ["row"],
            }],
        };
        let response = self.store.post_batch(&self.tx_url, &batch).await?;
        Ok(response
            .results
            .into_iter()
            .flat_map(|result| rows_to_records(&result.columns, result.data))
            .collect())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let response = self
            .store
            .request(reqwest::Method::DELETE, &self.tx_url)
            .send()
            .await?;
        match response.status() {
            // An expired transaction is already released.
            status if status.is_success() || status == StatusCode::NOT_FOUND => {
                debug!(tx = %self.tx_url, "closed graph session");
                Ok(())
            }
            status => Err(EngineError::Graph(format!(
                "failed to release transaction: HTTP {status}"
            ))),
        }
    }
}

fn rows_to_records(columns: &[String], rows: Vec<TxRow>) -> Vec<GraphRecord> {
    rows.into_iter()
        .map(|TxRow { row: values, meta }| {
            let cells = values
                .into_iter()
                .enumerate()
                .map(|(idx, value)| {
                    let key = columns.get(idx).cloned().unwrap_or_else(|| idx.to_string());
                    let tagged = tag_value(&key, value, meta.get(idx).unwrap_or(&Value::Null));
                    (key, tagged)
                })
                .collect();
            GraphRecord::new(cells)
        })
        .collect()
}

/// Neo4j's row format returns node properties as a bare object; the parallel
/// `meta` entry says whether it was a node or relationship. Labels are not in
/// row output, so nodes under the conventional `p`/`e` aliases get theirs
/// inferred.
fn tag_value(key: &str, value: Value, meta: &Value) -> GraphValue {
    let kind = meta.get("type").and_then(Value::as_str);
    match (kind, value) {
        (Some("node"), Value::Object(properties)) => {
            let labels = match key {
                "p" => vec!["Person".to_string()],
                "e" => vec!["Event".to_string()],
                _ => Vec::new(),
            };
            GraphValue::Node { labels, properties }
        }
        (Some("relationship"), Value::Object(properties)) => GraphValue::Relationship { properties },
        (_, value) => GraphValue::Scalar { value },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_to_records_tags_nodes_and_scalars() {
        let body = json!({
            "results": [{
                "columns": ["p", "e", "note"],
                "data": [{
                    "row": [{"id": "b", "name": "Bo"}, {"name": "RustConf"}, "talked about ML"],
                    "meta": [{"id": 1, "type": "node", "deleted": false},
                             {"id": 2, "type": "node", "deleted": false},
                             null]
                }]
            }],
            "errors": []
        });
        let parsed: TxResponse = serde_json::from_value(body).unwrap();
        let result = parsed.results.into_iter().next().unwrap();
        let records = rows_to_records(&result.columns, result.data);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].person().name, "Bo");
        assert_eq!(records[0].event().unwrap().name, "RustConf");
        assert_eq!(
            records[0].get("note"),
            Some(&GraphValue::scalar("talked about ML"))
        );
    }

    #[test]
    fn test_tx_errors_deserialize() {
        let body = json!({
            "results": [],
            "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "bad"}]
        });
        let parsed: TxResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.errors[0].code, "Neo.ClientError.Statement.SyntaxError");
        assert!(parsed.commit.is_none());
    }

    #[test]
    fn test_statement_serializes_result_contents() {
        let stmt = Statement {
            statement: "MATCH (p:Person) RETURN p",
            parameters: json!({"userId": "a"}),
            result_data_contents: ["row"],
        };
        let value = serde_json::to_value(&stmt).unwrap();
        assert_eq!(value["resultDataContents"], json!(["row"]));
        assert_eq!(value["parameters"]["userId"], "a");
    }
}
