#![forbid(unsafe_code)]

//! Graph retrieval: the generation model writes a read-only traversal, the
//! safety validator screens it, and the graph store runs it in a scoped
//! session.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::{Result, with_timeout};
use crate::graph::{GraphRecord, GraphStore};
use crate::providers::GenerationModel;
use crate::safety;
use crate::types::{AiQueryResult, PipelineOutcome};

pub const UNSUPPORTED_MARKER: &str = "UNSUPPORTED";
pub const NO_STATEMENT_SUMMARY: &str = "Could not generate a valid query for this request.";
pub const FORBIDDEN_SUMMARY: &str = "Query contains forbidden operations.";
pub const GRAPH_WHY: &str = "Found via graph query";

pub const TRAVERSAL_SYSTEM_PROMPT: &str = r"You translate questions about a professional networking graph into Cypher.

Schema:
- (:Person {id, name, email, company, jobTitle, bio})
- (:Event {id, name, date, location})
- (:Person)-[:ATTENDED]->(:Event)
- (:Person)-[:MET_AT {note, at, eventId}]->(:Person)

Rules:
- Output ONLY the Cypher statement. No explanations, no markdown, no code fences.
- Read-only: use only MATCH, OPTIONAL MATCH, WHERE, WITH, RETURN, DISTINCT, ORDER BY and LIMIT.
- Return the matched person as `p` and, when relevant, the event as `e`.
- Use case-insensitive matching (toLower) for text comparisons.
- When the question is about the asking user, anchor on (me:Person {id: $userId}).
- Always end with LIMIT 20 or less.
- If the question cannot be answered from this schema, output exactly: UNSUPPORTED";

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z]*").expect("valid code fence pattern"));

/// Remove markdown fence markers (with or without a language tag).
pub fn strip_code_fences(raw: &str) -> String {
    CODE_FENCE.replace_all(raw, "").trim().to_string()
}

pub fn summary_for(count: usize) -> String {
    format!("Found {count} matching contact(s) using graph relationships.")
}

pub struct TraversalPipeline {
    model: Arc<dyn GenerationModel>,
    graph: Arc<dyn GraphStore>,
    limit: usize,
    generation_timeout: Duration,
    graph_timeout: Duration,
}

impl TraversalPipeline {
    pub fn new(
        model: Arc<dyn GenerationModel>,
        graph: Arc<dyn GraphStore>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            model,
            graph,
            limit: config.traversal_limit,
            generation_timeout: config.generation_timeout(),
            graph_timeout: config.graph_timeout(),
        }
    }

    pub async fn execute(&self, query: &str, user_id: Option<&str>) -> PipelineOutcome {
        match self.run(query, user_id).await {
            Ok(outcome) => outcome,
            Err(err) => PipelineOutcome::Failed(err),
        }
    }

    #[instrument(name = "traversal", skip(self, query))]
    async fn run(&self, query: &str, user_id: Option<&str>) -> Result<PipelineOutcome> {
        let user_prompt = match user_id {
            Some(id) => format!("The asking user's id is available as $userId ({id}).\n\nQuestion: {query}"),
            None => format!("Question: {query}"),
        };

        let raw = with_timeout(
            "generation",
            self.generation_timeout,
            self.model.generate_text(TRAVERSAL_SYSTEM_PROMPT, &user_prompt),
        )
        .await?;

        let statement = strip_code_fences(&raw);
        if statement.is_empty() || statement == UNSUPPORTED_MARKER {
            debug!("model declined to produce a traversal");
            return Ok(PipelineOutcome::Empty {
                summary: NO_STATEMENT_SUMMARY.to_string(),
            });
        }

        if let Some(keyword) = safety::forbidden_keyword(&statement) {
            warn!(%keyword, %statement, "rejected generated traversal");
            return Ok(PipelineOutcome::Empty {
                summary: FORBIDDEN_SUMMARY.to_string(),
            });
        }

        let records = self.run_in_session(&statement, user_id).await?;
        let results = normalize(records, self.limit);
        info!(results = results.len(), "graph traversal answered");

        let summary = summary_for(results.len());
        Ok(PipelineOutcome::from_results(results, summary))
    }

    /// Runs the statement in a fresh session and closes it whatever happens.
    /// Opening, running and closing are each bounded by the graph timeout.
    async fn run_in_session(&self, statement: &str, user_id: Option<&str>) -> Result<Vec<GraphRecord>> {
        let mut session =
            with_timeout("graph open", self.graph_timeout, self.graph.open_session()).await?;
        let params = json!({ "userId": user_id });

        let outcome = with_timeout("graph", self.graph_timeout, session.run(statement, params)).await;

        // A close that fails or stalls never overrides the run outcome.
        if let Err(err) = with_timeout("graph close", self.graph_timeout, session.close()).await {
            warn!(error = %err, "failed to close graph session");
        }
        outcome
    }
}

/// Map raw rows to results, skipping rows with no recognisable person.
pub fn normalize(records: Vec<GraphRecord>, limit: usize) -> Vec<AiQueryResult> {
    records
        .iter()
        .filter_map(|record| {
            let person = record.person();
            if person.is_blank() {
                return None;
            }
            Some(AiQueryResult {
                id: person.id,
                name: person.name,
                company: person.company,
                job_title: person.job_title,
                why: GRAPH_WHY.to_string(),
                event: record.event(),
                met_at: None,
                score: None,
            })
        })
        .take(limit)
        .collect()
}
