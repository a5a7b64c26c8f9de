#![forbid(unsafe_code)]

//! Semantic retrieval: embed the question, pull the nearest profile and
//! meeting-note vectors, and let the generation model rank and explain the
//! matching people.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result, with_timeout};
use crate::providers::{EmbeddingProvider, GenerationModel};
use crate::store::{ProfileStore, VectorIndex};
use crate::types::{AiQueryResult, Event, Person, PipelineOutcome, VectorHit};
use crate::utils::truncate_chars;

pub const NO_CONTACTS_SUMMARY: &str = "No relevant contacts found.";
pub const FALLBACK_SUMMARY: &str = "Found relevant contacts based on your query.";
pub const DEFAULT_SUMMARY: &str = "Found relevant contacts.";

pub const RAG_SYSTEM_PROMPT: &str = r#"You are an assistant that helps users recall who they met at events.
Given the context of people and meeting notes, answer the user's query concisely.

Output ONLY valid JSON in this exact format (no markdown, no code blocks):
{
  "results": [
    {
      "id": "person id from the candidate list",
      "name": "Full Name",
      "company": "Company Name",
      "jobTitle": "Job Title",
      "why": "Brief explanation of why this person matches",
      "event": {"name": "Event Name"},
      "score": 0.95
    }
  ],
  "summary": "A brief summary of the findings"
}
"event" is optional. Order results from best to worst match."#;

#[derive(Debug, Clone, Copy)]
pub struct RagOptions {
    pub top_k: usize,
    pub min_similarity: Option<f32>,
    pub fallback_results: usize,
    pub why_max_chars: usize,
    pub generation_timeout: Duration,
}

impl From<&EngineConfig> for RagOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            top_k: config.rag_top_k,
            min_similarity: config.rag_min_similarity,
            fallback_results: config.rag_fallback_results,
            why_max_chars: config.why_max_chars,
            generation_timeout: config.generation_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelAnswer {
    #[serde(default, deserialize_with = "null_as_empty")]
    results: Vec<AiQueryResult>,
    #[serde(default)]
    summary: Option<String>,
}

/// `"results": null` reads as an explicit empty answer.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<AiQueryResult>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<Vec<AiQueryResult>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

pub struct SemanticPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    profiles: Arc<dyn ProfileStore>,
    model: Arc<dyn GenerationModel>,
    options: RagOptions,
}

impl SemanticPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        profiles: Arc<dyn ProfileStore>,
        model: Arc<dyn GenerationModel>,
        options: RagOptions,
    ) -> Self {
        Self {
            embedder,
            index,
            profiles,
            model,
            options,
        }
    }

    pub async fn execute(&self, query: &str) -> PipelineOutcome {
        match self.run(query).await {
            Ok(outcome) => outcome,
            Err(err) => PipelineOutcome::Failed(err),
        }
    }

    #[instrument(name = "rag", skip_all)]
    async fn run(&self, query: &str) -> Result<PipelineOutcome> {
        let vector = self.embedder.embed(query).await?;
        if vector.is_empty() || vector.len() != self.embedder.dimensions() {
            return Err(EngineError::Embedding(format!(
                "query vector has {} dimensions, provider declares {}",
                vector.len(),
                self.embedder.dimensions()
            )));
        }

        let hits = self
            .index
            .search(&vector, self.options.min_similarity, self.options.top_k)
            .await?;
        debug!(
            hits = hits.len(),
            embedder = self.embedder.model_name(),
            "vector search complete"
        );

        if hits.is_empty() {
            return Ok(PipelineOutcome::Empty {
                summary: NO_CONTACTS_SUMMARY.to_string(),
            });
        }

        let owner_ids = unique_owner_ids(&hits);
        let persons = self.profiles.resolve_persons(&owner_ids).await?;
        let mut history = HashMap::new();
        for person in &persons {
            let events = self.profiles.attendance_history(&person.id).await?;
            history.insert(person.id.clone(), events);
        }

        let user_prompt = build_user_prompt(query, &hits, &persons, &history);
        let raw = with_timeout(
            "generation",
            self.options.generation_timeout,
            self.model.generate_json(RAG_SYSTEM_PROMPT, &user_prompt),
        )
        .await?;

        let outcome = match serde_json::from_str::<ModelAnswer>(raw.trim()) {
            Ok(answer) => PipelineOutcome::from_results(
                answer.results,
                answer
                    .summary
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
            ),
            Err(err) => {
                warn!(error = %err, "model answer was not valid JSON, using ranked context");
                PipelineOutcome::from_results(
                    fallback_results(&hits, &persons, self.options),
                    FALLBACK_SUMMARY.to_string(),
                )
            }
        };

        if let PipelineOutcome::Hits { results, .. } = &outcome {
            info!(results = results.len(), "semantic retrieval answered");
        }
        Ok(outcome)
    }
}

fn unique_owner_ids(hits: &[VectorHit]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    hits.iter()
        .filter(|hit| seen.insert(hit.owner_id.as_str()))
        .map(|hit| hit.owner_id.clone())
        .collect()
}

/// One line per retrieved record: its source text and relevance.
pub fn build_context(hits: &[VectorHit]) -> String {
    let mut lines = String::new();
    for hit in hits {
        let _ = writeln!(
            lines,
            "- {} (relevance: {:.2})",
            hit.text,
            hit.score.relevance()
        );
    }
    lines
}

fn build_user_prompt(
    query: &str,
    hits: &[VectorHit],
    persons: &[Person],
    history: &HashMap<String, Vec<Event>>,
) -> String {
    let mut prompt = String::from("Context:\n");
    prompt.push_str(&build_context(hits));

    prompt.push_str("\nCandidates:\n");
    for person in persons {
        let events = history
            .get(&person.id)
            .map(|events| {
                events
                    .iter()
                    .map(|e| e.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        let _ = writeln!(
            prompt,
            "- id={} | {} | {} | {} | attended: {}",
            person.id,
            person.name,
            person.job_title,
            person.company,
            if events.is_empty() { "-" } else { events.as_str() }
        );
    }

    let _ = write!(prompt, "\nUser query: {query}");
    prompt
}

/// Deterministic answer built straight from the ranked hits: the first
/// `fallback_results` distinct owners that resolve to a person.
pub fn fallback_results(
    hits: &[VectorHit],
    persons: &[Person],
    options: RagOptions,
) -> Vec<AiQueryResult> {
    let by_id: HashMap<&str, &Person> = persons.iter().map(|p| (p.id.as_str(), p)).collect();
    let mut seen = std::collections::HashSet::new();

    hits.iter()
        .filter(|hit| seen.insert(hit.owner_id.as_str()))
        .filter_map(|hit| {
            let person = by_id.get(hit.owner_id.as_str())?;
            Some(AiQueryResult {
                id: person.id.clone(),
                name: person.name.clone(),
                company: person.company.clone(),
                job_title: person.job_title.clone(),
                why: truncate_chars(&hit.text, options.why_max_chars),
                event: None,
                met_at: None,
                score: Some(hit.score.relevance()),
            })
        })
        .take(options.fallback_results)
        .collect()
}
