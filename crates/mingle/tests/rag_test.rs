//! Integration tests for semantic retrieval over the SQLite directory

mod common;

use std::sync::Arc;

use common::{
    BrokenEmbedder, FakeGraph, Fixture, GraphScript, KeywordEmbedder, ScriptedModel, profile,
    test_config,
};
use mingle::config::EngineConfig;
use mingle::error::EngineError;
use mingle::rag::{RagOptions, SemanticPipeline};
use mingle::store::VectorIndex;
use mingle::types::{AiQueryRequest, ModeUsed, PersonStatus, PipelineOutcome, QueryMode};

fn rag(query: &str) -> AiQueryRequest {
    AiQueryRequest {
        query: query.to_string(),
        mode: QueryMode::Rag,
        user_id: None,
    }
}

fn engine_parts(fixture: &Fixture) -> (Arc<ScriptedModel>, Arc<FakeGraph>) {
    (
        Arc::new(ScriptedModel::new(fixture.log.clone())),
        Arc::new(FakeGraph::new(fixture.log.clone(), GraphScript::Rows(Vec::new()))),
    )
}

#[tokio::test]
async fn test_no_embeddings_returns_empty() {
    let fixture = Fixture::new();
    let (model, graph) = engine_parts(&fixture);
    let engine = fixture.engine(model, graph);

    let response = engine.query(&rag("who works in AI")).await.unwrap();

    assert!(response.results.is_empty());
    assert_eq!(response.summary, "No relevant contacts found.");
    assert_eq!(response.mode_used, ModeUsed::Rag);
    assert_eq!(fixture.log.entries(), vec!["embed".to_string()]);
}

#[tokio::test]
async fn test_model_answer_is_returned() {
    let fixture = Fixture::new();
    let (_, ada, _) = fixture.seed_conference().await;
    let (model, graph) = engine_parts(&fixture);
    model.push_json(format!(
        r#"{{"results": [{{"id": "{}", "name": "Ada", "company": "Acme", "jobTitle": "AI Engineer",
            "why": "Builds ML systems", "event": {{"name": "RustConf"}}, "score": 0.91}}],
            "summary": "Ada works on AI at Acme."}}"#,
        ada.id
    ));
    let engine = fixture.engine(model, graph);

    let response = engine.query(&rag("who works in AI")).await.unwrap();

    assert_eq!(response.summary, "Ada works on AI at Acme.");
    assert_eq!(response.results.len(), 1);
    let result = &response.results[0];
    assert_eq!(result.job_title, "AI Engineer");
    assert_eq!(result.event.as_ref().unwrap().name, "RustConf");
    assert_eq!(result.score, Some(0.91));
}

#[tokio::test]
async fn test_null_results_are_an_explicit_empty_answer() {
    let fixture = Fixture::new();
    fixture.seed_conference().await;
    let (model, graph) = engine_parts(&fixture);
    model.push_json(r#"{"results": null, "summary": "Nobody matches."}"#);
    let engine = fixture.engine(model, graph);

    let response = engine.query(&rag("who works in AI")).await.unwrap();

    assert!(response.results.is_empty());
    assert_eq!(response.summary, "Nobody matches.");
    assert_eq!(response.mode_used, ModeUsed::Rag);
}

#[tokio::test]
async fn test_deactivated_person_is_hidden_until_rejoin() {
    let fixture = Fixture::new();
    let (event, ada, _) = fixture.seed_conference().await;
    let (model, graph) = engine_parts(&fixture);
    model.push_json("not json");
    model.push_json("not json");
    let engine = fixture.engine(model, graph);

    assert!(fixture.directory.set_status(&ada.id, PersonStatus::Inactive).await.unwrap());
    let hidden = engine.query(&rag("who works in AI")).await.unwrap();
    assert!(hidden.results.iter().all(|r| r.id != ada.id));

    fixture
        .ingestor
        .join_event(
            &event.join_token,
            profile("Ada", "ada@example.com", "Acme", "AI Engineer", "Works on ML and rust"),
        )
        .await
        .unwrap();
    let back = engine.query(&rag("who works in AI")).await.unwrap();
    assert_eq!(back.results[0].id, ada.id);
}

#[tokio::test]
async fn test_malformed_answer_uses_ranked_fallback() {
    let fixture = Fixture::new();
    let (_, ada, _) = fixture.seed_conference().await;
    let (model, graph) = engine_parts(&fixture);
    model.push_json("```json\n{\"results\": [\n```");
    let engine = fixture.engine(model, graph);

    let response = engine.query(&rag("who works in AI")).await.unwrap();

    assert_eq!(
        response.summary,
        "Found relevant contacts based on your query."
    );
    assert_eq!(response.results.len(), 1);
    let result = &response.results[0];
    assert_eq!(result.id, ada.id);
    assert_eq!(result.company, "Acme");
    assert!(result.why.starts_with("Ada. AI Engineer at Acme"));
    let score = result.score.unwrap();
    assert!((score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-4);
}

#[tokio::test]
async fn test_fallback_caps_at_five_distinct_people() {
    let fixture = Fixture::new();
    let event = fixture
        .ingestor
        .create_event("AI Summit", None, "Berlin", None)
        .await
        .unwrap();
    for i in 0..7 {
        let long_bio = format!("AI and ML research {}", "x".repeat(150));
        fixture
            .ingestor
            .join_event(
                &event.join_token,
                profile(&format!("Person {i}"), &format!("p{i}@example.com"), "Lab", "Researcher", &long_bio),
            )
            .await
            .unwrap();
    }
    let (model, graph) = engine_parts(&fixture);
    model.push_json("I could not decide.");
    let engine = fixture.engine(model, graph);

    let response = engine.query(&rag("AI")).await.unwrap();

    assert_eq!(response.results.len(), 5);
    assert!(response.results.iter().all(|r| r.why.chars().count() <= 100));
    let mut ids: Vec<_> = response.results.iter().map(|r| r.id.clone()).collect();
    ids.dedup();
    assert_eq!(ids.len(), 5);
}

#[tokio::test]
async fn test_threshold_filters_unrelated_profiles() {
    let fixture = Fixture::new();
    fixture.seed_conference().await;

    let hits = fixture
        .directory
        .search(&KeywordEmbedder::vector_for("AI"), Some(0.7), 20)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);

    let unfiltered = fixture
        .directory
        .search(&KeywordEmbedder::vector_for("AI"), None, 20)
        .await
        .unwrap();
    assert_eq!(unfiltered.len(), 2);
    assert!(unfiltered[0].score.relevance() >= unfiltered[1].score.relevance());
}

#[tokio::test]
async fn test_meeting_notes_are_searchable() {
    let fixture = Fixture::new();
    let (_, ada, bo) = fixture.seed_conference().await;
    fixture
        .ingestor
        .record_meeting(&ada.id, &bo.id, "talked about robotics", None)
        .await
        .unwrap();

    let (model, graph) = engine_parts(&fixture);
    model.push_json("nope");
    let engine = fixture.engine(model, graph);

    let response = engine.query(&rag("robotics")).await.unwrap();

    let names: Vec<_> = response.results.iter().map(|r| r.name.as_str()).collect();
    assert!(names.contains(&"Ada"));
    assert!(names.contains(&"Bo"));
    assert!(response.results[0].why.starts_with("Meeting between Ada"));
}

#[tokio::test]
async fn test_wrong_dimension_embedding_is_hard_failure() {
    let fixture = Fixture::new();
    fixture.seed_conference().await;
    let shared = Arc::new(fixture.directory.clone());
    let pipeline = SemanticPipeline::new(
        Arc::new(BrokenEmbedder),
        shared.clone(),
        shared,
        Arc::new(ScriptedModel::new(fixture.log.clone())),
        RagOptions::from(&test_config()),
    );

    let outcome = pipeline.execute("who works in AI").await;

    assert!(matches!(
        outcome,
        PipelineOutcome::Failed(EngineError::Embedding(_))
    ));
}

#[tokio::test]
async fn test_empty_model_answer_without_threshold() {
    let fixture = Fixture::new();
    fixture.seed_conference().await;
    let (model, graph) = engine_parts(&fixture);
    model.push_json("{}");
    let config = EngineConfig {
        rag_min_similarity: None,
        ..test_config()
    };
    let engine = fixture.engine_with(model, graph, &config);

    // Valid JSON with no results is an explicit empty answer.
    let response = engine.query(&rag("who works in AI")).await.unwrap();
    assert!(response.results.is_empty());
    assert_eq!(response.summary, "Found relevant contacts.");
    assert_eq!(response.mode_used, ModeUsed::Rag);
}
