//! Fake collaborators and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mingle::config::EngineConfig;
use mingle::directory::Directory;
use mingle::error::{EngineError, Result};
use mingle::graph::{GraphRecord, GraphSession, GraphStore, GraphWriter};
use mingle::ingest::Ingestor;
use mingle::providers::{EmbeddingProvider, GenerationModel};
use mingle::types::{Event, Meeting, Person, ProfileInput};
use mingle::{EngineClients, QueryEngine};
use serde_json::Value;
use tempfile::TempDir;

/// Ordered record of every external call, shared by all fakes.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

const VOCABULARY: &[&str] = &["ai", "ml", "rust", "design", "finance", "robotics"];

/// Bag-of-words embedder over a tiny vocabulary plus a constant bias
/// component, so every vector is non-zero.
pub struct KeywordEmbedder {
    log: CallLog,
}

impl KeywordEmbedder {
    pub fn new(log: CallLog) -> Self {
        Self { log }
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        let mut vector: Vec<f32> = VOCABULARY
            .iter()
            .map(|word| if tokens.contains(word) { 1.0 } else { 0.0 })
            .collect();
        vector.push(1.0);
        vector
    }
}

pub const DIMENSIONS: usize = 7;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.log.push("embed");
        Ok(Self::vector_for(text))
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn model_name(&self) -> &str {
        "keyword-test"
    }
}

/// Returns vectors of the wrong length.
pub struct BrokenEmbedder;

#[async_trait]
impl EmbeddingProvider for BrokenEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0; 3])
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn model_name(&self) -> &str {
        "broken-test"
    }
}

/// Generation model that replays scripted replies in order.
#[derive(Default)]
pub struct ScriptedModel {
    log: CallLog,
    json_replies: Mutex<VecDeque<Result<String>>>,
    text_replies: Mutex<VecDeque<Result<String>>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_json(&self, reply: impl Into<String>) {
        self.json_replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn push_text(&self, reply: impl Into<String>) {
        self.text_replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn push_text_error(&self, message: &str) {
        self.text_replies
            .lock()
            .unwrap()
            .push_back(Err(EngineError::Generation(message.to_string())));
    }
}

#[async_trait]
impl GenerationModel for ScriptedModel {
    async fn generate_json(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        self.log.push("generate_json");
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.json_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(EngineError::Generation("no scripted json reply".to_string())))
    }

    async fn generate_text(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        self.log.push("generate_text");
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.text_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(EngineError::Generation("no scripted text reply".to_string())))
    }
}

pub enum GraphScript {
    Rows(Vec<GraphRecord>),
    Fail(String),
}

/// Graph store that tracks session lifecycle and executed statements.
pub struct FakeGraph {
    log: CallLog,
    script: Arc<Mutex<GraphScript>>,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    pub statements: Arc<Mutex<Vec<(String, Value)>>>,
}

impl FakeGraph {
    pub fn new(log: CallLog, script: GraphScript) -> Self {
        Self {
            log,
            script: Arc::new(Mutex::new(script)),
            opened: Arc::default(),
            closed: Arc::default(),
            statements: Arc::default(),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<String> {
        self.statements
            .lock()
            .unwrap()
            .iter()
            .map(|(s, _)| s.clone())
            .collect()
    }
}

#[async_trait]
impl GraphStore for FakeGraph {
    async fn open_session(&self) -> Result<Box<dyn GraphSession>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            log: self.log.clone(),
            script: Arc::clone(&self.script),
            closed: Arc::clone(&self.closed),
            statements: Arc::clone(&self.statements),
        }))
    }
}

struct FakeSession {
    log: CallLog,
    script: Arc<Mutex<GraphScript>>,
    closed: Arc<AtomicUsize>,
    statements: Arc<Mutex<Vec<(String, Value)>>>,
}

#[async_trait]
impl GraphSession for FakeSession {
    async fn run(&mut self, statement: &str, params: Value) -> Result<Vec<GraphRecord>> {
        self.log.push("graph.run");
        self.statements
            .lock()
            .unwrap()
            .push((statement.to_string(), params));
        match &*self.script.lock().unwrap() {
            GraphScript::Rows(rows) => Ok(rows.clone()),
            GraphScript::Fail(message) => Err(EngineError::Graph(message.clone())),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Which step of a graph session never completes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Stall {
    Open,
    RunAndClose,
}

/// A graph whose calls hang until the caller gives up.
pub struct StalledGraph {
    stall: Stall,
    pub opened: Arc<AtomicUsize>,
}

impl StalledGraph {
    pub fn new(stall: Stall) -> Self {
        Self {
            stall,
            opened: Arc::default(),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

const FOREVER: Duration = Duration::from_secs(3_600);

#[async_trait]
impl GraphStore for StalledGraph {
    async fn open_session(&self) -> Result<Box<dyn GraphSession>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.stall == Stall::Open {
            tokio::time::sleep(FOREVER).await;
        }
        Ok(Box::new(StalledSession))
    }
}

struct StalledSession;

#[async_trait]
impl GraphSession for StalledSession {
    async fn run(&mut self, _statement: &str, _params: Value) -> Result<Vec<GraphRecord>> {
        tokio::time::sleep(FOREVER).await;
        Ok(Vec::new())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        tokio::time::sleep(FOREVER).await;
        Ok(())
    }
}

/// Records mirrored writes instead of talking to a graph.
#[derive(Default)]
pub struct RecordingWriter {
    pub attendance: Mutex<Vec<(String, String)>>,
    pub meetings: Mutex<Vec<Meeting>>,
}

#[async_trait]
impl GraphWriter for RecordingWriter {
    async fn upsert_attendance(&self, person: &Person, event: &Event, _joined_at: i64) -> Result<()> {
        self.attendance
            .lock()
            .unwrap()
            .push((person.id.clone(), event.id.clone()));
        Ok(())
    }

    async fn record_meeting(&self, meeting: &Meeting) -> Result<()> {
        self.meetings.lock().unwrap().push(meeting.clone());
        Ok(())
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        embedding_dimensions: DIMENSIONS,
        generation_timeout_ms: 2_000,
        graph_timeout_ms: 2_000,
        ..EngineConfig::default()
    }
}

pub fn profile(name: &str, email: &str, company: &str, job_title: &str, bio: &str) -> ProfileInput {
    ProfileInput {
        name: name.to_string(),
        email: email.to_string(),
        company: company.to_string(),
        job_title: job_title.to_string(),
        bio: bio.to_string(),
        interests: String::new(),
    }
}

/// A fresh directory in a temp dir plus an ingestor wired to the keyword embedder.
pub struct Fixture {
    pub temp: TempDir,
    pub log: CallLog,
    pub directory: Directory,
    pub ingestor: Ingestor,
    pub writer: Arc<RecordingWriter>,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let directory = Directory::initialize(temp.path(), DIMENSIONS).unwrap();
        let log = CallLog::default();
        let writer = Arc::new(RecordingWriter::default());
        let mirror: Arc<dyn GraphWriter> = writer.clone();
        let ingestor = Ingestor::new(
            directory.clone(),
            Arc::new(KeywordEmbedder::new(log.clone())),
            Some(mirror),
        );
        Self {
            temp,
            log,
            directory,
            ingestor,
            writer,
        }
    }

    /// Ada (AI Engineer) and Bo (designer) join RustConf; Ada met Bo.
    pub async fn seed_conference(&self) -> (Event, Person, Person) {
        let event = self
            .ingestor
            .create_event("RustConf", Some("2026-09-01".to_string()), "Montreal", None)
            .await
            .unwrap();
        let ada = self
            .ingestor
            .join_event(
                &event.join_token,
                profile("Ada", "ada@example.com", "Acme", "AI Engineer", "Works on ML and rust"),
            )
            .await
            .unwrap()
            .person;
        let bo = self
            .ingestor
            .join_event(
                &event.join_token,
                profile("Bo", "bo@example.com", "Studio", "Designer", "Product design"),
            )
            .await
            .unwrap()
            .person;
        self.log.clear();
        (event, ada, bo)
    }

    pub fn engine(&self, model: Arc<ScriptedModel>, graph: Arc<dyn GraphStore>) -> QueryEngine {
        self.engine_with(model, graph, &test_config())
    }

    pub fn engine_with(
        &self,
        model: Arc<ScriptedModel>,
        graph: Arc<dyn GraphStore>,
        config: &EngineConfig,
    ) -> QueryEngine {
        let shared = Arc::new(self.directory.clone());
        QueryEngine::new(
            EngineClients {
                embedder: Arc::new(KeywordEmbedder::new(self.log.clone())),
                model,
                index: shared.clone(),
                profiles: shared,
                graph,
            },
            config,
        )
    }
}
