#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const CONFIG_FILENAME: &str = "config.json";

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_API_BASE: &str = "MINGLE_API_BASE";
pub const ENV_GENERATION_MODEL: &str = "MINGLE_GENERATION_MODEL";
pub const ENV_NEO4J_URL: &str = "MINGLE_NEO4J_URL";
pub const ENV_NEO4J_PASSWORD: &str = "NEO4J_PASSWORD";

/// Engine settings persisted in `.mingle/config.json`. Secrets never live here;
/// they come from the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub version: i64,
    pub api_base: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub generation_model: String,
    pub rag_temperature: f32,
    pub traversal_temperature: f32,
    pub neo4j_url: String,
    pub neo4j_database: String,
    pub neo4j_user: String,
    pub rag_top_k: usize,
    pub rag_min_similarity: Option<f32>,
    pub rag_fallback_results: usize,
    pub why_max_chars: usize,
    pub traversal_limit: usize,
    pub generation_timeout_ms: u64,
    pub graph_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: 1,
            api_base: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
            generation_model: "gpt-4o-mini".to_string(),
            rag_temperature: 0.3,
            traversal_temperature: 0.1,
            neo4j_url: "http://localhost:7474".to_string(),
            neo4j_database: "neo4j".to_string(),
            neo4j_user: "neo4j".to_string(),
            rag_top_k: 20,
            rag_min_similarity: Some(0.7),
            rag_fallback_results: 5,
            why_max_chars: 100,
            traversal_limit: 20,
            generation_timeout_ms: 30_000,
            graph_timeout_ms: 10_000,
        }
    }
}

impl EngineConfig {
    pub const fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub const fn graph_timeout(&self) -> Duration {
        Duration::from_millis(self.graph_timeout_ms)
    }

    /// Apply `MINGLE_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base) = lookup(ENV_API_BASE).filter(|v| !v.is_empty()) {
            self.api_base = base;
        }
        if let Some(model) = lookup(ENV_GENERATION_MODEL).filter(|v| !v.is_empty()) {
            self.generation_model = model;
        }
        if let Some(url) = lookup(ENV_NEO4J_URL).filter(|v| !v.is_empty()) {
            self.neo4j_url = url;
        }
    }
}

pub fn config_path(project_root: &Path) -> PathBuf {
    crate::db::data_dir(project_root).join(CONFIG_FILENAME)
}

pub fn load_config(project_root: &Path) -> std::io::Result<EngineConfig> {
    let path = config_path(project_root);
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let raw = fs::read_to_string(&path)?;
    serde_json::from_str(&raw).map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

pub fn save_config(project_root: &Path, config: &EngineConfig) -> std::io::Result<()> {
    let path = config_path(project_root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let raw = serde_json::to_string_pretty(config)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    fs::write(path, raw)
}
