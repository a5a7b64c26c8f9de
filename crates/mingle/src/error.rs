#![forbid(unsafe_code)]

use thiserror::Error;

use crate::types::QueryMode;

/// Errors surfaced by the query engine and its collaborators.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("embedding provider error: {0}")]
    Embedding(String),

    #[error("generation model error: {0}")]
    Generation(String),

    #[error("graph store error: {0}")]
    Graph(String),

    #[error("store error: {0}")]
    Store(#[from] std::io::Error),

    #[error("{stage} timed out after {timeout_ms}ms")]
    Timeout {
        stage: &'static str,
        timeout_ms: u64,
    },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The only failure a caller of [`crate::engine::QueryEngine::query`] sees.
    #[error("failed to process query")]
    QueryFailed { mode: QueryMode },
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Bound an async call, mapping expiry to [`EngineError::Timeout`].
pub async fn with_timeout<T, F>(stage: &'static str, limit: std::time::Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout {
            stage,
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
