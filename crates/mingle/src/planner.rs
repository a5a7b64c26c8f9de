#![forbid(unsafe_code)]

//! Mode selection and fallback between the two retrieval pipelines.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{error, info, warn};

use crate::error::{EngineError, Result};
use crate::types::{AiQueryResponse, ModeUsed, PipelineOutcome, QueryMode};

static RELATIONSHIP_INTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(met|meet|know|connected|relationship|mutual|both attended)\b")
        .expect("valid relationship intent pattern")
});

/// Whether the question is about who is connected to whom.
pub fn has_relationship_intent(query: &str) -> bool {
    RELATIONSHIP_INTENT.is_match(query)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Semantic,
    Traversal,
    /// Graph first; semantic retrieval if it comes back empty or fails.
    TraversalThenSemantic,
}

pub fn select_route(mode: QueryMode, query: &str) -> Route {
    match mode {
        QueryMode::Rag => Route::Semantic,
        QueryMode::Cypher => Route::Traversal,
        QueryMode::Auto if has_relationship_intent(query) => Route::TraversalThenSemantic,
        QueryMode::Auto => Route::Semantic,
    }
}

/// The outcome of a planned query before it is turned into a response.
#[derive(Debug)]
pub struct Planned {
    pub outcome: PipelineOutcome,
    pub mode_used: ModeUsed,
}

impl Planned {
    /// Collapse into the caller-facing response. Failures are logged in full
    /// and replaced by [`EngineError::QueryFailed`].
    pub fn into_response(self, requested: QueryMode) -> Result<AiQueryResponse> {
        match self.outcome {
            PipelineOutcome::Hits { results, summary } => Ok(AiQueryResponse {
                results,
                summary,
                mode_used: self.mode_used,
            }),
            PipelineOutcome::Empty { summary } => Ok(AiQueryResponse {
                results: Vec::new(),
                summary,
                mode_used: self.mode_used,
            }),
            PipelineOutcome::Failed(err) => {
                error!(mode = self.mode_used.as_str(), error = %err, "query failed");
                Err(EngineError::QueryFailed { mode: requested })
            }
        }
    }
}

/// Run a route. `semantic` and `traversal` are only polled when the route
/// calls for them, in route order.
pub async fn dispatch<S, T>(route: Route, semantic: S, traversal: T) -> Planned
where
    S: Future<Output = PipelineOutcome>,
    T: Future<Output = PipelineOutcome>,
{
    match route {
        Route::Semantic => Planned {
            outcome: semantic.await,
            mode_used: ModeUsed::Rag,
        },
        Route::Traversal => Planned {
            outcome: traversal.await,
            mode_used: ModeUsed::Cypher,
        },
        Route::TraversalThenSemantic => match traversal.await {
            hits @ PipelineOutcome::Hits { .. } => Planned {
                outcome: hits,
                mode_used: ModeUsed::Cypher,
            },
            PipelineOutcome::Empty { summary } => {
                info!(%summary, "graph traversal found nothing, falling back to semantic retrieval");
                Planned {
                    outcome: semantic.await,
                    mode_used: ModeUsed::AutoRagFallback,
                }
            }
            PipelineOutcome::Failed(err) => {
                warn!(error = %err, "graph traversal failed, falling back to semantic retrieval");
                Planned {
                    outcome: semantic.await,
                    mode_used: ModeUsed::AutoRagFallback,
                }
            }
        },
    }
}
