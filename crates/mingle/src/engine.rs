#![forbid(unsafe_code)]

//! The query engine: one entry point over both retrieval pipelines.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::graph::GraphStore;
use crate::planner;
use crate::providers::{EmbeddingProvider, GenerationModel};
use crate::rag::{RagOptions, SemanticPipeline};
use crate::store::{ProfileStore, VectorIndex};
use crate::traversal::TraversalPipeline;
use crate::types::{AiQueryRequest, AiQueryResponse};

/// Collaborators the engine is built from. Constructed once by the host and
/// shared across requests.
#[derive(Clone)]
pub struct EngineClients {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub model: Arc<dyn GenerationModel>,
    pub index: Arc<dyn VectorIndex>,
    pub profiles: Arc<dyn ProfileStore>,
    pub graph: Arc<dyn GraphStore>,
}

pub struct QueryEngine {
    semantic: SemanticPipeline,
    traversal: TraversalPipeline,
}

impl QueryEngine {
    pub fn new(clients: EngineClients, config: &EngineConfig) -> Self {
        let semantic = SemanticPipeline::new(
            clients.embedder,
            clients.index,
            clients.profiles,
            Arc::clone(&clients.model),
            RagOptions::from(config),
        );
        let traversal = TraversalPipeline::new(clients.model, clients.graph, config);
        Self {
            semantic,
            traversal,
        }
    }

    /// Answer a natural-language question about the user's network.
    ///
    /// An empty query is rejected before any collaborator is called. Any
    /// failure that survives the fallback rules comes back as
    /// [`EngineError::QueryFailed`].
    #[instrument(skip(self, request), fields(mode = ?request.mode, user = ?request.user_id))]
    pub async fn query(&self, request: &AiQueryRequest) -> Result<AiQueryResponse> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(EngineError::InvalidInput("query is required".to_string()));
        }

        let started = Instant::now();
        let route = planner::select_route(request.mode, query);
        let user_id = request.user_id.as_deref();

        let planned = planner::dispatch(
            route,
            self.semantic.execute(query),
            self.traversal.execute(query, user_id),
        )
        .await;

        let mode_used = planned.mode_used;
        let response = planned.into_response(request.mode)?;
        info!(
            route = ?route,
            mode_used = mode_used.as_str(),
            results = response.results.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "query answered"
        );
        Ok(response)
    }
}
