#![forbid(unsafe_code)]

//! Read interfaces the semantic pipeline needs from the directory.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Event, Person, VectorHit};

/// Nearest-neighbour search over stored embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `limit` hits, best first. Indexes that cannot threshold ignore
    /// `min_similarity` and report [`crate::types::VectorScore::Distance`].
    async fn search(
        &self,
        vector: &[f32],
        min_similarity: Option<f32>,
        limit: usize,
    ) -> Result<Vec<VectorHit>>;
}

/// Profile lookups.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Active persons for the given ids, deduplicated, unknown and inactive ids skipped.
    async fn resolve_persons(&self, ids: &[String]) -> Result<Vec<Person>>;

    /// Events the person attended, most recent first.
    async fn attendance_history(&self, person_id: &str) -> Result<Vec<Event>>;
}
