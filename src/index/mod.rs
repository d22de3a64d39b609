//! Vector index: persisted storage of embedded chunks with k-nearest
//! similarity search.

mod sqlite;

pub use sqlite::SqliteVectorIndex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunking::Chunk;
use crate::errors::ServiceError;

/// One persisted row: an embedding vector and the chunk it represents.
/// Owned exclusively by the index. All vectors in one index share a single
/// dimensionality, fixed by the first upsert.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// A retrieved chunk with its similarity score (higher is better).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Storage capability for embedded chunks.
///
/// Implementations must make `upsert` idempotent per
/// `(source_id, sequence_index)` pair and `search` deterministic for a
/// fixed index (ties broken by insertion order, earliest first).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Persist entries, overwriting any prior entry for the same
    /// `(source_id, sequence_index)` pair.
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), ServiceError>;

    /// Return up to `k` entries ranked by similarity to `query`.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, ServiceError>;

    async fn count(&self) -> Result<usize, ServiceError>;

    /// Whether the index has ever been populated. An unready index is a
    /// distinct condition from a query that matches nothing.
    async fn is_ready(&self) -> Result<bool, ServiceError>;
}
