//! Query-time retrieval: embed the query, search the index.

use std::sync::Arc;

use crate::errors::ServiceError;
use crate::index::{ScoredChunk, VectorIndex};
use crate::llm::Embedder;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    k: usize,
    max_query_length: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        k: usize,
        max_query_length: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            k,
            max_query_length,
        }
    }

    /// Map a query string to ranked candidate chunks.
    ///
    /// Queries are truncated to the configured maximum before embedding;
    /// every call re-embeds (embedding is cheap next to generation). An
    /// unpopulated index is reported as `RetrievalUnavailable` so callers
    /// can tell "no index" apart from "no matches".
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>, ServiceError> {
        if !self.index.is_ready().await? {
            return Err(ServiceError::RetrievalUnavailable);
        }

        let truncated = truncate_query(query, self.max_query_length);
        let mut vectors = self.embedder.embed(&[truncated.to_string()]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| ServiceError::generation("embedder returned no vector"))?;

        self.index.search(&vector, self.k).await
    }
}

/// Truncate to at most `max_chars` characters. Counting characters rather
/// than bytes means a multi-byte code point is never split.
pub fn truncate_query(query: &str, max_chars: usize) -> &str {
    match query.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &query[..byte_idx],
        None => query,
    }
}
