//! Offline ingestion: extract a source page, chunk it, embed the chunks
//! and persist them in the vector index.
//!
//! Ingestion is a batch path separate from serving. Running it against an
//! index a live server is reading from is allowed, but readers may observe
//! a partially updated index until the run completes.

use crate::chunking::chunk_source;
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::extract::{Document, TextExtractor};
use crate::index::{IndexEntry, SqliteVectorIndex, VectorIndex};
use crate::llm::{Embedder, LlamaServer, SidecarConfig};

#[derive(Debug)]
pub struct IngestReport {
    pub source: String,
    pub chunk_count: usize,
    pub index_size: usize,
}

/// Chunk, embed and store one document. Returns the number of chunks
/// written. Re-ingesting the same source with the same parameters
/// overwrites the previous entries instead of duplicating them.
pub async fn ingest_document(
    document: &Document,
    source_id: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
) -> Result<usize, ServiceError> {
    let chunks = chunk_source(&document.content, source_id, chunk_size, chunk_overlap);
    if chunks.is_empty() {
        tracing::warn!("no chunks produced for {}", source_id);
        return Ok(0);
    }
    tracing::info!("split {} into {} chunks", source_id, chunks.len());

    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let vectors = embedder.embed(&texts).await?;
    if vectors.len() != chunks.len() {
        return Err(ServiceError::generation(format!(
            "embedder returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        )));
    }

    let entries: Vec<IndexEntry> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexEntry { vector, chunk })
        .collect();
    let written = entries.len();

    index.upsert(entries).await?;
    Ok(written)
}

/// Full ingestion run for one URL using the configured backends.
pub async fn ingest_url(config: &AppConfig, url: &str) -> anyhow::Result<IngestReport> {
    let extractor = TextExtractor::new()?;
    let document = extractor.fetch(url).await?;
    tracing::info!(
        "extracted {} characters from {}",
        document.content.chars().count(),
        url
    );

    let embedder = LlamaServer::new(SidecarConfig::embedding(
        &config.embedding_model,
        config.embedding_port,
    ))?;
    let index = SqliteVectorIndex::create(&config.index_db_path).await?;

    let chunk_count = ingest_document(
        &document,
        url,
        config.chunk_size,
        config.chunk_overlap,
        &embedder,
        &index,
    )
    .await?;

    let index_size = index.count().await?;
    Ok(IngestReport {
        source: url.to_string(),
        chunk_count,
        index_size,
    })
}
