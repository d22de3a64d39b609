//! SQLite-backed vector index.
//!
//! Metadata and embeddings live in a single SQLite file; search is
//! brute-force cosine similarity over all rows. The similarity metric is
//! fixed at cosine for the lifetime of an index; scores are in `[-1, 1]`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::{IndexEntry, ScoredChunk, VectorIndex};
use crate::chunking::Chunk;
use crate::errors::ServiceError;

#[derive(Debug)]
pub struct SqliteVectorIndex {
    pool: SqlitePool,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteVectorIndex {
    /// Open an existing index. Fails with `IndexUnavailable` when the file
    /// is missing or cannot be opened; an empty-but-present index opens
    /// fine and reports `is_ready() == false`.
    pub async fn open(db_path: &Path) -> Result<Self, ServiceError> {
        if !db_path.exists() {
            return Err(ServiceError::IndexUnavailable(format!(
                "index not found at {}; run the ingest binary first",
                db_path.display()
            )));
        }
        Self::connect(db_path, false).await
    }

    /// Open the index for ingestion, creating the file if needed.
    pub async fn create(db_path: &Path) -> Result<Self, ServiceError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(ServiceError::index)?;
            }
        }
        Self::connect(db_path, true).await
    }

    async fn connect(db_path: &Path, create_if_missing: bool) -> Result<Self, ServiceError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ServiceError::index)?;

        let index = Self {
            pool,
            db_path: db_path.to_path_buf(),
        };
        index.init_schema().await?;
        Ok(index)
    }

    async fn init_schema(&self) -> Result<(), ServiceError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                sequence_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ServiceError::index)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_id)")
            .execute(&self.pool)
            .await
            .map_err(ServiceError::index)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ServiceError::index)?;

        Ok(())
    }

    async fn stored_dimension(&self) -> Result<Option<usize>, ServiceError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'dimension'")
                .fetch_optional(&self.pool)
                .await
                .map_err(ServiceError::index)?;

        match value {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                ServiceError::IndexUnavailable(format!("corrupt dimension metadata: {:?}", raw))
            }),
        }
    }

    fn chunk_id(chunk: &Chunk) -> String {
        format!("{}#{}", chunk.source_id, chunk.sequence_index)
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), ServiceError> {
        if entries.is_empty() {
            return Ok(());
        }

        let dimension = entries[0].vector.len();
        if dimension == 0 {
            return Err(ServiceError::Config("refusing to store empty vectors".into()));
        }
        for entry in &entries {
            if entry.vector.len() != dimension {
                return Err(ServiceError::Config(format!(
                    "mixed vector dimensionality in batch: {} vs {}",
                    entry.vector.len(),
                    dimension
                )));
            }
        }

        match self.stored_dimension().await? {
            None => {
                sqlx::query(
                    "INSERT OR REPLACE INTO index_meta (key, value) VALUES ('dimension', ?1)",
                )
                .bind(dimension.to_string())
                .execute(&self.pool)
                .await
                .map_err(ServiceError::index)?;
            }
            Some(stored) if stored != dimension => {
                return Err(ServiceError::Config(format!(
                    "vector dimensionality {} does not match index dimensionality {}; \
                     the index was built with a different embedding model",
                    dimension, stored
                )));
            }
            Some(_) => {}
        }

        let mut tx = self.pool.begin().await.map_err(ServiceError::index)?;

        for entry in &entries {
            let blob = Self::serialize_embedding(&entry.vector);
            sqlx::query(
                "INSERT OR REPLACE INTO chunks (chunk_id, source_id, sequence_index, content, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(Self::chunk_id(&entry.chunk))
            .bind(&entry.chunk.source_id)
            .bind(entry.chunk.sequence_index as i64)
            .bind(&entry.chunk.content)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ServiceError::index)?;
        }

        tx.commit().await.map_err(ServiceError::index)?;
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, ServiceError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        if let Some(stored) = self.stored_dimension().await? {
            if query.len() != stored {
                return Err(ServiceError::Config(format!(
                    "query dimensionality {} does not match index dimensionality {}",
                    query.len(),
                    stored
                )));
            }
        }

        let rows = sqlx::query(
            "SELECT rowid, source_id, sequence_index, content, embedding FROM chunks",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ServiceError::index)?;

        let mut scored: Vec<(i64, ScoredChunk)> = rows
            .iter()
            .map(|row| {
                let rowid: i64 = row.get("rowid");
                let embedding_bytes: Vec<u8> = row.get("embedding");
                let stored = Self::deserialize_embedding(&embedding_bytes);
                let score = Self::cosine_similarity(query, &stored);
                let sequence_index: i64 = row.get("sequence_index");

                (
                    rowid,
                    ScoredChunk {
                        chunk: Chunk {
                            content: row.get("content"),
                            source_id: row.get("source_id"),
                            sequence_index: sequence_index as usize,
                        },
                        score,
                    },
                )
            })
            .collect();

        // Descending score; insertion order (rowid) breaks ties so repeated
        // searches are deterministic.
        scored.sort_by(|(rowid_a, a), (rowid_b, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| rowid_a.cmp(rowid_b))
        });
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, result)| result).collect())
    }

    async fn count(&self) -> Result<usize, ServiceError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(ServiceError::index)?;
        Ok(count as usize)
    }

    async fn is_ready(&self) -> Result<bool, ServiceError> {
        Ok(self.count().await? > 0)
    }
}
