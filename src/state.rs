use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::compose::{AnswerComposer, AnswerRecord};
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::index::SqliteVectorIndex;
use crate::llm::{LlamaServer, SidecarConfig};
use crate::retrieval::Retriever;

/// Service readiness. `Degraded` is terminal until the process restarts;
/// there is no path back to `Ready` without a full reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Uninitialized,
    Ready,
    Degraded,
}

/// The query-answering pipeline: retrieval followed by composition, with
/// the whole composition step bounded by the configured timeout.
pub struct QaService {
    retriever: Retriever,
    composer: AnswerComposer,
    generation_timeout: Duration,
}

impl QaService {
    pub fn new(
        retriever: Retriever,
        composer: AnswerComposer,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            retriever,
            composer,
            generation_timeout,
        }
    }

    pub async fn answer(&self, query: &str) -> Result<AnswerRecord, ServiceError> {
        let retrieval = self.retriever.retrieve(query).await?;

        match tokio::time::timeout(
            self.generation_timeout,
            self.composer.compose(query, &retrieval),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ServiceError::GenerationFailure(
                "generation timed out".to_string(),
            )),
        }
    }
}

/// Shared application state, built once at startup and passed by reference
/// into request handlers. The index and model handles inside `qa` are
/// read-only after initialization.
pub struct AppState {
    pub config: AppConfig,
    pub readiness: Readiness,
    pub qa: Option<QaService>,
    pub degraded_reason: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Build the state from config. Dependency failures never propagate:
    /// they are logged and leave the service degraded, serving a fixed
    /// error for every request.
    pub async fn initialize(config: AppConfig) -> Arc<Self> {
        match Self::build_service(&config).await {
            Ok(qa) => {
                tracing::info!("service initialized and ready");
                Arc::new(AppState {
                    config,
                    readiness: Readiness::Ready,
                    qa: Some(qa),
                    degraded_reason: None,
                    started_at: Utc::now(),
                })
            }
            Err(err) => {
                tracing::error!("startup failed, service degraded: {}", err);
                Self::degraded(config, err)
            }
        }
    }

    pub fn degraded(config: AppConfig, err: ServiceError) -> Arc<Self> {
        Arc::new(AppState {
            config,
            readiness: Readiness::Degraded,
            qa: None,
            degraded_reason: Some(err.to_string()),
            started_at: Utc::now(),
        })
    }

    pub fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }

    async fn build_service(config: &AppConfig) -> Result<QaService, ServiceError> {
        let index = SqliteVectorIndex::open(&config.index_db_path).await?;
        tracing::info!("vector index loaded from {}", config.index_db_path.display());

        let model_path = config.require_llm_model()?;
        let generator = LlamaServer::new(SidecarConfig::generation(
            model_path,
            config.llm_port,
            config.max_tokens,
        ))?;
        tracing::info!("generation model configured: {}", model_path.display());

        let embedder = LlamaServer::new(SidecarConfig::embedding(
            &config.embedding_model,
            config.embedding_port,
        ))?;

        let retriever = Retriever::new(
            Arc::new(embedder),
            Arc::new(index),
            config.k_retrieval,
            config.max_query_length,
        );
        let composer = AnswerComposer::new(Arc::new(generator));

        Ok(QaService::new(retriever, composer, config.generation_timeout))
    }
}
