use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub source_documents: Vec<String>,
}

/// Answer one query. A degraded service returns the fixed
/// not-initialized error without attempting partial retrieval.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ServiceError> {
    let Some(qa) = state.qa.as_ref().filter(|_| state.is_ready()) else {
        return Err(ServiceError::NotInitialized);
    };

    let query = request
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ServiceError::Validation("missing query".to_string()))?;

    let record = qa.answer(query).await?;
    Ok(Json(ChatResponse {
        answer: record.answer,
        sources: record.sources,
        source_documents: record.source_documents,
    }))
}
