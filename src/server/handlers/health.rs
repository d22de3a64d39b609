use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn root() -> &'static str {
    "Welcome to the Chatbot API! Use /api/chat to interact."
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "ready": state.is_ready(),
        "started_at": state.started_at.to_rfc3339(),
    }))
}
