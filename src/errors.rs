use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Service-wide error taxonomy.
///
/// Every lower-level failure is collapsed into one of these kinds before it
/// crosses a module boundary: store and schema problems become
/// `IndexUnavailable`, model-backend problems become `GenerationFailure`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("retrieval unavailable: the index has not been populated")]
    RetrievalUnavailable,

    #[error("generation failed: {0}")]
    GenerationFailure(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("service is not initialized")]
    NotInitialized,
}

impl ServiceError {
    pub fn index<E: std::fmt::Display>(err: E) -> Self {
        ServiceError::IndexUnavailable(err.to_string())
    }

    pub fn generation<E: std::fmt::Display>(err: E) -> Self {
        ServiceError::GenerationFailure(err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Config(_)
            | ServiceError::IndexUnavailable(_)
            | ServiceError::RetrievalUnavailable
            | ServiceError::GenerationFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn status_mapping() {
        let cases = [
            (
                ServiceError::Validation("missing query".into()).into_response(),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::NotInitialized.into_response(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ServiceError::RetrievalUnavailable.into_response(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServiceError::GenerationFailure("boom".into()).into_response(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (response, expected) in cases {
            assert_eq!(response.status(), expected);
        }
    }
}
