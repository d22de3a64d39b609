use async_trait::async_trait;

use crate::errors::ServiceError;

/// Maps text to fixed-length vectors. All texts embedded through one
/// instance produce vectors of the same dimensionality.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;
}

/// Produces a completion for a prompt. Implementations that wrap a
/// non-reentrant backend must serialize concurrent calls internally.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError>;
}
