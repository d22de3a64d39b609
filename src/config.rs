use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::ServiceError;

/// Runtime configuration, resolved once at startup from environment
/// variables. Missing variables fall back to defaults; unparsable values
/// are a configuration error and put the service in the degraded state.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Location of the persisted vector index (SQLite file).
    pub index_db_path: PathBuf,
    /// Path to the GGUF generation model. Required for the service to
    /// become ready; ingestion does not need it.
    pub llm_model_path: Option<PathBuf>,
    /// Embedding model identifier: a local GGUF path or a Hugging Face
    /// repo id handed to the llama-server sidecar.
    pub embedding_model: String,
    /// Generation length cap per completion call.
    pub max_tokens: usize,
    /// Queries longer than this are truncated (in characters) before
    /// embedding, never rejected.
    pub max_query_length: usize,
    /// Number of chunks retrieved per query.
    pub k_retrieval: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Upper bound on one whole answer-composition pass.
    pub generation_timeout: Duration,
    /// Sidecar port for the generation model.
    pub llm_port: u16,
    /// Sidecar port for the embedding model.
    pub embedding_port: u16,
    pub log_dir: PathBuf,
}

pub const DEFAULT_INDEX_DB_PATH: &str = "index_db";
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-mpnet-base-v2";
pub const DEFAULT_MAX_TOKENS: usize = 2048;
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 500;
pub const DEFAULT_K_RETRIEVAL: usize = 2;
pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            index_db_path: PathBuf::from(DEFAULT_INDEX_DB_PATH),
            llm_model_path: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_query_length: DEFAULT_MAX_QUERY_LENGTH,
            k_retrieval: DEFAULT_K_RETRIEVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            generation_timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
            llm_port: 8088,
            embedding_port: 8090,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    /// `from_env` wires this to the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();

        // CHROMA_DB_PATH is the variable name the original deployment used.
        let index_db_path = lookup("INDEX_DB_PATH")
            .or_else(|| lookup("CHROMA_DB_PATH"))
            .map(PathBuf::from)
            .unwrap_or(defaults.index_db_path);

        let llm_model_path = lookup("LLM_MODEL_PATH").map(PathBuf::from);
        let embedding_model = lookup("HF_MODEL_NAME").unwrap_or(defaults.embedding_model);

        let max_tokens = parse_var(&lookup, "MAX_TOKENS", defaults.max_tokens)?;
        let max_query_length =
            parse_var(&lookup, "MAX_QUERY_LENGTH", defaults.max_query_length)?;
        let k_retrieval = parse_var(&lookup, "K_RETRIEVAL", defaults.k_retrieval)?;
        let chunk_size = parse_var(&lookup, "CHUNK_SIZE", defaults.chunk_size)?;
        let chunk_overlap = parse_var(&lookup, "CHUNK_OVERLAP", defaults.chunk_overlap)?;
        let timeout_secs = parse_var(
            &lookup,
            "GENERATION_TIMEOUT_SECS",
            DEFAULT_GENERATION_TIMEOUT_SECS,
        )?;
        let llm_port = parse_var(&lookup, "LLM_PORT", defaults.llm_port)?;
        let embedding_port = parse_var(&lookup, "EMBEDDING_PORT", defaults.embedding_port)?;
        let log_dir = lookup("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir);

        if chunk_size == 0 {
            return Err(ServiceError::Config("CHUNK_SIZE must be positive".into()));
        }
        if k_retrieval == 0 {
            return Err(ServiceError::Config("K_RETRIEVAL must be positive".into()));
        }

        Ok(AppConfig {
            index_db_path,
            llm_model_path,
            embedding_model,
            max_tokens,
            max_query_length,
            k_retrieval,
            chunk_size,
            chunk_overlap,
            generation_timeout: Duration::from_secs(timeout_secs),
            llm_port,
            embedding_port,
            log_dir,
        })
    }

    /// The generation model path, or a configuration error naming what is
    /// missing. Checked at startup before the service reports ready.
    pub fn require_llm_model(&self) -> Result<&PathBuf, ServiceError> {
        let path = self
            .llm_model_path
            .as_ref()
            .ok_or_else(|| ServiceError::Config("LLM_MODEL_PATH is not set".into()))?;
        if !path.exists() {
            return Err(ServiceError::Config(format!(
                "LLM model not found at {}",
                path.display()
            )));
        }
        Ok(path)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ServiceError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ServiceError::Config(format!("invalid value for {}: {:?}", name, raw))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, ServiceError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.index_db_path, PathBuf::from("index_db"));
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.max_query_length, 500);
        assert_eq!(config.k_retrieval, 2);
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 100);
        assert!(config.llm_model_path.is_none());
        assert_eq!(config.embedding_model, DEFAULT_EMBEDDING_MODEL);
    }

    #[test]
    fn legacy_chroma_db_path_is_honored() {
        let config = config_from(&[("CHROMA_DB_PATH", "/data/chroma")]).unwrap();
        assert_eq!(config.index_db_path, PathBuf::from("/data/chroma"));

        // The new name wins when both are present.
        let config = config_from(&[
            ("CHROMA_DB_PATH", "/data/chroma"),
            ("INDEX_DB_PATH", "/data/index"),
        ])
        .unwrap();
        assert_eq!(config.index_db_path, PathBuf::from("/data/index"));
    }

    #[test]
    fn invalid_numeric_value_is_a_config_error() {
        let err = config_from(&[("MAX_TOKENS", "lots")]).unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));

        let err = config_from(&[("K_RETRIEVAL", "0")]).unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }

    #[test]
    fn require_llm_model_reports_missing_path() {
        let config = config_from(&[]).unwrap();
        assert!(matches!(
            config.require_llm_model(),
            Err(ServiceError::Config(_))
        ));

        let config = config_from(&[("LLM_MODEL_PATH", "/nonexistent/model.gguf")]).unwrap();
        assert!(matches!(
            config.require_llm_model(),
            Err(ServiceError::Config(_))
        ));
    }
}
