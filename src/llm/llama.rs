//! llama.cpp sidecar management.
//!
//! Models run in a separate `llama-server` process per role (one for the
//! generation model, one for the embedding model). The process is spawned
//! lazily on first use and reused afterwards; its stdout/stderr are piped
//! into the tracing log.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::provider::{Embedder, Generator};
use crate::errors::ServiceError;

const MAX_HEALTH_RETRIES: u32 = 30;
const HEALTH_RETRY_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_CONTEXT: usize = 4096;

/// Settings for one sidecar process.
#[derive(Debug, Clone)]
pub struct SidecarConfig {
    /// Local GGUF path, or a Hugging Face repo id (contains `/` and does
    /// not exist on disk) passed to llama-server's `-hf` flag.
    pub model: String,
    pub port: u16,
    pub n_ctx: usize,
    /// Start the server in embedding mode.
    pub embedding: bool,
    /// Generation length cap (`n_predict`); ignored in embedding mode.
    pub max_tokens: usize,
}

impl SidecarConfig {
    pub fn generation(model: &Path, port: u16, max_tokens: usize) -> Self {
        SidecarConfig {
            model: model.display().to_string(),
            port,
            n_ctx: DEFAULT_CONTEXT,
            embedding: false,
            max_tokens,
        }
    }

    pub fn embedding(model: &str, port: u16) -> Self {
        SidecarConfig {
            model: model.to_string(),
            port,
            n_ctx: DEFAULT_CONTEXT,
            embedding: true,
            max_tokens: 0,
        }
    }
}

struct SidecarState {
    child: Option<Child>,
    running: bool,
}

/// A llama-server process plus the HTTP client talking to it.
///
/// Completion calls are serialized behind `request_lock`: the sidecar is a
/// single instance and interleaved generation requests are not safe.
#[derive(Clone)]
pub struct LlamaServer {
    config: SidecarConfig,
    server_path: PathBuf,
    health_retries: u32,
    health_delay: Duration,
    inner: Arc<Mutex<SidecarState>>,
    request_lock: Arc<Mutex<()>>,
    client: Client,
}

impl LlamaServer {
    pub fn new(config: SidecarConfig) -> Result<Self, ServiceError> {
        let server_path = find_server_binary()?;
        Ok(Self::with_server(
            config,
            server_path,
            MAX_HEALTH_RETRIES,
            HEALTH_RETRY_DELAY,
        ))
    }

    fn with_server(
        config: SidecarConfig,
        server_path: PathBuf,
        health_retries: u32,
        health_delay: Duration,
    ) -> Self {
        Self {
            config,
            server_path,
            health_retries,
            health_delay,
            inner: Arc::new(Mutex::new(SidecarState {
                child: None,
                running: false,
            })),
            request_lock: Arc::new(Mutex::new(())),
            client: Client::new(),
        }
    }

    /// Spawn the sidecar if it is not already running and healthy.
    ///
    /// The state lock is held through the health wait: concurrent callers
    /// block here instead of observing a spawned-but-unhealthy process.
    /// `running` only becomes true once the health check passes, so a
    /// failed start is retried on the next call.
    async fn ensure_running(&self) -> Result<(), ServiceError> {
        let mut state = self.inner.lock().await;
        if state.running {
            return Ok(());
        }

        let mut cmd = Command::new(&self.server_path);
        let model_path = Path::new(&self.config.model);
        if model_path.exists() {
            cmd.arg("-m").arg(model_path);
        } else if self.config.model.contains('/') {
            cmd.arg("-hf").arg(&self.config.model);
        } else {
            return Err(ServiceError::Config(format!(
                "model not found: {}",
                self.config.model
            )));
        }

        cmd.arg("--port").arg(self.config.port.to_string());
        cmd.arg("-c").arg(self.config.n_ctx.to_string());
        if self.config.embedding {
            cmd.arg("--embedding");
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ServiceError::generation(format!("failed to spawn llama-server: {}", e)))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    tracing::debug!("[llama-server] {}", line);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    tracing::debug!("[llama-server-err] {}", line);
                }
            });
        }

        state.child = Some(child);

        match self.wait_for_health().await {
            Ok(()) => {
                state.running = true;
                Ok(())
            }
            Err(err) => {
                if let Some(mut child) = state.child.take() {
                    let _ = child.kill().await;
                }
                Err(err)
            }
        }
    }

    async fn wait_for_health(&self) -> Result<(), ServiceError> {
        let url = format!("http://localhost:{}/health", self.config.port);
        for _ in 0..self.health_retries {
            if self.client.get(&url).send().await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(self.health_delay).await;
        }
        Err(ServiceError::generation(
            "timed out waiting for llama-server to become healthy",
        ))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("http://localhost:{}/{}", self.config.port, path)
    }
}

#[async_trait]
impl Generator for LlamaServer {
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        self.ensure_running().await?;

        // One completion at a time against the single sidecar instance.
        let _guard = self.request_lock.lock().await;

        let body = json!({
            "prompt": prompt,
            "stream": false,
            "n_predict": self.config.max_tokens,
            "temperature": 0.7,
            "stop": ["Question:", "Context:"]
        });

        let res = self
            .client
            .post(self.endpoint("completion"))
            .json(&body)
            .send()
            .await
            .map_err(ServiceError::generation)?;

        if !res.status().is_success() {
            return Err(ServiceError::generation(format!(
                "llama-server error: {}",
                res.status()
            )));
        }

        let data: Value = res.json().await.map_err(ServiceError::generation)?;
        Ok(data["content"].as_str().unwrap_or("").to_string())
    }
}

#[async_trait]
impl Embedder for LlamaServer {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        self.ensure_running().await?;

        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            let body = json!({ "content": input });

            let res = self
                .client
                .post(self.endpoint("embedding"))
                .json(&body)
                .send()
                .await
                .map_err(ServiceError::generation)?;

            if !res.status().is_success() {
                return Err(ServiceError::generation(format!(
                    "llama-server error: {}",
                    res.status()
                )));
            }

            let data: Value = res.json().await.map_err(ServiceError::generation)?;
            let embedding: Vec<f32> = serde_json::from_value(data["embedding"].clone())
                .map_err(|_| ServiceError::generation("invalid embedding response"))?;
            results.push(embedding);
        }

        Ok(results)
    }
}

fn find_server_binary() -> Result<PathBuf, ServiceError> {
    if let Ok(path) = std::env::var("LLAMA_SERVER_PATH") {
        return Ok(PathBuf::from(path));
    }
    if let Ok(path) = which::which("llama-server") {
        return Ok(path);
    }
    Ok(PathBuf::from("llama-server"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // A sidecar that spawns (the binary is /bin/sh running an empty
    // script) but never serves HTTP, so the health wait always times out.
    fn unhealthy_server(model: &Path) -> LlamaServer {
        LlamaServer::with_server(
            SidecarConfig::generation(model, 59993, 16),
            PathBuf::from("/bin/sh"),
            2,
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn unhealthy_sidecar_fails_every_caller_and_start_is_retried() {
        let model = tempfile::NamedTempFile::new().unwrap();
        let server = unhealthy_server(model.path());

        // Both concurrent callers must block on the startup lock and see
        // the health timeout; neither may slip a request past the spawn
        // to a process that never became healthy.
        let (first, second) = tokio::join!(server.complete("a"), server.complete("b"));
        for result in [first, second] {
            let err = result.unwrap_err();
            assert!(matches!(err, ServiceError::GenerationFailure(_)));
            assert!(err.to_string().contains("healthy"), "got: {}", err);
        }

        // A later call attempts the spawn again instead of reusing the
        // dead state.
        let err = server.complete("c").await.unwrap_err();
        assert!(err.to_string().contains("healthy"), "got: {}", err);
    }
}
