//! Inference backend adapter
//!
//! Every worker is an opaque text-completion endpoint. [`InferenceBackend`]
//! is the seam the engine calls through; [`OllamaBackend`] speaks the Ollama
//! HTTP API (`/api/generate`, `/api/tags`). Tests substitute scripted
//! in-process backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::config::GenerationOptions;
use crate::state::BackendHealth;

/// Default Ollama address
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Timeout for the `/api/tags` reachability check
pub const DIAGNOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors from a single backend call
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("response parse error: {0}")]
    Parse(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Sampling options carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub thread_hint: u32,
}

impl From<&GenerationOptions> for RequestOptions {
    fn from(options: &GenerationOptions) -> Self {
        Self {
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
            thread_hint: options.thread_hint,
        }
    }
}

/// One non-streaming generation call against one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub worker: String,
    pub prompt: String,
    /// Opaque context blob prepended to the prompt
    pub context: Option<String>,
    pub options: RequestOptions,
    /// How long the backend should keep the worker resident afterwards
    pub keep_alive: Option<String>,
    /// Per-worker base URL override
    pub endpoint: Option<String>,
}

impl GenerationRequest {
    pub fn new(worker: impl Into<String>, prompt: impl Into<String>, options: RequestOptions) -> Self {
        Self {
            worker: worker.into(),
            prompt: prompt.into(),
            context: None,
            options,
            keep_alive: None,
            endpoint: None,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Prompt text as the worker sees it
    pub fn full_prompt(&self) -> String {
        match &self.context {
            Some(context) => format!("{}\n\nQuestion: {}", context, self.prompt),
            None => self.prompt.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub text: String,
    pub raw_latency_ms: u64,
}

/// A text-completion endpoint the engine can fan out to.
///
/// Implementations must tolerate concurrent calls. Timeouts are imposed by
/// the caller by dropping the future.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> BackendResult<GenerationResponse>;

    /// Reachability of the backend and how many workers it serves
    async fn health(&self) -> BackendHealth;
}

/// Shared backend handle
pub type SharedBackend = Arc<dyn InferenceBackend>;

#[derive(Debug, Deserialize)]
struct GenerateReply {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsReply {
    #[serde(default)]
    models: Vec<serde_json::Value>,
}

/// Client for an Ollama server
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>) -> BackendResult<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, request: &GenerationRequest, path: &str) -> String {
        let base = request
            .endpoint
            .as_deref()
            .map(|e| e.trim_end_matches('/'))
            .unwrap_or(&self.base_url);
        format!("{}{}", base, path)
    }
}

/// JSON body for `POST /api/generate`
pub fn generate_body(request: &GenerationRequest) -> serde_json::Value {
    let mut options = serde_json::json!({
        "temperature": request.options.temperature,
        "top_p": request.options.top_p,
        "num_predict": request.options.max_tokens,
        "num_thread": request.options.thread_hint,
    });
    if let Some(keep_alive) = &request.keep_alive {
        options["keep_alive"] = serde_json::Value::String(keep_alive.clone());
    }
    serde_json::json!({
        "model": request.worker,
        "prompt": request.full_prompt(),
        "stream": false,
        "options": options,
    })
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    async fn generate(&self, request: &GenerationRequest) -> BackendResult<GenerationResponse> {
        let start = Instant::now();
        let url = self.url_for(request, "/api/generate");
        debug!(worker = %request.worker, url = %url, "sending generation request");

        let response = self
            .client
            .post(&url)
            .json(&generate_body(request))
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        let reply: GenerateReply = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        Ok(GenerationResponse {
            text: reply.response.trim().to_string(),
            raw_latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn health(&self) -> BackendHealth {
        let url = format!("{}/api/tags", self.base_url);
        let result = async {
            let response = self
                .client
                .get(&url)
                .timeout(DIAGNOSE_TIMEOUT)
                .send()
                .await
                .map_err(|e| BackendError::Request(e.to_string()))?;
            if !response.status().is_success() {
                return Err(BackendError::Status {
                    status: response.status().as_u16(),
                    body: String::new(),
                });
            }
            response
                .json::<TagsReply>()
                .await
                .map_err(|e| BackendError::Parse(e.to_string()))
        }
        .await;

        match result {
            Ok(tags) => BackendHealth {
                healthy: true,
                worker_count: tags.models.len(),
                error: None,
            },
            Err(e) => BackendHealth {
                healthy: false,
                worker_count: 0,
                error: Some(e.to_string()),
            },
        }
    }
}
