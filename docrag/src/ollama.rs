//! Ollama embedding and generation backends.
//!
//! Both talk to a local (or remote) Ollama server over its JSON API:
//! `/api/embed` for embeddings and `/api/generate` for completions.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;
use crate::http::{endpoint, send_json};
use crate::retry::RetryPolicy;

/// The default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// The default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";

/// Output size of `all-minilm`.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

/// The default generation model.
pub const DEFAULT_GENERATION_MODEL: &str = "deepseek-r1:8b";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const BACKEND: &str = "Ollama";

/// An [`EmbeddingProvider`] backed by Ollama's `/api/embed` endpoint.
///
/// The whole batch is sent in one request.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::ollama::OllamaEmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::new("http://localhost:11434");
/// let embedding = provider.embed("hello world").await?;
/// ```
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
    request_timeout: Duration,
    retry: RetryPolicy,
}

impl OllamaEmbeddingProvider {
    /// Create a provider for the server at `base_url` using `all-minilm`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Set the model name. Set the matching [`with_dimensions`](Self::with_dimensions) too.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the vector length the model produces.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the retry policy for transient failures.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::rejected(BACKEND, "API returned no embeddings"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = BACKEND,
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let url = endpoint(&self.base_url, "api/embed");
        let body = EmbedRequest { model: &self.model, input: texts };
        let response: EmbedResponse = self
            .retry
            .run("ollama embed", || {
                send_json(BACKEND, self.client.post(&url).timeout(self.request_timeout).json(&body))
            })
            .await?;

        if response.embeddings.len() != texts.len() {
            return Err(RagError::rejected(
                BACKEND,
                format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    response.embeddings.len()
                ),
            ));
        }
        Ok(response.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> String {
        format!("ollama/{}", self.model)
    }
}

/// A [`GenerationProvider`] backed by Ollama's `/api/generate` endpoint,
/// without streaming.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    request_timeout: Duration,
    retry: RetryPolicy,
}

impl OllamaGenerator {
    /// Create a generator for the server at `base_url` using `deepseek-r1:8b`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: DEFAULT_GENERATION_MODEL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the retry policy for transient failures.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = BACKEND, model = %self.model, prompt_len = prompt.len(), "generating");

        let url = endpoint(&self.base_url, "api/generate");
        let body = GenerateRequest { model: &self.model, prompt, stream: false };
        let response: GenerateResponse = self
            .retry
            .run("ollama generate", || {
                send_json(BACKEND, self.client.post(&url).timeout(self.request_timeout).json(&body))
            })
            .await?;
        Ok(response.response)
    }

    fn model_id(&self) -> String {
        format!("ollama/{}", self.model)
    }
}
