//! Runtime settings read from environment variables.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;
use crate::indexer::Indexer;
use crate::loader::DocumentLoader;
use crate::ollama::{self, OllamaEmbeddingProvider, OllamaGenerator};
use crate::openai::{self, OpenAIEmbeddingProvider, OpenAIGenerator};
use crate::retry::RetryPolicy;

/// Which HTTP backend serves embeddings or generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Ollama,
    OpenAI,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            other => Err(format!("unknown backend '{other}' (expected 'ollama' or 'openai')")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ollama => f.write_str("ollama"),
            Self::OpenAI => f.write_str("openai"),
        }
    }
}

/// Everything needed to build or serve an index.
///
/// Read from `DOCRAG_*`, `OLLAMA_BASE_URL`, `OPENAI_*`, `PORT` and friends;
/// unset or empty variables keep their defaults.
#[derive(Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub store_dir: PathBuf,
    pub extensions: Vec<String>,
    pub rag: RagConfig,
    pub embedder: BackendKind,
    pub embedding_model: Option<String>,
    pub embedding_dimensions: Option<usize>,
    pub generator: BackendKind,
    pub generation_model: Option<String>,
    pub generation_timeout: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub ollama_base_url: String,
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    pub host: String,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            store_dir: PathBuf::from("chroma"),
            extensions: vec!["md".to_string()],
            rag: RagConfig::default(),
            embedder: BackendKind::Ollama,
            embedding_model: None,
            embedding_dimensions: None,
            generator: BackendKind::Ollama,
            generation_model: None,
            generation_timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(60),
            max_retries: RetryPolicy::default().max_retries,
            ollama_base_url: ollama::DEFAULT_OLLAMA_URL.to_string(),
            openai_base_url: openai::DEFAULT_OPENAI_URL.to_string(),
            openai_api_key: None,
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("data_dir", &self.data_dir)
            .field("store_dir", &self.store_dir)
            .field("extensions", &self.extensions)
            .field("rag", &self.rag)
            .field("embedder", &self.embedder)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .field("generator", &self.generator)
            .field("generation_model", &self.generation_model)
            .field("generation_timeout", &self.generation_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("max_retries", &self.max_retries)
            .field("ollama_base_url", &self.ollama_base_url)
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] naming the variable if a value does
    /// not parse, or if the resulting chunking/retrieval config is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut settings = Self::default();

        if let Some(v) = get("DOCRAG_DATA_DIR") {
            settings.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("DOCRAG_STORE_DIR") {
            settings.store_dir = PathBuf::from(v);
        }
        if let Some(v) = get("DOCRAG_EXTENSIONS") {
            settings.extensions = v
                .split(',')
                .map(|ext| ext.trim().trim_start_matches('.').to_string())
                .filter(|ext| !ext.is_empty())
                .collect();
        }
        if let Some(v) = get("DOCRAG_CHUNK_SIZE") {
            settings.rag.chunk_size = parse("DOCRAG_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("DOCRAG_CHUNK_OVERLAP") {
            settings.rag.chunk_overlap = parse("DOCRAG_CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = get("DOCRAG_TOP_K") {
            settings.rag.top_k = parse("DOCRAG_TOP_K", &v)?;
        }
        if let Some(v) = get("DOCRAG_RELEVANCE_THRESHOLD") {
            settings.rag.relevance_threshold = parse("DOCRAG_RELEVANCE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("DOCRAG_EMBEDDER") {
            settings.embedder = parse("DOCRAG_EMBEDDER", &v)?;
        }
        settings.embedding_model = get("DOCRAG_EMBEDDING_MODEL");
        if let Some(v) = get("DOCRAG_EMBEDDING_DIMENSIONS") {
            settings.embedding_dimensions = Some(parse("DOCRAG_EMBEDDING_DIMENSIONS", &v)?);
        }
        if let Some(v) = get("DOCRAG_GENERATOR") {
            settings.generator = parse("DOCRAG_GENERATOR", &v)?;
        }
        settings.generation_model = get("DOCRAG_GENERATION_MODEL");
        if let Some(v) = get("DOCRAG_GENERATION_TIMEOUT_SECS") {
            settings.generation_timeout =
                Duration::from_secs(parse("DOCRAG_GENERATION_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("DOCRAG_REQUEST_TIMEOUT_SECS") {
            settings.request_timeout =
                Duration::from_secs(parse("DOCRAG_REQUEST_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("DOCRAG_MAX_RETRIES") {
            settings.max_retries = parse("DOCRAG_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("OLLAMA_BASE_URL") {
            settings.ollama_base_url = v;
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            settings.openai_base_url = v;
        }
        settings.openai_api_key = get("OPENAI_API_KEY");
        if let Some(v) = get("DOCRAG_HOST") {
            settings.host = v;
        }
        if let Some(v) = get("PORT") {
            settings.port = parse("PORT", &v)?;
        }

        settings.rag.validate()?;
        Ok(settings)
    }

    /// Retry policy for backend calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy { max_retries: self.max_retries, ..RetryPolicy::default() }
    }

    /// Loader over `data_dir` with the configured extensions.
    pub fn loader(&self) -> DocumentLoader {
        DocumentLoader::new(&self.data_dir).with_extensions(&self.extensions)
    }

    /// Build the configured embedding backend.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if OpenAI is selected without an API key.
    pub fn embedding_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        match self.embedder {
            BackendKind::Ollama => {
                let mut provider = OllamaEmbeddingProvider::new(&self.ollama_base_url)
                    .with_request_timeout(self.request_timeout)
                    .with_retry(self.retry_policy());
                if let Some(model) = &self.embedding_model {
                    provider = provider.with_model(model);
                }
                if let Some(dimensions) = self.embedding_dimensions {
                    provider = provider.with_dimensions(dimensions);
                }
                Ok(Arc::new(provider))
            }
            BackendKind::OpenAI => {
                let mut provider = OpenAIEmbeddingProvider::new(self.require_openai_key()?)?
                    .with_base_url(&self.openai_base_url)
                    .with_request_timeout(self.request_timeout)
                    .with_retry(self.retry_policy());
                if let Some(model) = &self.embedding_model {
                    provider = provider.with_model(model);
                }
                if let Some(dimensions) = self.embedding_dimensions {
                    provider = provider.with_dimensions(dimensions);
                }
                Ok(Arc::new(provider))
            }
        }
    }

    /// Build the configured generation backend.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if OpenAI is selected without an API key.
    pub fn generation_provider(&self) -> Result<Arc<dyn GenerationProvider>> {
        match self.generator {
            BackendKind::Ollama => {
                let mut generator = OllamaGenerator::new(&self.ollama_base_url)
                    .with_request_timeout(self.request_timeout)
                    .with_retry(self.retry_policy());
                if let Some(model) = &self.generation_model {
                    generator = generator.with_model(model);
                }
                Ok(Arc::new(generator))
            }
            BackendKind::OpenAI => {
                let mut generator = OpenAIGenerator::new(self.require_openai_key()?)?
                    .with_base_url(&self.openai_base_url)
                    .with_request_timeout(self.request_timeout)
                    .with_retry(self.retry_policy());
                if let Some(model) = &self.generation_model {
                    generator = generator.with_model(model);
                }
                Ok(Arc::new(generator))
            }
        }
    }

    /// An [`Indexer`] from `data_dir` into `store_dir` with the configured embedder.
    pub fn indexer(&self) -> Result<Indexer> {
        Indexer::builder()
            .config(self.rag.clone())
            .loader(self.loader())
            .embedding_provider(self.embedding_provider()?)
            .store_dir(&self.store_dir)
            .build()
    }

    fn require_openai_key(&self) -> Result<String> {
        self.openai_api_key.clone().ok_or_else(|| {
            RagError::ConfigError(
                "OPENAI_API_KEY must be set to use the openai backend".to_string(),
            )
        })
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.parse().map_err(|e| RagError::ConfigError(format!("{key}={value:?} is invalid: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("data"));
        assert_eq!(settings.store_dir, PathBuf::from("chroma"));
        assert_eq!(settings.port, 3000);
        assert_eq!(settings.rag.top_k, 5);
        assert_eq!(settings.embedder, BackendKind::Ollama);
        assert_eq!(settings.embedding_provider().unwrap().model_id(), "ollama/all-minilm");
        assert_eq!(settings.generation_provider().unwrap().model_id(), "ollama/deepseek-r1:8b");
    }

    #[test]
    fn reads_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("DOCRAG_DATA_DIR", "docs"),
            ("DOCRAG_EXTENSIONS", "md, .txt"),
            ("DOCRAG_CHUNK_SIZE", "200"),
            ("DOCRAG_CHUNK_OVERLAP", "50"),
            ("DOCRAG_RELEVANCE_THRESHOLD", "0.7"),
            ("DOCRAG_EMBEDDER", "OpenAI"),
            ("DOCRAG_EMBEDDING_DIMENSIONS", "256"),
            ("OPENAI_API_KEY", "sk-test"),
            ("PORT", "8080"),
            ("DOCRAG_MAX_RETRIES", ""),
        ]))
        .unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("docs"));
        assert_eq!(settings.extensions, vec!["md", "txt"]);
        assert_eq!(settings.rag.chunk_size, 200);
        assert_eq!(settings.rag.relevance_threshold, 0.7);
        assert_eq!(settings.embedder, BackendKind::OpenAI);
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.max_retries, 3);
        let provider = settings.embedding_provider().unwrap();
        assert_eq!(provider.dimensions(), 256);
        assert_eq!(provider.model_id(), "openai/text-embedding-3-small");
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = Settings::from_lookup(lookup(&[("DOCRAG_TOP_K", "five")])).unwrap_err();
        assert!(err.to_string().contains("DOCRAG_TOP_K"), "{err}");

        let err = Settings::from_lookup(lookup(&[("DOCRAG_GENERATOR", "llamafile")])).unwrap_err();
        assert!(err.to_string().contains("DOCRAG_GENERATOR"), "{err}");
    }

    #[test]
    fn invalid_chunking_is_rejected() {
        let result = Settings::from_lookup(lookup(&[
            ("DOCRAG_CHUNK_SIZE", "100"),
            ("DOCRAG_CHUNK_OVERLAP", "100"),
        ]));
        assert!(matches!(result, Err(RagError::ConfigError(_))));
    }

    #[test]
    fn openai_requires_a_key() {
        let settings = Settings::from_lookup(lookup(&[("DOCRAG_GENERATOR", "openai")])).unwrap();
        assert!(matches!(settings.generation_provider(), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn debug_output_hides_the_api_key() {
        let settings = Settings::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-secret")])).unwrap();
        let printed = format!("{settings:?}");
        assert!(!printed.contains("sk-secret"), "{printed}");
        assert!(printed.contains("<redacted>"));
    }
}
