//! The query-time service context.
//!
//! A [`RagService`] owns everything a question needs: the embedding backend,
//! the opened store, and the generation backend. Front ends construct one at
//! startup and share it behind an `Arc`.
//!
//! # Example
//!
//! ```rust,ignore
//! use docrag::{AskOutcome, RagService, Settings};
//!
//! let service = RagService::open(&Settings::from_env()?).await?;
//! match service.ask("What colour is the sky?").await? {
//!     AskOutcome::Answered(answer) => println!("{}", answer.text),
//!     AskOutcome::NoMatch => println!("nothing relevant"),
//! }
//! service.close();
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::composer::{Answer, AnswerComposer, PromptTemplate};
use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;
use crate::inmemory::InMemoryVectorStore;
use crate::persist::{StoreDir, StoreManifest};
use crate::retriever::{Retrieval, Retriever};
use crate::settings::Settings;
use crate::vectorstore::VectorStore;

/// The result of [`RagService::ask`].
#[derive(Debug, Clone)]
pub enum AskOutcome {
    /// Relevant context was found and an answer generated.
    Answered(Answer),
    /// No stored chunk was relevant enough; nothing was generated.
    NoMatch,
}

/// Answers questions over one opened index.
pub struct RagService {
    retriever: Retriever,
    composer: AnswerComposer,
    manifest: Option<StoreManifest>,
    store_path: Option<PathBuf>,
}

impl RagService {
    /// Create a new [`RagServiceBuilder`].
    pub fn builder() -> RagServiceBuilder {
        RagServiceBuilder::default()
    }

    /// Build the configured backends and open the published index at
    /// `settings.store_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for unusable settings,
    /// [`RagError::EmbeddingMismatch`] if the index was built by another
    /// embedder, and [`RagError::VectorStoreError`] if it is corrupt.
    pub async fn open(settings: &Settings) -> Result<Self> {
        let embedding_provider = settings.embedding_provider()?;
        let generation_provider = settings.generation_provider()?;

        let store_dir = StoreDir::new(&settings.store_dir);
        let (manifest, store) =
            store_dir.open(&embedding_provider.model_id(), embedding_provider.dimensions()).await?;

        let mut builder = Self::builder()
            .config(settings.rag.clone())
            .embedding_provider(embedding_provider)
            .generation_provider(generation_provider)
            .vector_store(Arc::new(store))
            .generation_timeout(settings.generation_timeout)
            .store_path(store_dir.root());
        if let Some(manifest) = manifest {
            builder = builder.manifest(manifest);
        }
        builder.build()
    }

    /// The manifest of the opened generation, if one was published.
    pub fn manifest(&self) -> Option<&StoreManifest> {
        self.manifest.as_ref()
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn composer(&self) -> &AnswerComposer {
        &self.composer
    }

    /// Retrieve context for `question` and, if any is relevant, generate an answer.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for an empty question; backend,
    /// timeout and store errors propagate unchanged.
    pub async fn ask(&self, question: &str) -> Result<AskOutcome> {
        debug!(question_len = question.len(), "ask");
        match self.retriever.retrieve(question).await? {
            Retrieval::NoMatch => Ok(AskOutcome::NoMatch),
            Retrieval::Matches(results) => {
                let answer = self.composer.compose(question, &results).await?;
                Ok(AskOutcome::Answered(answer))
            }
        }
    }

    /// Shut the service down.
    pub fn close(self) {
        info!(
            store = ?self.store_path,
            generation = ?self.manifest.as_ref().map(|m| m.generation.as_str()),
            "closing RAG service"
        );
    }
}

/// Builder for a [`RagService`] with injected components.
///
/// Both providers are required. Without a vector store the service starts
/// with an empty one, so every question is a [`AskOutcome::NoMatch`].
#[derive(Default)]
pub struct RagServiceBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generation_provider: Option<Arc<dyn GenerationProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    template: Option<PromptTemplate>,
    generation_timeout: Option<Duration>,
    manifest: Option<StoreManifest>,
    store_path: Option<PathBuf>,
}

impl RagServiceBuilder {
    /// Set the retrieval configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the generation provider.
    pub fn generation_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.generation_provider = Some(provider);
        self
    }

    /// Set the vector store.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Use a custom prompt template.
    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Bound each generation call.
    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = Some(timeout);
        self
    }

    /// Record the manifest of the store being served.
    pub fn manifest(mut self, manifest: StoreManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Record where the store being served lives.
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Build the [`RagService`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a provider is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<RagService> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let generation_provider = self
            .generation_provider
            .ok_or_else(|| RagError::ConfigError("generation_provider is required".to_string()))?;
        let vector_store: Arc<dyn VectorStore> = match self.vector_store {
            Some(store) => store,
            None => Arc::new(InMemoryVectorStore::new()),
        };

        let mut composer = AnswerComposer::new(generation_provider);
        if let Some(template) = self.template {
            composer = composer.with_template(template);
        }
        if let Some(timeout) = self.generation_timeout {
            composer = composer.with_generation_timeout(timeout);
        }

        Ok(RagService {
            retriever: Retriever::new(embedding_provider, vector_store, &config),
            composer,
            manifest: self.manifest,
            store_path: self.store_path,
        })
    }
}
