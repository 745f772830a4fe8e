//! Index builds: load → chunk → embed → persist.
//!
//! The [`Indexer`] rebuilds a store location from scratch and publishes the
//! result atomically. A failed build leaves the previously published index
//! untouched.
//!
//! # Example
//!
//! ```rust,ignore
//! use docrag::{Indexer, DocumentLoader, RagConfig};
//!
//! let indexer = Indexer::builder()
//!     .config(RagConfig::default())
//!     .loader(DocumentLoader::new("data"))
//!     .embedding_provider(Arc::new(my_embedder))
//!     .store_dir("chroma")
//!     .build()?;
//!
//! let report = indexer.build().await?;
//! println!("{} chunks", report.chunks);
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::document::Chunk;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::loader::DocumentLoader;
use crate::persist::{FORMAT_VERSION, StoreDir, StoreManifest, new_generation_name};

/// Summary of a completed build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Documents loaded.
    pub documents: usize,
    /// Chunks embedded and stored.
    pub chunks: usize,
    /// Name of the generation that is now live.
    pub generation: String,
    /// The store location.
    pub store_path: PathBuf,
}

/// Rebuilds a store location from a document directory.
///
/// Construct one via [`Indexer::builder()`].
pub struct Indexer {
    loader: DocumentLoader,
    chunker: Arc<dyn Chunker>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    store: StoreDir,
    embed_batch_size: usize,
    running: Mutex<()>,
}

impl Indexer {
    /// Create a new [`IndexerBuilder`].
    pub fn builder() -> IndexerBuilder {
        IndexerBuilder::default()
    }

    /// The store location this indexer publishes to.
    pub fn store_dir(&self) -> &StoreDir {
        &self.store
    }

    /// Build a fresh index and make it the live one.
    ///
    /// # Errors
    ///
    /// - [`RagError::StoreLocked`] if another build is running on the same location.
    /// - [`RagError::SourceNotFound`] / [`RagError::Io`] if documents cannot be loaded.
    /// - [`RagError::EmbeddingMismatch`] if the embedder returns vectors of the wrong size.
    /// - [`RagError::VectorStoreError`] if two chunks share an id.
    /// - Backend errors from the embedding provider.
    ///
    /// In every case the previously published index stays live.
    pub async fn build(&self) -> Result<IndexReport> {
        let _running =
            self.running.try_lock().map_err(|_| RagError::StoreLocked(self.store.root().into()))?;
        let _lock = self.store.lock().await?;

        let documents = self.loader.load().await?;
        let mut chunks: Vec<Chunk> = Vec::new();
        for document in &documents {
            let produced = self.chunker.chunk(document);
            debug!(document.id = %document.id, chunk_count = produced.len(), "chunked document");
            chunks.extend(produced);
        }
        check_unique_ids(&chunks)?;

        self.embed_all(&mut chunks).await?;

        let generation = new_generation_name();
        let manifest = StoreManifest {
            format_version: FORMAT_VERSION,
            generation: generation.clone(),
            embedding_model: self.embedding_provider.model_id(),
            dimensions: self.embedding_provider.dimensions(),
            documents: documents.len(),
            chunks: chunks.len(),
            created_at: Utc::now(),
        };

        // An unreadable pointer is about to be overwritten anyway.
        let replaced = self.store.current().await.ok().flatten();
        if let Err(e) = self.write_and_publish(&manifest, &chunks).await {
            error!(generation = %generation, error = %e, "failed to publish index");
            self.store.discard(&generation).await;
            return Err(e);
        }
        self.store.prune(&generation, replaced.as_deref()).await;

        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            generation = %generation,
            store = %self.store.root().display(),
            "index built"
        );

        Ok(IndexReport {
            documents: documents.len(),
            chunks: chunks.len(),
            generation,
            store_path: self.store.root().to_path_buf(),
        })
    }

    async fn embed_all(&self, chunks: &mut [Chunk]) -> Result<()> {
        let dimensions = self.embedding_provider.dimensions();
        for batch in chunks.chunks_mut(self.embed_batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let embeddings = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
                error!(batch_size = texts.len(), error = %e, "embedding failed during indexing");
                e
            })?;

            if embeddings.len() != batch.len() {
                return Err(RagError::rejected(
                    self.embedding_provider.model_id(),
                    format!("expected {} embeddings, got {}", batch.len(), embeddings.len()),
                ));
            }
            for (chunk, embedding) in batch.iter_mut().zip(embeddings) {
                if embedding.len() != dimensions {
                    return Err(RagError::EmbeddingMismatch(format!(
                        "chunk '{}' embedded to {} dimensions, expected {dimensions}",
                        chunk.id,
                        embedding.len()
                    )));
                }
                chunk.embedding = embedding;
            }
        }
        Ok(())
    }

    async fn write_and_publish(&self, manifest: &StoreManifest, chunks: &[Chunk]) -> Result<()> {
        self.store.write_generation(manifest, chunks).await?;
        self.store.publish(&manifest.generation).await
    }
}

fn check_unique_ids(chunks: &[Chunk]) -> Result<()> {
    let mut seen = HashSet::with_capacity(chunks.len());
    for chunk in chunks {
        if !seen.insert(chunk.id.as_str()) {
            return Err(RagError::VectorStoreError(format!("duplicate chunk id '{}'", chunk.id)));
        }
    }
    Ok(())
}

/// Builder for constructing an [`Indexer`].
///
/// The loader, embedding provider and store location are required. Without
/// an explicit chunker, a [`RecursiveChunker`] is built from the config.
#[derive(Default)]
pub struct IndexerBuilder {
    config: Option<RagConfig>,
    loader: Option<DocumentLoader>,
    chunker: Option<Arc<dyn Chunker>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    store_dir: Option<PathBuf>,
}

impl IndexerBuilder {
    /// Set the chunking and batching configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the document loader.
    pub fn loader(mut self, loader: DocumentLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Use a custom chunker instead of the configured [`RecursiveChunker`].
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the store location.
    pub fn store_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(path.into());
        self
    }

    /// Build the [`Indexer`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<Indexer> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let loader =
            self.loader.ok_or_else(|| RagError::ConfigError("loader is required".to_string()))?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let store_dir = self
            .store_dir
            .ok_or_else(|| RagError::ConfigError("store_dir is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(RecursiveChunker::from_config(&config)?),
        };

        Ok(Indexer {
            loader,
            chunker,
            embedding_provider,
            store: StoreDir::new(store_dir),
            embed_batch_size: config.embed_batch_size,
            running: Mutex::new(()),
        })
    }
}
