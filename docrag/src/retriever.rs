//! Query-time retrieval with a relevance admission threshold.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::RagConfig;
use crate::document::SearchResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// The outcome of a retrieval.
#[derive(Debug, Clone)]
pub enum Retrieval {
    /// The best result reached the threshold. Holds every top-k result in
    /// descending score order.
    Matches(Vec<SearchResult>),
    /// Nothing was stored, or the best result fell below the threshold.
    NoMatch,
}

impl Retrieval {
    /// The admitted results, empty for [`Retrieval::NoMatch`].
    pub fn results(&self) -> &[SearchResult] {
        match self {
            Self::Matches(results) => results,
            Self::NoMatch => &[],
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matches(_))
    }
}

/// Embeds queries and searches a [`VectorStore`].
///
/// The embedding provider must be the one the store was built with.
pub struct Retriever {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    top_k: usize,
    relevance_threshold: f32,
}

impl Retriever {
    /// Create a retriever using `config.top_k` and `config.relevance_threshold`
    /// as the defaults for [`retrieve`](Self::retrieve).
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        config: &RagConfig,
    ) -> Self {
        Self {
            embedding_provider,
            vector_store,
            top_k: config.top_k,
            relevance_threshold: config.relevance_threshold,
        }
    }

    /// Search with the configured `top_k` and threshold.
    pub async fn retrieve(&self, query: &str) -> Result<Retrieval> {
        self.search(query, self.top_k, self.relevance_threshold).await
    }

    /// Embed `query`, fetch the `k` most relevant chunks, and admit them only
    /// if the best one scores at least `relevance_threshold`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for an empty query, `k == 0`, or a
    /// threshold outside `[0, 1]`; [`RagError::EmbeddingMismatch`] if the
    /// query vector has the wrong length; and backend errors unchanged.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        relevance_threshold: f32,
    ) -> Result<Retrieval> {
        if query.trim().is_empty() {
            return Err(RagError::ConfigError("query must not be empty".to_string()));
        }
        if k == 0 {
            return Err(RagError::ConfigError("k must be greater than zero".to_string()));
        }
        if !(0.0..=1.0).contains(&relevance_threshold) {
            return Err(RagError::ConfigError(format!(
                "relevance_threshold ({relevance_threshold}) must be within [0, 1]"
            )));
        }

        if self.vector_store.is_empty().await {
            info!("store is empty, no matching results");
            return Ok(Retrieval::NoMatch);
        }

        let embedding = self.embedding_provider.embed(query).await?;
        let expected = self.embedding_provider.dimensions();
        if embedding.len() != expected {
            return Err(RagError::EmbeddingMismatch(format!(
                "query embedded to {} dimensions, expected {expected}",
                embedding.len()
            )));
        }

        let results = self.vector_store.search(&embedding, k).await?;
        let top_score = results.first().map(|r| r.score);
        debug!(k, returned = results.len(), ?top_score, "similarity search");

        match top_score {
            Some(score) if score >= relevance_threshold => {
                info!(results = results.len(), top_score = score, "retrieved context");
                Ok(Retrieval::Matches(results))
            }
            _ => {
                info!(?top_score, threshold = relevance_threshold, "no matching results");
                Ok(Retrieval::NoMatch)
            }
        }
    }
}
