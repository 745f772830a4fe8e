//! In-memory vector store with exact relevance search.
//!
//! This module provides [`InMemoryVectorStore`], a brute-force vector store
//! backed by a `Vec` protected by a `tokio::sync::RwLock`. Concurrent searches
//! share the read lock. Persisted stores are loaded into one of these.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, relevance};

/// An in-memory vector store that keeps chunks in insertion order.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::from_chunks(chunks)?;
/// let results = store.search(&query, 5).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    inner: RwLock<Entries>,
}

#[derive(Debug, Default)]
struct Entries {
    chunks: Vec<Chunk>,
    positions: HashMap<String, usize>,
}

impl Entries {
    fn upsert(&mut self, chunk: Chunk) {
        match self.positions.get(&chunk.id) {
            Some(&pos) => self.chunks[pos] = chunk,
            None => {
                self.positions.insert(chunk.id.clone(), self.chunks.len());
                self.chunks.push(chunk);
            }
        }
    }
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from chunks in order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStoreError`] if a chunk has no embedding or
    /// two chunks share an id.
    pub fn from_chunks(chunks: Vec<Chunk>) -> Result<Self> {
        let mut entries = Entries::default();
        for chunk in chunks {
            check_embedded(&chunk)?;
            if entries.positions.contains_key(&chunk.id) {
                return Err(RagError::VectorStoreError(format!(
                    "duplicate chunk id '{}'",
                    chunk.id
                )));
            }
            entries.upsert(chunk);
        }
        Ok(Self { inner: RwLock::new(entries) })
    }

    /// A copy of every stored chunk, in insertion order.
    pub async fn chunks(&self) -> Vec<Chunk> {
        self.inner.read().await.chunks.clone()
    }
}

fn check_embedded(chunk: &Chunk) -> Result<()> {
    if chunk.embedding.is_empty() {
        return Err(RagError::VectorStoreError(format!("chunk '{}' has no embedding", chunk.id)));
    }
    Ok(())
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        for chunk in chunks {
            check_embedded(chunk)?;
        }
        let mut entries = self.inner.write().await;
        for chunk in chunks {
            entries.upsert(chunk.clone());
        }
        Ok(())
    }

    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let entries = self.inner.read().await;

        let mut scored: Vec<SearchResult> = entries
            .chunks
            .iter()
            .map(|chunk| SearchResult {
                chunk: chunk.clone(),
                score: relevance(embedding, &chunk.embedding),
            })
            .collect();

        // `sort_by` is stable, so ties keep insertion order.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn len(&self) -> usize {
        self.inner.read().await.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::document::ChunkMetadata;

    fn chunk(id: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: format!("text of {id}"),
            embedding,
            metadata: ChunkMetadata {
                source: "a.md".to_string(),
                start_index: 0,
                chunk_index: 0,
                extra: BTreeMap::new(),
            },
            document_id: "a.md".to_string(),
        }
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let store = InMemoryVectorStore::from_chunks(vec![
            chunk("first", vec![1.0, 0.0]),
            chunk("second", vec![2.0, 0.0]),
            chunk("other", vec![0.0, 1.0]),
        ])
        .unwrap();
        let results = store.search(&[1.0, 0.0], 3).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "other"]);
    }

    #[tokio::test]
    async fn upsert_replaces_in_place() {
        let store = InMemoryVectorStore::new();
        store.upsert(&[chunk("a", vec![1.0]), chunk("b", vec![1.0])]).await.unwrap();
        let mut replacement = chunk("a", vec![1.0]);
        replacement.text = "new".to_string();
        store.upsert(&[replacement]).await.unwrap();

        let chunks = store.chunks().await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "new");
        assert_eq!(chunks[1].id, "b");
    }

    #[tokio::test]
    async fn empty_store_returns_nothing() {
        let store = InMemoryVectorStore::new();
        assert!(store.is_empty().await);
        assert!(store.search(&[1.0, 0.0], 5).await.unwrap().is_empty());
    }

    #[test]
    fn rejects_duplicates_and_missing_embeddings() {
        let dup =
            InMemoryVectorStore::from_chunks(vec![chunk("a", vec![1.0]), chunk("a", vec![1.0])]);
        assert!(matches!(dup, Err(RagError::VectorStoreError(_))));
        let bare = InMemoryVectorStore::from_chunks(vec![chunk("a", vec![])]);
        assert!(matches!(bare, Err(RagError::VectorStoreError(_))));
    }
}
